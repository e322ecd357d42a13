//! Recording sink.
//!
//! Samples the display surface while a recording is active, feeds new
//! frames to a negotiated encoder, and collects the muxed chunks in arrival
//! order. Ending the recording assembles those chunks into a [`Clip`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use digicam_capture_engine::ActiveCapture;
use digicam_common::clock::{unix_millis, RateController, RecordingClock};
use digicam_common::error::{DigicamError, DigicamResult};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::encoder::{negotiate, ChunkEncoder, EncoderFactory, EncoderSettings, VideoCodec};
use crate::export::{output_file_name, write_output};

/// Recording parameters taken from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSettings {
    pub preferred_codec: VideoCodec,
    pub fps: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            preferred_codec: VideoCodec::Vp9,
            fps: 30,
        }
    }
}

/// Why a recording stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// `end()` was called.
    Requested,
    /// The capture behind the recording was released or replaced.
    CaptureEnded,
    /// The encoder rejected a frame or stopped producing output.
    EncoderFailed,
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub bytes: Arc<[u8]>,
    pub chunk_count: usize,
    pub codec: VideoCodec,
    pub mime_type: String,
    pub created_unix_ms: i64,
    pub duration_secs: f64,
    pub ended_by: EndReason,
}

impl Clip {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn file_name(&self) -> String {
        output_file_name("webm", self.created_unix_ms)
    }

    /// Write the clip into `dir` as `digicam_<ms>.webm`.
    pub fn save(&self, dir: &Path) -> DigicamResult<PathBuf> {
        let path = write_output(dir, &self.file_name(), &self.bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = self.len(),
            chunks = self.chunk_count,
            codec = %self.codec,
            "Clip saved"
        );
        Ok(path)
    }
}

struct RecordingSession {
    capture: ActiveCapture,
    encoder: Box<dyn ChunkEncoder>,
    chunks: Vec<Vec<u8>>,
    clock: RecordingClock,
    last_sequence: u64,
    frames_pushed: u64,
}

impl RecordingSession {
    /// Push the surface frame if it is new, then collect muxed output.
    fn feed(&mut self) -> DigicamResult<()> {
        if let Some(snapshot) = self.capture.surface.snapshot() {
            if snapshot.epoch == self.capture.epoch && snapshot.sequence > self.last_sequence {
                self.encoder
                    .push_frame(&snapshot.frame, self.clock.elapsed_ns())?;
                self.last_sequence = snapshot.sequence;
                self.frames_pushed += 1;
            }
        }

        for chunk in self.encoder.pull_chunks()? {
            self.append(chunk);
        }
        Ok(())
    }

    fn append(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }
}

pub struct RecordingSink {
    factory: Arc<dyn EncoderFactory>,
    settings: RecordingSettings,
    active: Option<RecordingSession>,
}

impl RecordingSink {
    pub fn new(factory: Arc<dyn EncoderFactory>, settings: RecordingSettings) -> Self {
        Self {
            factory,
            settings,
            active: None,
        }
    }

    pub fn settings(&self) -> RecordingSettings {
        self.settings
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Chunks collected so far in the active recording.
    pub fn chunk_count(&self) -> usize {
        self.active.as_ref().map_or(0, |s| s.chunks.len())
    }

    /// Start recording the given capture.
    ///
    /// Returns `Ok(false)` if a recording is already running.
    pub async fn begin(&mut self, capture: Option<ActiveCapture>) -> DigicamResult<bool> {
        let Some(capture) = capture else {
            return Err(DigicamError::NoActiveCapture);
        };
        if self.active.is_some() {
            tracing::debug!("Recording already in progress");
            return Ok(false);
        }

        let (width, height) = capture.surface.size();
        if width == 0 || height == 0 {
            return Err(DigicamError::NoActiveCapture);
        }

        let settings = EncoderSettings {
            width,
            height,
            fps: self.settings.fps,
            audio: capture.audio.first().cloned(),
        };
        let has_audio = settings.audio.is_some();

        let factory = self.factory.clone();
        let preferred = self.settings.preferred_codec;
        let encoder =
            tokio::task::spawn_blocking(move || create_encoder(factory.as_ref(), preferred, &settings))
                .await
                .map_err(|e| DigicamError::encoder(format!("Encoder setup task failed: {e}")))??;

        tracing::info!(
            session = capture.session_id,
            codec = %encoder.codec(),
            width,
            height,
            fps = self.settings.fps,
            audio = has_audio,
            "Recording started"
        );

        self.active = Some(RecordingSession {
            capture,
            encoder,
            chunks: Vec::new(),
            clock: RecordingClock::start(),
            last_sequence: 0,
            frames_pushed: 0,
        });
        Ok(true)
    }

    /// Sample the surface once. Pacing is the caller's job.
    ///
    /// Returns the finished clip when the recording ended on its own: the
    /// capture behind it went away, or the encoder failed.
    pub async fn sample(&mut self) -> DigicamResult<Option<Clip>> {
        let Some(session) = self.active.as_mut() else {
            return Ok(None);
        };

        let reason = if !session.capture.is_current() {
            tracing::info!(
                session = session.capture.session_id,
                "Capture ended; finalising recording"
            );
            EndReason::CaptureEnded
        } else {
            match session.feed() {
                Ok(()) => return Ok(None),
                Err(e) => {
                    tracing::error!(
                        session = session.capture.session_id,
                        error = %e,
                        "Encoder failed; finalising recording"
                    );
                    EndReason::EncoderFailed
                }
            }
        };
        self.finalise(reason).await
    }

    /// Append a chunk to the active recording. Empty chunks are dropped.
    pub fn accept_chunk(&mut self, chunk: Vec<u8>) {
        match self.active.as_mut() {
            Some(session) => session.append(chunk),
            None => tracing::debug!(bytes = chunk.len(), "Dropping chunk with no active recording"),
        }
    }

    /// Stop recording and assemble the clip. `Ok(None)` when idle.
    pub async fn end(&mut self) -> DigicamResult<Option<Clip>> {
        self.finalise(EndReason::Requested).await
    }

    async fn finalise(&mut self, reason: EndReason) -> DigicamResult<Option<Clip>> {
        let Some(session) = self.active.take() else {
            return Ok(None);
        };
        let RecordingSession {
            mut encoder,
            mut chunks,
            clock,
            frames_pushed,
            ..
        } = session;

        let codec = encoder.codec();
        // Draining blocks on the encoder bus; the encoder is dropped there too.
        let trailing = tokio::task::spawn_blocking(move || encoder.finish())
            .await
            .map_err(|e| DigicamError::encoder(format!("Encoder shutdown task failed: {e}")))?;
        match trailing {
            Ok(trailing) => chunks.extend(trailing.into_iter().filter(|c| !c.is_empty())),
            Err(e) => tracing::warn!(error = %e, "Encoder did not finish cleanly; clip may be truncated"),
        }

        let chunk_count = chunks.len();
        let clip = Clip {
            bytes: chunks.concat().into(),
            chunk_count,
            codec,
            mime_type: codec.mime_type(),
            created_unix_ms: unix_millis(),
            duration_secs: clock.elapsed_secs(),
            ended_by: reason,
        };

        tracing::info!(
            bytes = clip.len(),
            chunks = chunk_count,
            frames = frames_pushed,
            duration_secs = clip.duration_secs,
            reason = ?reason,
            "Recording finished"
        );
        Ok(Some(clip))
    }
}

/// Create an encoder for the negotiated codec, retrying once with the
/// default codec if the preferred pipeline will not build.
fn create_encoder(
    factory: &dyn EncoderFactory,
    preferred: VideoCodec,
    settings: &EncoderSettings,
) -> DigicamResult<Box<dyn ChunkEncoder>> {
    let codec = negotiate(factory, preferred);
    match factory.create(codec, settings) {
        Ok(encoder) => Ok(encoder),
        Err(e) if codec != VideoCodec::FALLBACK => {
            tracing::debug!(codec = %codec, error = %e, "Encoder creation failed; trying default");
            factory.create(VideoCodec::FALLBACK, settings)
        }
        Err(e) => Err(e),
    }
}

/// Drive [`RecordingSink::sample`] at the configured rate until `stop` is
/// set. Recordings that end on their own are sent on `clips`.
pub fn spawn_sampler(
    sink: Arc<Mutex<RecordingSink>>,
    stop: Arc<AtomicBool>,
    clips: mpsc::UnboundedSender<Clip>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let fps = sink.lock().await.settings().fps;
        let mut interval = tokio::time::interval(RateController::new(fps).interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !stop.load(Ordering::SeqCst) {
            interval.tick().await;
            let result = sink.lock().await.sample().await;
            match result {
                Ok(Some(clip)) => {
                    if clips.send(clip).is_err() {
                        tracing::warn!("Clip receiver dropped; discarding finalised recording");
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Recording sample failed"),
            }
        }
        tracing::debug!("Recording sampler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use digicam_capture_engine::{AudioTrack, DisplaySurface};
    use digicam_processing_core::Frame;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        pushes: AtomicUsize,
        finished: AtomicUsize,
        created: std::sync::Mutex<Vec<VideoCodec>>,
        audio: std::sync::Mutex<Vec<Option<AudioTrack>>>,
    }

    struct MockEncoder {
        codec: VideoCodec,
        counters: Arc<Counters>,
        per_push: Vec<u8>,
        pending: Vec<Vec<u8>>,
        trailing: Vec<Vec<u8>>,
        fail_push: bool,
    }

    impl ChunkEncoder for MockEncoder {
        fn codec(&self) -> VideoCodec {
            self.codec
        }

        fn push_frame(&mut self, _frame: &Frame, _pts_ns: u64) -> DigicamResult<()> {
            if self.fail_push {
                return Err(DigicamError::encoder("appsrc refused buffer"));
            }
            self.counters.pushes.fetch_add(1, Ordering::SeqCst);
            self.pending.push(self.per_push.clone());
            Ok(())
        }

        fn pull_chunks(&mut self) -> DigicamResult<Vec<Vec<u8>>> {
            Ok(std::mem::take(&mut self.pending))
        }

        fn finish(&mut self) -> DigicamResult<Vec<Vec<u8>>> {
            self.counters.finished.fetch_add(1, Ordering::SeqCst);
            Ok(std::mem::take(&mut self.trailing))
        }
    }

    struct MockFactory {
        supported: Vec<VideoCodec>,
        counters: Arc<Counters>,
        per_push: Vec<u8>,
        trailing: Vec<Vec<u8>>,
        fail_push: bool,
    }

    impl MockFactory {
        fn new(supported: Vec<VideoCodec>) -> Self {
            Self {
                supported,
                counters: Arc::new(Counters::default()),
                per_push: Vec::new(),
                trailing: Vec::new(),
                fail_push: false,
            }
        }
    }

    impl EncoderFactory for MockFactory {
        fn supports(&self, codec: VideoCodec) -> bool {
            self.supported.contains(&codec)
        }

        fn create(
            &self,
            codec: VideoCodec,
            settings: &EncoderSettings,
        ) -> DigicamResult<Box<dyn ChunkEncoder>> {
            self.counters.created.lock().unwrap().push(codec);
            self.counters
                .audio
                .lock()
                .unwrap()
                .push(settings.audio.clone());
            Ok(Box::new(MockEncoder {
                codec,
                counters: self.counters.clone(),
                per_push: self.per_push.clone(),
                pending: Vec::new(),
                trailing: self.trailing.clone(),
                fail_push: self.fail_push,
            }))
        }
    }

    fn capture() -> ActiveCapture {
        let surface = DisplaySurface::new();
        let epoch = surface.rebind();
        surface.resize(4, 4);
        ActiveCapture {
            session_id: 1,
            surface,
            epoch,
            audio: vec![AudioTrack {
                label: "mic".into(),
                source: "pulsesrc".into(),
            }],
        }
    }

    fn sink(factory: MockFactory, fps: u32) -> (RecordingSink, Arc<Counters>) {
        let counters = factory.counters.clone();
        let settings = RecordingSettings {
            preferred_codec: VideoCodec::Vp9,
            fps,
        };
        (RecordingSink::new(Arc::new(factory), settings), counters)
    }

    #[tokio::test]
    async fn begin_without_capture_fails() {
        let (mut sink, counters) = sink(MockFactory::new(vec![VideoCodec::Vp9]), 30);
        let err = sink.begin(None).await.unwrap_err();
        assert!(matches!(err, DigicamError::NoActiveCapture));
        assert!(!sink.is_recording());
        assert!(counters.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn begin_twice_is_a_no_op() {
        let (mut sink, counters) = sink(MockFactory::new(vec![VideoCodec::Vp9]), 30);
        assert!(sink.begin(Some(capture())).await.unwrap());
        assert!(!sink.begin(Some(capture())).await.unwrap());
        assert_eq!(counters.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn begin_attaches_first_audio_track() {
        let (mut sink, counters) = sink(MockFactory::new(vec![VideoCodec::Vp9]), 30);
        sink.begin(Some(capture())).await.unwrap();
        let audio = counters.audio.lock().unwrap();
        assert_eq!(audio[0].as_ref().map(|t| t.source.as_str()), Some("pulsesrc"));
    }

    #[tokio::test]
    async fn empty_chunks_are_discarded() {
        let (mut sink, _) = sink(MockFactory::new(vec![VideoCodec::Vp9]), 30);
        sink.begin(Some(capture())).await.unwrap();

        sink.accept_chunk(Vec::new());
        sink.accept_chunk(vec![1; 120]);
        sink.accept_chunk(vec![2; 80]);

        let clip = sink.end().await.unwrap().unwrap();
        assert_eq!(clip.chunk_count, 2);
        assert_eq!(clip.len(), 200);
        assert!(clip.bytes[..120].iter().all(|b| *b == 1));
        assert!(clip.bytes[120..].iter().all(|b| *b == 2));
        assert_eq!(clip.ended_by, EndReason::Requested);
        assert!(!sink.is_recording());
    }

    #[tokio::test]
    async fn end_when_idle_returns_none() {
        let (mut sink, _) = sink(MockFactory::new(vec![VideoCodec::Vp9]), 30);
        assert!(sink.end().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsupported_preference_falls_back_to_vp8() {
        let (mut sink, counters) = sink(MockFactory::new(vec![VideoCodec::Vp8]), 30);
        sink.begin(Some(capture())).await.unwrap();
        let clip = sink.end().await.unwrap().unwrap();

        assert_eq!(*counters.created.lock().unwrap(), vec![VideoCodec::Vp8]);
        assert_eq!(clip.codec, VideoCodec::Vp8);
        assert_eq!(clip.mime_type, "video/webm;codecs=vp8");
    }

    #[tokio::test]
    async fn trailing_chunks_follow_collected_ones() {
        let mut factory = MockFactory::new(vec![VideoCodec::Vp9]);
        factory.trailing = vec![vec![9; 10], Vec::new()];
        let (mut sink, counters) = sink(factory, 30);
        sink.begin(Some(capture())).await.unwrap();
        sink.accept_chunk(vec![1; 5]);

        let clip = sink.end().await.unwrap().unwrap();
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
        assert_eq!(clip.chunk_count, 2);
        assert_eq!(&clip.bytes[..], &[&[1u8; 5][..], &[9u8; 10][..]].concat()[..]);
    }

    #[tokio::test]
    async fn sample_pushes_only_new_surface_frames() {
        let mut factory = MockFactory::new(vec![VideoCodec::Vp9]);
        factory.per_push = vec![7; 3];
        let (mut sink, counters) = sink(factory, 30);
        let capture = capture();
        let surface = capture.surface.clone();
        sink.begin(Some(capture)).await.unwrap();

        // Nothing presented yet.
        assert!(sink.sample().await.unwrap().is_none());
        assert_eq!(counters.pushes.load(Ordering::SeqCst), 0);

        surface.present(Frame::filled(4, 4, [1, 2, 3, 255]));
        sink.sample().await.unwrap();
        sink.sample().await.unwrap();
        assert_eq!(counters.pushes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.chunk_count(), 1);

        surface.present(Frame::filled(4, 4, [4, 5, 6, 255]));
        sink.sample().await.unwrap();
        assert_eq!(counters.pushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn camera_switch_finalises_recording() {
        let (mut sink, _) = sink(MockFactory::new(vec![VideoCodec::Vp9]), 30);
        let capture = capture();
        let surface = capture.surface.clone();
        sink.begin(Some(capture)).await.unwrap();
        sink.accept_chunk(vec![3; 42]);

        surface.rebind();
        let clip = sink.sample().await.unwrap().expect("recording finalised");
        assert_eq!(clip.len(), 42);
        assert_eq!(clip.ended_by, EndReason::CaptureEnded);
        assert!(!sink.is_recording());
    }

    #[tokio::test]
    async fn encoder_failure_finalises_partial_clip() {
        let mut factory = MockFactory::new(vec![VideoCodec::Vp9]);
        factory.fail_push = true;
        let (mut sink, counters) = sink(factory, 30);
        let capture = capture();
        let surface = capture.surface.clone();
        sink.begin(Some(capture)).await.unwrap();
        sink.accept_chunk(vec![8; 16]);

        surface.present(Frame::filled(4, 4, [0, 0, 0, 255]));
        let clip = sink.sample().await.unwrap().expect("recording finalised");
        assert_eq!(clip.ended_by, EndReason::EncoderFailed);
        assert_eq!(clip.len(), 16);
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
        assert!(!sink.is_recording());

        // Later samples are quiet no-ops.
        assert!(sink.sample().await.unwrap().is_none());
    }

    #[test]
    fn clip_file_name_uses_creation_time() {
        let clip = Clip {
            bytes: Arc::from(vec![0u8; 4]),
            chunk_count: 1,
            codec: VideoCodec::Vp9,
            mime_type: VideoCodec::Vp9.mime_type(),
            created_unix_ms: 1_700_000_000_123,
            duration_secs: 1.0,
            ended_by: EndReason::Requested,
        };
        assert_eq!(clip.file_name(), "digicam_1700000000123.webm");
    }

    #[tokio::test]
    async fn sampler_delivers_auto_finalised_clip() {
        let mut factory = MockFactory::new(vec![VideoCodec::Vp9]);
        factory.per_push = vec![5; 8];
        let (sink, counters) = sink(factory, 200);
        let sink = Arc::new(Mutex::new(sink));
        let capture = capture();
        let surface = capture.surface.clone();
        sink.lock().await.begin(Some(capture)).await.unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_sampler(sink.clone(), stop.clone(), tx);

        surface.present(Frame::filled(4, 4, [0, 0, 0, 255]));
        tokio::time::sleep(Duration::from_millis(30)).await;
        surface.rebind();

        let clip = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("clip within timeout")
            .expect("channel open");
        assert!(counters.pushes.load(Ordering::SeqCst) >= 1);
        assert_eq!(clip.len(), 8);

        stop.store(true, Ordering::SeqCst);
        handle.await.unwrap();
        assert!(!sink.lock().await.is_recording());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sampler_pushes_at_configured_fps() {
        let (sink, counters) = sink(MockFactory::new(vec![VideoCodec::Vp9]), 30);
        let sink = Arc::new(Mutex::new(sink));
        let capture = capture();
        let surface = capture.surface.clone();
        sink.lock().await.begin(Some(capture)).await.unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        // A camera faster than the sample rate: every sample sees a new frame.
        let camera = tokio::spawn({
            let stop = stop.clone();
            async move {
                while !stop.load(Ordering::SeqCst) {
                    surface.present(Frame::filled(4, 4, [9, 9, 9, 255]));
                    tokio::time::sleep(Duration::from_millis(4)).await;
                }
            }
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let sampler = spawn_sampler(sink.clone(), stop.clone(), tx);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        stop.store(true, Ordering::SeqCst);
        sampler.await.unwrap();
        camera.await.unwrap();

        let pushes = counters.pushes.load(Ordering::SeqCst);
        assert!(
            (25..=32).contains(&pushes),
            "expected ~30 frames in one second, pushed {pushes}"
        );
    }
}
