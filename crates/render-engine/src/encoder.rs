//! Chunked video encoding for recordings.
//!
//! An encoder accepts composited frames and hands back muxed WebM bytes in
//! arrival order. [`negotiate`] picks the codec: the preferred one when the
//! platform has it, otherwise the platform default (VP8) without telling
//! the caller.

use std::time::Duration;

use digicam_capture_engine::pipeline::{element_available, GstPipeline, PipelineKind};
use digicam_capture_engine::AudioTrack;
use digicam_common::error::{DigicamError, DigicamResult};
use digicam_processing_core::Frame;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use serde::{Deserialize, Serialize};

const FRAME_SOURCE: &str = "frames";
const CHUNK_SINK: &str = "chunks";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp9,
    Vp8,
}

impl VideoCodec {
    /// The codec used when the preferred one is unavailable.
    pub const FALLBACK: VideoCodec = VideoCodec::Vp8;

    pub fn element(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "vp9enc",
            VideoCodec::Vp8 => "vp8enc",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Vp8 => "vp8",
        }
    }

    pub fn mime_type(&self) -> String {
        format!("video/webm;codecs={}", self.as_str())
    }

    /// Lossy: anything other than VP8 asks for VP9.
    pub fn parse_lossy(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "vp8" => VideoCodec::Vp8,
            _ => VideoCodec::Vp9,
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output parameters for a new encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio: Option<AudioTrack>,
}

pub trait ChunkEncoder: Send {
    fn codec(&self) -> VideoCodec;

    /// Queue one frame at `pts_ns` from the start of the recording.
    fn push_frame(&mut self, frame: &Frame, pts_ns: u64) -> DigicamResult<()>;

    /// Chunks produced since the last call, oldest first.
    fn pull_chunks(&mut self) -> DigicamResult<Vec<Vec<u8>>>;

    /// Flush and close, returning the trailing chunks.
    fn finish(&mut self) -> DigicamResult<Vec<Vec<u8>>>;
}

pub trait EncoderFactory: Send + Sync {
    fn supports(&self, codec: VideoCodec) -> bool;

    fn create(
        &self,
        codec: VideoCodec,
        settings: &EncoderSettings,
    ) -> DigicamResult<Box<dyn ChunkEncoder>>;
}

/// Choose `preferred` if supported, else the platform default.
pub fn negotiate(factory: &dyn EncoderFactory, preferred: VideoCodec) -> VideoCodec {
    if factory.supports(preferred) {
        preferred
    } else {
        tracing::debug!(
            preferred = %preferred,
            fallback = %VideoCodec::FALLBACK,
            "Preferred codec unavailable; using default encoder"
        );
        VideoCodec::FALLBACK
    }
}

/// Builds GStreamer `appsrc → vpXenc → webmmux → appsink` encoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct GstWebmEncoderFactory;

impl EncoderFactory for GstWebmEncoderFactory {
    fn supports(&self, codec: VideoCodec) -> bool {
        element_available(codec.element()) && element_available("webmmux")
    }

    fn create(
        &self,
        codec: VideoCodec,
        settings: &EncoderSettings,
    ) -> DigicamResult<Box<dyn ChunkEncoder>> {
        Ok(Box::new(GstWebmEncoder::new(codec, settings)?))
    }
}

pub struct GstWebmEncoder {
    codec: VideoCodec,
    pipeline: GstPipeline,
    appsrc: gst_app::AppSrc,
    appsink: gst_app::AppSink,
    fps: u32,
    input_size: (u32, u32),
    finished: bool,
}

impl GstWebmEncoder {
    pub fn new(codec: VideoCodec, settings: &EncoderSettings) -> DigicamResult<Self> {
        let audio = settings
            .audio
            .as_ref()
            .filter(|_| element_available("opusenc"));
        let launch = webm_launch(codec, settings, audio);

        let mut pipeline = GstPipeline::from_launch(PipelineKind::Encode, "recorder", &launch)?;
        let appsrc: gst_app::AppSrc = pipeline.element(FRAME_SOURCE)?;
        let appsink: gst_app::AppSink = pipeline.element(CHUNK_SINK)?;
        pipeline.start(Duration::from_secs(5))?;

        tracing::info!(
            codec = %codec,
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            audio = audio.is_some(),
            "Encoder started"
        );

        Ok(Self {
            codec,
            pipeline,
            appsrc,
            appsink,
            fps: settings.fps.max(1),
            input_size: (settings.width, settings.height),
            finished: false,
        })
    }

    fn set_input_caps(&mut self, width: u32, height: u32) -> DigicamResult<()> {
        let caps = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgba, width, height)
            .fps(gst::Fraction::new(self.fps as i32, 1))
            .build()
            .and_then(|info| info.to_caps())
            .map_err(|e| DigicamError::encoder(format!("Invalid frame caps: {e}")))?;
        self.appsrc.set_caps(Some(&caps));
        self.input_size = (width, height);
        Ok(())
    }

    fn drain_sink(&self) -> DigicamResult<Vec<Vec<u8>>> {
        let mut chunks = Vec::new();
        while let Some(sample) = self.appsink.try_pull_sample(gst::ClockTime::ZERO) {
            let buffer = sample
                .buffer()
                .ok_or_else(|| DigicamError::encoder("Muxer produced a sample without a buffer"))?;
            let map = buffer
                .map_readable()
                .map_err(|e| DigicamError::encoder(format!("Failed to map muxer output: {e}")))?;
            chunks.push(map.as_slice().to_vec());
        }
        Ok(chunks)
    }
}

impl ChunkEncoder for GstWebmEncoder {
    fn codec(&self) -> VideoCodec {
        self.codec
    }

    fn push_frame(&mut self, frame: &Frame, pts_ns: u64) -> DigicamResult<()> {
        if self.finished {
            return Err(DigicamError::encoder("Encoder already finished"));
        }
        // Size changes are rescaled to the output size by `videoscale`.
        if frame.dimensions() != self.input_size {
            self.set_input_caps(frame.width(), frame.height())?;
        }

        let mut buffer = gst::Buffer::from_mut_slice(frame.as_bytes().to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(pts_ns));
            buffer.set_duration(gst::ClockTime::from_nseconds(
                1_000_000_000 / self.fps as u64,
            ));
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| DigicamError::encoder(format!("Encoder rejected frame: {e:?}")))?;

        if let Some(error) = self.pipeline.take_error() {
            return Err(DigicamError::encoder(error));
        }
        Ok(())
    }

    fn pull_chunks(&mut self) -> DigicamResult<Vec<Vec<u8>>> {
        self.drain_sink()
    }

    fn finish(&mut self) -> DigicamResult<Vec<Vec<u8>>> {
        if self.finished {
            return Ok(Vec::new());
        }
        self.finished = true;

        // EOS on the pipeline also ends a live audio branch, so the muxer
        // can close the cluster.
        self.pipeline.drain(DRAIN_TIMEOUT);
        let chunks = self.drain_sink()?;
        self.pipeline.halt()?;
        tracing::debug!(codec = %self.codec, trailing_chunks = chunks.len(), "Encoder finished");
        Ok(chunks)
    }
}

impl Drop for GstWebmEncoder {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.pipeline.halt();
        }
    }
}

/// Launch line for a WebM encoder fed RGBA frames through `appsrc`.
pub fn webm_launch(
    codec: VideoCodec,
    settings: &EncoderSettings,
    audio: Option<&AudioTrack>,
) -> String {
    let EncoderSettings {
        width, height, fps, ..
    } = *settings;
    let fps = fps.max(1);
    let mut launch = format!(
        "appsrc name={FRAME_SOURCE} is-live=true format=time \
         caps=\"video/x-raw,format=RGBA,width={width},height={height},framerate={fps}/1\" \
         ! videoconvert ! videoscale ! video/x-raw,width={width},height={height} \
         ! {enc} deadline=1 ! queue ! webmmux name=mux streamable=true \
         ! appsink name={CHUNK_SINK} sync=false",
        enc = codec.element(),
    );
    if let Some(track) = audio {
        launch.push_str(&format!(
            " {} ! audioconvert ! audioresample ! opusenc ! queue ! mux.",
            track.source
        ));
    }
    launch
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Only(Vec<VideoCodec>);

    impl EncoderFactory for Only {
        fn supports(&self, codec: VideoCodec) -> bool {
            self.0.contains(&codec)
        }

        fn create(
            &self,
            _codec: VideoCodec,
            _settings: &EncoderSettings,
        ) -> DigicamResult<Box<dyn ChunkEncoder>> {
            Err(DigicamError::encoder("not used"))
        }
    }

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 640,
            height: 480,
            fps: 30,
            audio: None,
        }
    }

    #[test]
    fn negotiate_keeps_supported_preference() {
        let factory = Only(vec![VideoCodec::Vp9, VideoCodec::Vp8]);
        assert_eq!(negotiate(&factory, VideoCodec::Vp9), VideoCodec::Vp9);
    }

    #[test]
    fn negotiate_falls_back_to_default() {
        let factory = Only(vec![VideoCodec::Vp8]);
        assert_eq!(negotiate(&factory, VideoCodec::Vp9), VideoCodec::Vp8);
        // Even with nothing available, the default is returned and creation
        // reports the failure later.
        assert_eq!(negotiate(&Only(vec![]), VideoCodec::Vp9), VideoCodec::Vp8);
    }

    #[test]
    fn codec_names_and_mime_types() {
        assert_eq!(VideoCodec::parse_lossy("VP8"), VideoCodec::Vp8);
        assert_eq!(VideoCodec::parse_lossy("av1"), VideoCodec::Vp9);
        assert_eq!(VideoCodec::Vp9.mime_type(), "video/webm;codecs=vp9");
    }

    #[test]
    fn launch_line_without_audio() {
        let launch = webm_launch(VideoCodec::Vp9, &settings(), None);
        assert!(launch.starts_with("appsrc name=frames is-live=true format=time"));
        assert!(launch.contains("framerate=30/1"));
        assert!(launch.contains("! vp9enc deadline=1 !"));
        assert!(launch.contains("webmmux name=mux streamable=true"));
        assert!(!launch.contains("opusenc"));
    }

    #[test]
    fn launch_line_with_audio_branch() {
        let track = AudioTrack {
            label: "mic".into(),
            source: "pulsesrc".into(),
        };
        let launch = webm_launch(VideoCodec::Vp8, &settings(), Some(&track));
        assert!(launch.contains("! vp8enc deadline=1 !"));
        assert!(launch.ends_with(" pulsesrc ! audioconvert ! audioresample ! opusenc ! queue ! mux."));
    }
}
