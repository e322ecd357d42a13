//! Capture session: one live camera source and its bookkeeping.

use digicam_common::clock::RecordingClock;
use digicam_common::error::DigicamResult;
use digicam_processing_core::Frame;

use crate::backend::{AudioTrack, CameraSource, DeviceInfo};
use crate::surface::DisplaySurface;

/// Counters logged when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SessionStats {
    frames_delivered: u64,
    polls_empty: u64,
}

pub struct CaptureSession {
    id: u64,
    source: Box<dyn CameraSource>,
    clock: RecordingClock,
    stats: SessionStats,
}

impl CaptureSession {
    pub(crate) fn new(id: u64, source: Box<dyn CameraSource>) -> Self {
        Self {
            id,
            source,
            clock: RecordingClock::start(),
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &DeviceInfo {
        self.source.device()
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.source.resolution()
    }

    pub fn audio_tracks(&self) -> Vec<AudioTrack> {
        self.source.audio_tracks()
    }

    pub fn uptime_secs(&self) -> f64 {
        self.clock.elapsed_secs()
    }

    pub(crate) fn poll_frame(&mut self) -> DigicamResult<Option<Frame>> {
        let frame = self.source.poll_frame()?;
        match frame {
            Some(_) => self.stats.frames_delivered += 1,
            None => self.stats.polls_empty += 1,
        }
        Ok(frame)
    }

    /// Stop the camera. Safe to call more than once.
    pub fn release(&mut self) -> DigicamResult<()> {
        if !self.source.is_live() {
            return Ok(());
        }
        tracing::info!(
            session = self.id,
            device = %self.source.device().id,
            frames = self.stats.frames_delivered,
            empty_polls = self.stats.polls_empty,
            uptime_secs = self.uptime_secs(),
            "Capture session ended"
        );
        self.source.release()
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("device", self.source.device())
            .field("stats", &self.stats)
            .finish()
    }
}

/// What a recorder needs from the current capture: the surface to sample,
/// the epoch it was bound at, and the audio tracks to mux.
#[derive(Debug, Clone)]
pub struct ActiveCapture {
    pub session_id: u64,
    pub surface: DisplaySurface,
    pub epoch: u64,
    pub audio: Vec<AudioTrack>,
}

impl ActiveCapture {
    /// Whether the surface still shows this capture.
    pub fn is_current(&self) -> bool {
        self.surface.epoch() == self.epoch
    }
}
