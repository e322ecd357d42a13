use std::sync::Arc;

use digicam_common::config::CaptureDefaults;
use digicam_common::error::DigicamResult;
use digicam_processing_core::Frame;
use serde::{Deserialize, Serialize};

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Parameters for acquiring a camera. The size is a preference, not a
/// requirement; the source reports what it actually delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraRequest {
    /// Explicit device id; `None` lets the backend pick.
    pub device_id: Option<String>,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub facing: FacingMode,
    /// Also acquire a microphone track.
    pub audio: bool,
}

impl Default for CameraRequest {
    fn default() -> Self {
        Self {
            device_id: None,
            ideal_width: 1280,
            ideal_height: 720,
            facing: FacingMode::User,
            audio: true,
        }
    }
}

impl CameraRequest {
    pub fn from_defaults(defaults: &CaptureDefaults) -> Self {
        Self {
            device_id: defaults.device.clone(),
            ideal_width: defaults.ideal_width,
            ideal_height: defaults.ideal_height,
            facing: if defaults.facing_user {
                FacingMode::User
            } else {
                FacingMode::Environment
            },
            audio: defaults.audio,
        }
    }

    /// Replace the device id; an empty string means "no preference".
    pub fn with_device(mut self, device_id: Option<String>) -> Self {
        if let Some(id) = device_id {
            self.device_id = (!id.trim().is_empty()).then_some(id);
        }
        self
    }
}

/// An enumerated video input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub facing: Option<FacingMode>,
    /// Higher is a more likely webcam.
    pub priority: u32,
}

/// A microphone attached to a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub label: String,
    /// GStreamer launch fragment producing raw audio for the encoder.
    pub source: String,
}

/// A live camera handle. Only one should exist at a time.
pub trait CameraSource: Send {
    fn device(&self) -> &DeviceInfo;

    /// Native size of the most recent frame, once known.
    fn resolution(&self) -> Option<(u32, u32)>;

    /// Newest frame not yet returned, or `None` when nothing fresh arrived.
    /// Errors mean the stream is gone.
    fn poll_frame(&mut self) -> DigicamResult<Option<Frame>>;

    fn audio_tracks(&self) -> Vec<AudioTrack>;

    fn is_live(&self) -> bool;

    /// Stop the hardware. Idempotent.
    fn release(&mut self) -> DigicamResult<()>;
}

/// Platform camera access.
#[async_trait::async_trait]
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the capture API exists at all in this environment.
    fn is_supported(&self) -> bool;

    async fn enumerate_devices(&self) -> DigicamResult<Vec<DeviceInfo>>;

    async fn acquire(&self, request: &CameraRequest) -> DigicamResult<Box<dyn CameraSource>>;
}

pub mod v4l2;

pub use v4l2::GstCameraBackend;

/// Get the platform camera backend.
pub fn get_backend() -> Arc<dyn CameraBackend> {
    Arc::new(GstCameraBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_follow_config() {
        let defaults = CaptureDefaults {
            device: Some("/dev/video4".into()),
            ideal_width: 640,
            ideal_height: 480,
            facing_user: false,
            audio: false,
        };
        let request = CameraRequest::from_defaults(&defaults);
        assert_eq!(request.device_id.as_deref(), Some("/dev/video4"));
        assert_eq!((request.ideal_width, request.ideal_height), (640, 480));
        assert_eq!(request.facing, FacingMode::Environment);
        assert!(!request.audio);
    }

    #[test]
    fn blank_device_id_clears_preference() {
        let request = CameraRequest {
            device_id: Some("/dev/video0".into()),
            ..Default::default()
        };
        assert_eq!(
            request.clone().with_device(Some("  ".into())).device_id,
            None
        );
        assert_eq!(
            request.clone().with_device(None).device_id.as_deref(),
            Some("/dev/video0")
        );
        assert_eq!(
            request.with_device(Some("/dev/video1".into())).device_id.as_deref(),
            Some("/dev/video1")
        );
    }
}
