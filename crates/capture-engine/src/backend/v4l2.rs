//! GStreamer camera backend: `v4l2src` (or `autovideosrc`) into an RGBA
//! appsink that always holds only the newest frame.

use std::time::Duration;

use digicam_common::error::{DigicamError, DigicamResult};
use digicam_processing_core::Frame;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video::VideoInfo;

use super::{AudioTrack, CameraBackend, CameraRequest, CameraSource, DeviceInfo};
use crate::device::{enumerate_v4l2_devices, select_device};
use crate::pipeline::{
    camera_launch, element_available, init_gstreamer, GstPipeline, PipelineKind, CAMERA_SINK,
};

/// Device id used when no V4L2 node exists and `autovideosrc` is tried.
pub const AUTO_DEVICE_ID: &str = "auto";

const START_TIMEOUT: Duration = Duration::from_secs(5);
const FIRST_FRAME_TIMEOUT_SECS: u64 = 3;
const MIC_OPEN_TIMEOUT: Duration = Duration::from_secs(2);
const MICROPHONE_ELEMENTS: [&str; 3] = ["pulsesrc", "pipewiresrc", "autoaudiosrc"];

#[derive(Debug, Default)]
pub struct GstCameraBackend;

impl GstCameraBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl CameraBackend for GstCameraBackend {
    fn name(&self) -> &str {
        "gstreamer-v4l2"
    }

    fn is_supported(&self) -> bool {
        element_available("v4l2src") || element_available("autovideosrc")
    }

    async fn enumerate_devices(&self) -> DigicamResult<Vec<DeviceInfo>> {
        tokio::task::spawn_blocking(enumerate_v4l2_devices)
            .await
            .map_err(|e| DigicamError::device(format!("Device enumeration task failed: {e}")))
    }

    async fn acquire(&self, request: &CameraRequest) -> DigicamResult<Box<dyn CameraSource>> {
        let request = request.clone();
        let source = tokio::task::spawn_blocking(move || GstCameraSource::open(&request))
            .await
            .map_err(|e| DigicamError::device(format!("Camera acquisition task failed: {e}")))??;
        Ok(Box::new(source))
    }
}

pub struct GstCameraSource {
    device: DeviceInfo,
    pipeline: GstPipeline,
    appsink: gst_app::AppSink,
    pending: Option<Frame>,
    resolution: Option<(u32, u32)>,
    audio: Vec<AudioTrack>,
    live: bool,
}

impl GstCameraSource {
    fn open(request: &CameraRequest) -> DigicamResult<Self> {
        init_gstreamer()?;

        let device = resolve_device(request)?;
        let device_path = (device.id != AUTO_DEVICE_ID).then_some(device.id.as_str());

        // Constrained to the preferred size first, then whatever the device offers.
        let attempts = [
            Some((request.ideal_width, request.ideal_height)),
            None,
        ];
        let mut last_err = None;
        for ideal in attempts {
            let launch = camera_launch(device_path, ideal);
            match start_camera(&launch) {
                Ok((pipeline, appsink, first)) => {
                    let audio = if request.audio {
                        open_microphone().into_iter().collect()
                    } else {
                        Vec::new()
                    };
                    tracing::info!(
                        device = %device.id,
                        label = %device.label,
                        width = first.width(),
                        height = first.height(),
                        audio_tracks = audio.len(),
                        "Camera acquired"
                    );
                    return Ok(Self {
                        device,
                        pipeline,
                        appsink,
                        resolution: Some(first.dimensions()),
                        pending: Some(first),
                        audio,
                        live: true,
                    });
                }
                Err(e) => {
                    tracing::debug!(device = %device.id, ?ideal, error = %e, "Camera launch attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DigicamError::device(format!("Could not open camera {}", device.label))
        }))
    }
}

impl CameraSource for GstCameraSource {
    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    fn poll_frame(&mut self) -> DigicamResult<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        if !self.live {
            return Ok(None);
        }
        if let Some(error) = self.pipeline.take_error() {
            return Err(DigicamError::device(format!(
                "Camera {} failed: {error}",
                self.device.label
            )));
        }

        match self.appsink.try_pull_sample(gst::ClockTime::ZERO) {
            Some(sample) => {
                let frame = sample_to_frame(&sample)?;
                self.resolution = Some(frame.dimensions());
                Ok(Some(frame))
            }
            None if self.appsink.is_eos() => Err(DigicamError::device(format!(
                "Camera {} stopped delivering frames",
                self.device.label
            ))),
            None => Ok(None),
        }
    }

    fn audio_tracks(&self) -> Vec<AudioTrack> {
        self.audio.clone()
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn release(&mut self) -> DigicamResult<()> {
        if !self.live {
            return Ok(());
        }
        self.live = false;
        self.pending = None;
        tracing::info!(device = %self.device.id, "Releasing camera");
        self.pipeline.halt()
    }
}

impl Drop for GstCameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(device = %self.device.id, error = %e, "Camera release failed");
        }
    }
}

fn resolve_device(request: &CameraRequest) -> DigicamResult<DeviceInfo> {
    let devices = enumerate_v4l2_devices();

    if let Some(id) = &request.device_id {
        if id == AUTO_DEVICE_ID {
            return Ok(auto_device());
        }
        if !std::path::Path::new(id).exists() {
            return Err(DigicamError::device(format!("Camera {id} not found")));
        }
        return Ok(devices
            .into_iter()
            .find(|d| &d.id == id)
            .unwrap_or_else(|| DeviceInfo {
                id: id.clone(),
                label: id.clone(),
                facing: None,
                priority: 0,
            }));
    }

    match select_device(&devices, request.facing) {
        Some(device) => {
            if device.facing.is_some_and(|f| f != request.facing) {
                tracing::debug!(device = %device.id, "No camera with the requested facing");
            }
            Ok(device.clone())
        }
        None if element_available("autovideosrc") => Ok(auto_device()),
        None => Err(DigicamError::device("No camera found")),
    }
}

fn auto_device() -> DeviceInfo {
    DeviceInfo {
        id: AUTO_DEVICE_ID.to_string(),
        label: "Default camera".to_string(),
        facing: None,
        priority: 0,
    }
}

fn start_camera(launch: &str) -> DigicamResult<(GstPipeline, gst_app::AppSink, Frame)> {
    let mut pipeline = GstPipeline::from_launch(PipelineKind::Capture, "camera", launch)?;
    let appsink: gst_app::AppSink = pipeline.element(CAMERA_SINK)?;
    pipeline.start(START_TIMEOUT)?;

    let first = appsink.try_pull_sample(gst::ClockTime::from_seconds(FIRST_FRAME_TIMEOUT_SECS));
    match first {
        Some(sample) => Ok((pipeline, appsink, sample_to_frame(&sample)?)),
        None => {
            let detail = pipeline
                .take_error()
                .unwrap_or_else(|| "no frame within timeout".to_string());
            let _ = pipeline.halt();
            Err(DigicamError::device(format!("Camera did not start: {detail}")))
        }
    }
}

/// Open the first working microphone briefly so a missing or denied one
/// shows up when the camera starts. The encoder opens it again for real
/// when recording begins. Audio is optional: failure only drops the track.
fn open_microphone() -> Option<AudioTrack> {
    let mut tried = false;
    for element in MICROPHONE_ELEMENTS {
        if !element_available(element) {
            continue;
        }
        tried = true;
        match try_microphone(element) {
            Ok(()) => {
                return Some(AudioTrack {
                    label: "Default microphone".to_string(),
                    source: element.to_string(),
                });
            }
            Err(e) => tracing::warn!(element, error = %e, "Microphone unavailable"),
        }
    }

    if tried {
        tracing::warn!("No microphone could be opened; recording without sound");
    } else {
        tracing::warn!("No audio source element available; recording without sound");
    }
    None
}

fn try_microphone(element: &str) -> DigicamResult<()> {
    let mut pipeline = GstPipeline::from_launch(
        PipelineKind::Capture,
        "microphone",
        &microphone_check_launch(element),
    )?;
    let started = pipeline.start(MIC_OPEN_TIMEOUT).and_then(|()| {
        match pipeline.take_error() {
            Some(error) => Err(DigicamError::device(format!("Microphone {element} failed: {error}"))),
            None => Ok(()),
        }
    });
    let _ = pipeline.halt();
    started
}

fn microphone_check_launch(element: &str) -> String {
    format!("{element} ! fakesink sync=false")
}

fn sample_to_frame(sample: &gst::Sample) -> DigicamResult<Frame> {
    let caps = sample
        .caps()
        .ok_or_else(|| DigicamError::device("Camera sample has no caps"))?;
    let info = VideoInfo::from_caps(caps)
        .map_err(|e| DigicamError::device(format!("Unreadable camera caps: {e}")))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| DigicamError::device("Camera sample has no buffer"))?;
    let map = buffer
        .map_readable()
        .map_err(|e| DigicamError::device(format!("Failed to map camera buffer: {e}")))?;

    let stride = info.stride()[0].max(0) as usize;
    Frame::from_strided(info.width(), info.height(), stride, map.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microphone_check_discards_audio() {
        assert_eq!(
            microphone_check_launch("pulsesrc"),
            "pulsesrc ! fakesink sync=false"
        );
    }

    #[test]
    fn desktop_audio_servers_are_tried_first() {
        assert_eq!(MICROPHONE_ELEMENTS.last(), Some(&"autoaudiosrc"));
    }

    #[test]
    fn explicit_missing_device_is_a_device_error() {
        let request = CameraRequest::default().with_device(Some("/dev/video-missing".into()));
        let err = resolve_device(&request).unwrap_err();
        assert!(matches!(err, DigicamError::Device { .. }));
    }
}
