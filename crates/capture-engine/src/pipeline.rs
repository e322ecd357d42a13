//! GStreamer pipeline plumbing shared by the camera source, the recording
//! encoder, and the preview window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use digicam_common::error::{DigicamError, DigicamResult};
use gst::prelude::*;
use gstreamer as gst;

/// Name of the appsink element that receives converted RGBA camera frames.
pub const CAMERA_SINK: &str = "camera_sink";

/// What a pipeline is for; decides which error kind its failures map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Capture,
    Encode,
    Display,
}

impl PipelineKind {
    fn error(self, msg: impl Into<String>) -> DigicamError {
        match self {
            PipelineKind::Capture => DigicamError::device(msg),
            PipelineKind::Encode => DigicamError::encoder(msg),
            PipelineKind::Display => DigicamError::render(msg),
        }
    }
}

/// A parsed launch-line pipeline with start/drain/stop handling.
pub struct GstPipeline {
    name: String,
    kind: PipelineKind,
    pipeline: gst::Pipeline,
    running: Arc<AtomicBool>,
}

impl GstPipeline {
    pub fn from_launch(
        kind: PipelineKind,
        name: impl Into<String>,
        launch: &str,
    ) -> DigicamResult<Self> {
        init_gstreamer()?;
        let name = name.into();

        let element = gst::parse::launch(launch)
            .map_err(|e| kind.error(format!("Failed to build {name} pipeline: {e}")))?;

        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| kind.error(format!("{name} launch line did not produce a pipeline")))?;

        tracing::debug!(pipeline = %name, launch, "Pipeline built");

        Ok(Self {
            name,
            kind,
            pipeline,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a named element and downcast it (e.g. to an `AppSink`).
    pub fn element<T: IsA<gst::Element>>(&self, element_name: &str) -> DigicamResult<T> {
        self.pipeline
            .by_name(element_name)
            .ok_or_else(|| {
                self.kind.error(format!(
                    "{} pipeline has no element named '{element_name}'",
                    self.name
                ))
            })?
            .dynamic_cast::<T>()
            .map_err(|_| {
                self.kind.error(format!(
                    "Element '{element_name}' in {} pipeline has an unexpected type",
                    self.name
                ))
            })
    }

    /// Set the pipeline playing and wait up to `timeout` for the transition.
    pub fn start(&mut self, timeout: Duration) -> DigicamResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            self.kind
                .error(format!("Failed to start {} pipeline: {e:?}", self.name))
        })?;

        let wait = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        match self.pipeline.state(wait) {
            (Ok(_), gst::State::Playing, _) => {}
            (Ok(_), state, _) => {
                tracing::warn!(
                    pipeline = %self.name,
                    ?state,
                    "Pipeline did not reach Playing state within timeout"
                );
            }
            (Err(e), _, _) => {
                let detail = self.take_error().unwrap_or_else(|| format!("{e:?}"));
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(self.kind.error(format!(
                    "{} pipeline failed to reach Playing state: {detail}",
                    self.name
                )));
            }
        }

        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Send EOS, wait for it to drain through muxers, then tear down.
    pub fn stop(&mut self, drain_timeout: Duration) -> DigicamResult<()> {
        self.drain(drain_timeout);
        self.halt()
    }

    /// Send EOS to every source and wait for it to reach the sinks. The
    /// pipeline stays in its current state so sinks can still be read.
    pub fn drain(&self, timeout: Duration) {
        if !self.pipeline.send_event(gst::event::Eos::new()) {
            tracing::warn!(pipeline = %self.name, "Failed to send EOS event; output may be truncated");
            return;
        }
        self.wait_for_eos(timeout);
    }

    /// Tear down immediately without draining. Used for live sources.
    pub fn halt(&mut self) -> DigicamResult<()> {
        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            self.kind
                .error(format!("Failed to stop {} pipeline: {e:?}", self.name))
        })?;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Wait for EOS on the bus without changing state.
    pub fn wait_for_eos(&self, deadline: Duration) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                tracing::warn!(pipeline = %self.name, "EOS drain timed out");
                break;
            }
            let remaining = gst::ClockTime::from_nseconds((deadline - elapsed).as_nanos() as u64);
            match bus.timed_pop(remaining) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!(pipeline = %self.name, "EOS received; pipeline drained");
                        break;
                    }
                    gst::MessageView::Error(e) => {
                        tracing::warn!(
                            pipeline = %self.name,
                            error = %e.error(),
                            "Pipeline error during EOS drain"
                        );
                        break;
                    }
                    _ => {}
                },
                None => {
                    tracing::warn!(pipeline = %self.name, "EOS drain timed out");
                    break;
                }
            }
        }
    }

    /// Pop a pending error message off the bus, if any.
    pub fn take_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(e) => Some(match e.debug() {
                Some(debug) => format!("{} ({debug})", e.error()),
                None => e.error().to_string(),
            }),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for GstPipeline {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}

impl std::fmt::Debug for GstPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GstPipeline")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("running", &self.is_running())
            .finish()
    }
}

pub fn init_gstreamer() -> DigicamResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(DigicamError::unsupported(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Whether a GStreamer element factory is installed.
pub fn element_available(factory: &str) -> bool {
    init_gstreamer().is_ok() && gst::ElementFactory::find(factory).is_some()
}

/// Launch line for a camera feeding RGBA frames into [`CAMERA_SINK`].
///
/// With `ideal` set, the source is asked for that size first; without it
/// the device negotiates whatever it prefers through `decodebin`.
pub fn camera_launch(device: Option<&str>, ideal: Option<(u32, u32)>) -> String {
    let src = match device {
        Some(path) => format!("v4l2src device=\"{}\"", escape_value(path)),
        None => "autovideosrc".to_string(),
    };
    let shaping = match ideal {
        Some((width, height)) => {
            format!("video/x-raw,width={width},height={height} ! videoconvert")
        }
        None => "decodebin ! videoconvert".to_string(),
    };
    format!(
        "{src} ! {shaping} ! video/x-raw,format=RGBA ! appsink name={CAMERA_SINK} max-buffers=1 drop=true sync=false"
    )
}

pub fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_launch_requests_ideal_size_on_device() {
        let launch = camera_launch(Some("/dev/video2"), Some((1280, 720)));
        assert!(launch.starts_with("v4l2src device=\"/dev/video2\" ! "));
        assert!(launch.contains("video/x-raw,width=1280,height=720 ! videoconvert"));
        assert!(launch.ends_with("appsink name=camera_sink max-buffers=1 drop=true sync=false"));
    }

    #[test]
    fn camera_launch_without_constraints_negotiates_freely() {
        let launch = camera_launch(None, None);
        assert!(launch.starts_with("autovideosrc ! decodebin ! videoconvert"));
        assert!(launch.contains("format=RGBA"));
    }

    #[test]
    fn escape_value_quotes_embedded_quotes() {
        assert_eq!(escape_value(r#"/dev/we"ird"#), r#"/dev/we\"ird"#);
        assert_eq!(escape_value(r"a\b"), r"a\\b");
    }
}
