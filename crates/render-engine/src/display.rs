//! Live preview window fed from the display surface.

use std::time::Duration;

use digicam_capture_engine::pipeline::{GstPipeline, PipelineKind};
use digicam_capture_engine::Presenter;
use digicam_common::error::{DigicamError, DigicamResult};
use digicam_processing_core::Frame;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

const WINDOW_SOURCE: &str = "window_src";

/// Shows presented frames in an `autovideosink` window. Closing the window
/// surfaces as an error, which detaches the presenter.
pub struct GstWindowPresenter {
    pipeline: GstPipeline,
    appsrc: gst_app::AppSrc,
    size: Option<(u32, u32)>,
}

impl GstWindowPresenter {
    pub fn new() -> DigicamResult<Self> {
        let mut pipeline =
            GstPipeline::from_launch(PipelineKind::Display, "window", &window_launch())?;
        let appsrc: gst_app::AppSrc = pipeline.element(WINDOW_SOURCE)?;
        pipeline.start(Duration::from_secs(2))?;
        Ok(Self {
            pipeline,
            appsrc,
            size: None,
        })
    }
}

impl Presenter for GstWindowPresenter {
    fn name(&self) -> &str {
        "window"
    }

    fn present(&mut self, frame: &Frame) -> DigicamResult<()> {
        if let Some(error) = self.pipeline.take_error() {
            return Err(DigicamError::render(error));
        }

        if self.size != Some(frame.dimensions()) {
            let caps = gst_video::VideoInfo::builder(
                gst_video::VideoFormat::Rgba,
                frame.width(),
                frame.height(),
            )
            .build()
            .and_then(|info| info.to_caps())
            .map_err(|e| DigicamError::render(format!("Invalid window caps: {e}")))?;
            self.appsrc.set_caps(Some(&caps));
            self.size = Some(frame.dimensions());
        }

        let buffer = gst::Buffer::from_mut_slice(frame.as_bytes().to_vec());
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| DigicamError::render(format!("Window rejected frame: {e:?}")))?;
        Ok(())
    }
}

impl Drop for GstWindowPresenter {
    fn drop(&mut self) {
        let _ = self.pipeline.halt();
    }
}

fn window_launch() -> String {
    format!(
        "appsrc name={WINDOW_SOURCE} is-live=true do-timestamp=true format=time \
         ! videoconvert ! autovideosink sync=false"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_launch_feeds_autovideosink() {
        let launch = window_launch();
        assert!(launch.starts_with("appsrc name=window_src is-live=true"));
        assert!(launch.ends_with("! videoconvert ! autovideosink sync=false"));
    }
}
