//! The visible canvas.
//!
//! Holds the last composited frame at the current source size, forwards
//! each presented frame to attached presenters (a preview window), and is
//! the surface the recorder samples. Rebinding advances the epoch so a
//! recording made against an earlier capture can tell it is stale.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use digicam_processing_core::Frame;

/// Something that shows presented frames, such as a preview window.
pub trait Presenter: Send {
    fn name(&self) -> &str;

    fn present(&mut self, frame: &Frame) -> digicam_common::error::DigicamResult<()>;
}

/// A copy of the surface contents at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceFrame {
    pub frame: Frame,
    /// Number of frames presented up to and including this one.
    pub sequence: u64,
    pub epoch: u64,
}

#[derive(Clone, Default)]
pub struct DisplaySurface {
    inner: Arc<Mutex<SurfaceState>>,
}

#[derive(Default)]
struct SurfaceState {
    width: u32,
    height: u32,
    latest: Option<Frame>,
    presented: u64,
    epoch: u64,
    presenters: Vec<Box<dyn Presenter>>,
}

impl DisplaySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> (u32, u32) {
        let state = self.state();
        (state.width, state.height)
    }

    /// Match the surface to the source size. Returns `true` if it changed;
    /// a resize discards the previous contents.
    pub fn resize(&self, width: u32, height: u32) -> bool {
        let mut state = self.state();
        if (state.width, state.height) == (width, height) {
            return false;
        }
        state.width = width;
        state.height = height;
        state.latest = None;
        true
    }

    /// Show a composited frame. Presenters that fail are detached.
    pub fn present(&self, frame: Frame) {
        let mut state = self.state();
        if frame.dimensions() != (state.width, state.height) {
            state.width = frame.width();
            state.height = frame.height();
        }

        state.presenters.retain_mut(|presenter| match presenter.present(&frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(presenter = presenter.name(), error = %e, "Detaching presenter");
                false
            }
        });

        state.presented += 1;
        state.latest = Some(frame);
    }

    pub fn snapshot(&self) -> Option<SurfaceFrame> {
        let state = self.state();
        state.latest.as_ref().map(|frame| SurfaceFrame {
            frame: frame.clone(),
            sequence: state.presented,
            epoch: state.epoch,
        })
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.state().latest.clone()
    }

    pub fn frames_presented(&self) -> u64 {
        self.state().presented
    }

    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// Bind the surface to a new capture. Returns the new epoch.
    pub fn rebind(&self) -> u64 {
        let mut state = self.state();
        state.epoch += 1;
        state.latest = None;
        state.epoch
    }

    pub fn attach(&self, presenter: Box<dyn Presenter>) {
        tracing::debug!(presenter = presenter.name(), "Presenter attached");
        self.state().presenters.push(presenter);
    }

    pub fn presenter_count(&self) -> usize {
        self.state().presenters.len()
    }
}

impl std::fmt::Debug for DisplaySurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("DisplaySurface")
            .field("width", &state.width)
            .field("height", &state.height)
            .field("presented", &state.presented)
            .field("epoch", &state.epoch)
            .field("presenters", &state.presenters.len())
            .finish()
    }
}
