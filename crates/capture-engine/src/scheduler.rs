//! The capture/render loop.
//!
//! [`FrameScheduler`] owns at most one [`CaptureSession`]. `start` releases
//! the current camera before acquiring the next, and acquisitions are
//! serialised; a generation counter lets any start that was overtaken by a
//! later `start`/`stop` discard what it acquired. Ending a session for any
//! reason advances the surface epoch, so recordings bound to it finalise.
//! `tick` renders one frame: poll, apply the effect kernel, compose
//! overlays, present. Camera release and pixel work run on the blocking
//! pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use digicam_common::clock::{badge_timestamp, RateController};
use digicam_common::error::{DigicamError, DigicamResult};
use digicam_processing_core::{kernels, Compositor, EffectConfig, Frame};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::backend::{CameraBackend, CameraRequest, CameraSource, DeviceInfo};
use crate::session::{ActiveCapture, CaptureSession};
use crate::surface::DisplaySurface;

type TimestampSource = Box<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Capturing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        session_id: u64,
        width: u32,
        height: u32,
    },
    /// A later start or stop overtook this one; whatever it acquired was
    /// released.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No capture session.
    Idle,
    /// No fresh camera frame; the surface keeps its previous contents.
    Skipped,
    Rendered,
}

pub struct FrameScheduler {
    backend: Arc<dyn CameraBackend>,
    request: CameraRequest,
    surface: DisplaySurface,
    effect: watch::Receiver<EffectConfig>,
    compositor: Arc<Compositor>,
    timestamp: TimestampSource,
    refresh: Duration,
    session: Mutex<Option<CaptureSession>>,
    acquire_lock: Mutex<()>,
    generation: AtomicU64,
    next_session_id: AtomicU64,
    loop_running: AtomicBool,
}

impl FrameScheduler {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        surface: DisplaySurface,
        effect: watch::Receiver<EffectConfig>,
    ) -> Self {
        Self {
            backend,
            request: CameraRequest::default(),
            surface,
            effect,
            compositor: Arc::new(Compositor::new(None)),
            timestamp: Box::new(badge_timestamp),
            refresh: RateController::new(60).interval(),
            session: Mutex::new(None),
            acquire_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            next_session_id: AtomicU64::new(0),
            loop_running: AtomicBool::new(false),
        }
    }

    pub fn with_request(mut self, request: CameraRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = Arc::new(compositor);
        self
    }

    pub fn with_refresh_hz(mut self, hz: u32) -> Self {
        self.refresh = RateController::new(hz).interval();
        self
    }

    /// Override the badge clock (tests use a fixed string).
    pub fn with_timestamp_source(
        mut self,
        source: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.timestamp = Box::new(source);
        self
    }

    pub fn surface(&self) -> &DisplaySurface {
        &self.surface
    }

    pub async fn enumerate_devices(&self) -> DigicamResult<Vec<DeviceInfo>> {
        if !self.backend.is_supported() {
            return Err(self.unsupported());
        }
        self.backend.enumerate_devices().await
    }

    /// Acquire a camera (`None` = backend's choice) and make it the active
    /// session, releasing the previous one first.
    pub async fn start(&self, device_id: Option<String>) -> DigicamResult<StartOutcome> {
        if !self.backend.is_supported() {
            let err = self.unsupported();
            tracing::error!(error = %err, "Camera capture unavailable");
            return Err(err);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _acquiring = self.acquire_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "Start superseded before acquisition");
            return Ok(StartOutcome::Superseded);
        }

        self.release_current().await;

        let request = self.request.clone().with_device(device_id);
        tracing::info!(device = ?request.device_id, "Acquiring camera");
        let source = match self.backend.acquire(&request).await {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(error = %e, "Camera acquisition failed");
                return Err(e);
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::info!(device = %source.device().id, "Discarding stale camera acquisition");
            release_source(source).await;
            return Ok(StartOutcome::Superseded);
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session = CaptureSession::new(session_id, source);
        let (width, height) = session
            .resolution()
            .unwrap_or((request.ideal_width, request.ideal_height));

        self.surface.rebind();
        self.surface.resize(width, height);
        *self.session.lock().await = Some(session);

        tracing::info!(session = session_id, width, height, "Capture session started");
        Ok(StartOutcome::Started {
            session_id,
            width,
            height,
        })
    }

    /// Release the camera and cancel any start still in flight.
    pub async fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.release_current().await;
    }

    async fn release_current(&self) {
        let previous = self.session.lock().await.take();
        if let Some(session) = previous {
            self.end_session(session).await;
        }
    }

    /// Invalidate the surface for the ended session, then release it.
    async fn end_session(&self, session: CaptureSession) {
        let epoch = self.surface.rebind();
        tracing::debug!(session = session.id(), epoch, "Surface unbound");
        release_session(session).await;
    }

    pub async fn state(&self) -> SchedulerState {
        match *self.session.lock().await {
            Some(_) => SchedulerState::Capturing,
            None => SchedulerState::Idle,
        }
    }

    pub async fn active_capture(&self) -> Option<ActiveCapture> {
        let guard = self.session.lock().await;
        guard.as_ref().map(|session| ActiveCapture {
            session_id: session.id(),
            surface: self.surface.clone(),
            epoch: self.surface.epoch(),
            audio: session.audio_tracks(),
        })
    }

    /// Render one frame.
    ///
    /// A stream error releases the session, leaving the scheduler idle.
    pub async fn tick(&self) -> DigicamResult<TickOutcome> {
        let (polled, epoch) = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Ok(TickOutcome::Idle);
            };
            let epoch = self.surface.epoch();
            match session.poll_frame() {
                Ok(frame) => (Ok(frame), epoch),
                Err(e) => {
                    tracing::error!(session = session.id(), error = %e, "Camera stream failed");
                    (Err((e, guard.take())), epoch)
                }
            }
        };

        let frame = match polled {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(TickOutcome::Skipped),
            Err((e, failed)) => {
                if let Some(session) = failed {
                    self.end_session(session).await;
                }
                return Err(e);
            }
        };

        if self.render(frame, epoch).await? {
            Ok(TickOutcome::Rendered)
        } else {
            Ok(TickOutcome::Skipped)
        }
    }

    /// Returns `false` when the session changed while the frame was being
    /// processed; the frame is dropped.
    async fn render(&self, frame: Frame, epoch: u64) -> DigicamResult<bool> {
        let config = *self.effect.borrow();
        let stamp = (self.timestamp)();
        let compositor = self.compositor.clone();
        let frame = tokio::task::spawn_blocking(move || {
            let mut frame = frame;
            kernels::apply_in_place(&mut frame, &config);
            compositor.compose(&mut frame, &config, &stamp, &mut rand::rng());
            frame
        })
        .await
        .map_err(|e| DigicamError::render(format!("Frame processing task failed: {e}")))?;

        if self.surface.epoch() != epoch {
            tracing::debug!("Dropping frame from a finished session");
            return Ok(false);
        }
        let (width, height) = frame.dimensions();
        if self.surface.resize(width, height) {
            tracing::info!(width, height, "Source resolution changed");
        }
        self.surface.present(frame);
        Ok(true)
    }

    /// Tick at the refresh rate until `stop` is set. Late ticks are
    /// skipped rather than bunched, and each tick runs to completion before
    /// the next begins.
    pub async fn run(&self, stop: Arc<AtomicBool>) -> DigicamResult<()> {
        if self.loop_running.swap(true, Ordering::SeqCst) {
            return Err(DigicamError::render("Render loop is already running"));
        }

        let mut interval = tokio::time::interval(self.refresh);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (mut rendered, mut skipped) = (0u64, 0u64);

        tracing::info!(refresh_ms = self.refresh.as_millis() as u64, "Render loop started");
        while !stop.load(Ordering::SeqCst) {
            interval.tick().await;
            match self.tick().await {
                Ok(TickOutcome::Rendered) => rendered += 1,
                Ok(TickOutcome::Skipped) => skipped += 1,
                Ok(TickOutcome::Idle) => {}
                Err(e) => tracing::warn!(error = %e, "Render tick failed"),
            }
        }

        self.loop_running.store(false, Ordering::SeqCst);
        tracing::info!(rendered, skipped, "Render loop stopped");
        Ok(())
    }

    fn unsupported(&self) -> DigicamError {
        DigicamError::unsupported(format!(
            "Camera capture ({}) is not available in this environment",
            self.backend.name()
        ))
    }
}

async fn release_session(mut session: CaptureSession) {
    let id = session.id();
    match tokio::task::spawn_blocking(move || session.release()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(session = id, error = %e, "Camera release failed"),
        Err(e) => tracing::warn!(session = id, error = %e, "Camera release task failed"),
    }
}

async fn release_source(mut source: Box<dyn CameraSource>) {
    match tokio::task::spawn_blocking(move || source.release()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to release stale camera"),
        Err(e) => tracing::warn!(error = %e, "Stale camera release task failed"),
    }
}
