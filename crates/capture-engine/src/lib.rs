//! Digicam Capture Engine
//!
//! Owns the live camera and the per-tick render loop. Each tick pulls the
//! newest camera frame, runs the effect kernels and overlays, and presents
//! the result on the shared display surface that the recorder samples.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                 FrameScheduler                  │
//! │  ┌───────────────┐      ┌────────────────────┐  │
//! │  │ CameraBackend │─────▶│  CaptureSession    │  │
//! │  │ (GStreamer)   │      │  (one live source) │  │
//! │  └───────────────┘      └─────────┬──────────┘  │
//! │                                   │ Frame       │
//! │                                   ▼             │
//! │             kernels ──▶ overlay compositor       │
//! │                                   │             │
//! │                                   ▼             │
//! │  ┌────────────────────────────────────────────┐ │
//! │  │    DisplaySurface  ──▶  presenters (window) │ │
//! │  └────────────────────────────────────────────┘ │
//! └────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod device;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod surface;

pub use backend::{AudioTrack, CameraBackend, CameraRequest, CameraSource, DeviceInfo, FacingMode};
pub use scheduler::{FrameScheduler, SchedulerState, StartOutcome, TickOutcome};
pub use session::{ActiveCapture, CaptureSession};
pub use surface::{DisplaySurface, Presenter, SurfaceFrame};
