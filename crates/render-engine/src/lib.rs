//! Digicam Render Engine
//!
//! Everything downstream of the display surface: the recording sink and its
//! WebM encoder, the live preview window, and file export.
//!
//! # Recording Pipeline
//!
//! ```text
//! DisplaySurface ── 30 Hz sample ──▶ RecordingSink
//!                                        │ Frame + pts
//!                                        ▼
//!                         appsrc ─▶ vp9enc / vp8enc ─┐
//!                  microphone ─▶ opusenc ────────────┤
//!                                                    ▼
//!                                          webmmux ─▶ chunks
//!                                                    │
//!                                                    ▼
//!                                      Clip ─▶ digicam_<ms>.webm
//! ```

pub mod display;
pub mod encoder;
pub mod export;
pub mod recorder;

pub use display::GstWindowPresenter;
pub use encoder::{
    negotiate, ChunkEncoder, EncoderFactory, EncoderSettings, GstWebmEncoderFactory, VideoCodec,
};
pub use export::{export_still, load_frame, load_grain_texture, output_file_name};
pub use recorder::{spawn_sampler, Clip, EndReason, RecordingSettings, RecordingSink};
