//! Digicam Processing Core — the per-frame image pipeline
//!
//! - **Frame:** RGBA8 pixel buffer with a checked length invariant
//! - **Effect Kernels:** per-pixel tone, channel, and scanline transforms
//! - **Overlay Compositor:** vignette, grain, and the timestamp badge
//!
//! This crate is pure computation with no I/O and no platform dependencies.
//! All inputs are data; all outputs are data.

pub mod effect;
pub mod frame;
pub mod glyphs;
pub mod kernels;
pub mod overlay;

pub use effect::{EffectConfig, EffectId, Intensity};
pub use frame::Frame;
pub use kernels::{apply, apply_in_place};
pub use overlay::{Compositor, GrainTexture};
