//! Digicam Common Utilities
//!
//! Shared infrastructure for all Digicam crates:
//! - Error types and result aliases
//! - Clock, rate control, and wall-clock helpers for the render loop
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
