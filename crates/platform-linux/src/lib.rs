//! Digicam Linux Platform Integration
//!
//! Environment checks for Linux:
//! - **Webcam:** Video4Linux device nodes
//! - **GStreamer:** camera source, encoder and muxer plugins
//! - **Session:** graphical display for the preview window

pub mod permissions;

pub use permissions::{
    check_capabilities, missing_required, print_capability_report, Capability,
};
