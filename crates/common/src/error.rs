//! Error types shared across Digicam crates.

use std::path::PathBuf;

/// Top-level error type for Digicam operations.
#[derive(Debug, thiserror::Error)]
pub enum DigicamError {
    /// Camera or microphone could not be opened (missing, busy, denied).
    #[error("Device error: {message}")]
    Device { message: String },

    /// The capture API itself is missing from this environment.
    #[error("Unsupported environment: {message}")]
    Unsupported { message: String },

    #[error("Encoder error: {message}")]
    Encoder { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No active capture session")]
    NoActiveCapture,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using DigicamError.
pub type DigicamResult<T> = Result<T, DigicamError>;

impl DigicamError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the error should be shown to the operator (as opposed to
    /// being recovered locally).
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Device { .. } | Self::Unsupported { .. } | Self::NoActiveCapture
        )
    }
}
