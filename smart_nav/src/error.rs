//! Error type shared by every fallible operation in the crate.
//!
//! Degenerate geometry (no path, zero-area contour, empty detection list) is
//! reported as a value and never reaches this enum. Only genuine failures do:
//! malformed input buffers, bad configuration and collaborator faults.

use thiserror::Error;

/// Errors produced by the navigation pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum NavError {
    /// A frame buffer does not match the dimensions it claims.
    #[error("frame buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// A configuration value is outside its valid range.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// The configuration file is not valid YAML for [`crate::config::NavConfig`].
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// The frame source could not deliver a frame.
    #[error("frame capture failed: {0}")]
    Capture(String),

    /// The actuator refused or failed to execute a command.
    #[error("actuator error: {0}")]
    Actuator(String),

    /// The transport could not deliver a record.
    #[error("transport error: {0}")]
    Transport(String),

    /// An image could not be decoded or encoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl NavError {
    /// Create an invalid-configuration error.
    #[must_use]
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Create an actuator error.
    #[must_use]
    pub fn actuator(message: impl Into<String>) -> Self {
        Self::Actuator(message.into())
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a capture error.
    #[must_use]
    pub fn capture(message: impl Into<String>) -> Self {
        Self::Capture(message.into())
    }
}

/// Shorthand result alias.
pub type NavResult<T> = Result<T, NavError>;
