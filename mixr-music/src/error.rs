//! Error types for mixr-music
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for mixr-music
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors bubbled up from the shared configuration layer
    #[error(transparent)]
    Common(#[from] mixr_common::Error),

    /// Process-wide backend initialization failed
    #[error("Backend {backend} failed to open: {message}")]
    BackendInit {
        backend: &'static str,
        message: String,
    },

    /// Backend is not registered or not opened
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Format conversion errors (adapter, resampler)
    #[error("Format adapter error: {0}")]
    Adapter(String),

    /// Optional operation not provided by the backend
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    /// Audio spec cannot be used for playback
    #[error("Invalid audio spec: {0}")]
    InvalidSpec(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::Unsupported`]
    pub fn unsupported(operation: &'static str, backend: &'static str) -> Self {
        Error::Unsupported { operation, backend }
    }

    /// True when the error only reports a missing optional operation
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

/// Convenience Result type using mixr-music Error
pub type Result<T> = std::result::Result<T, Error>;
