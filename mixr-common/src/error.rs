//! Common error types for mixr

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for mixr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across mixr crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every configuration candidate was tried and none initialized
    #[error("No usable configuration for {subject} (tried: {tried})")]
    CandidatesExhausted { subject: String, tried: String },
}
