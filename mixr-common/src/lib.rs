//! # mixr Common Library
//!
//! Shared code for the mixr crates:
//! - Error type used by configuration helpers
//! - Configuration discovery (environment, user override, platform defaults,
//!   built-in fallback)
//! - TOML file loading

pub mod config;
pub mod error;

pub use config::{ConfigCandidate, ConfigSearch};
pub use error::{Error, Result};
