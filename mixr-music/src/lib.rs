//! mixr-music library
//!
//! Music decoding behind a common codec contract. Backends render native PCM;
//! sessions convert it to one target spec and serve it through a pull
//! protocol with play/loop/stop bookkeeping.

pub mod audio;
pub mod backends;
pub mod config;
pub mod error;
pub mod music;

pub use error::{Error, Result};
