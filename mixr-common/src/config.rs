//! Configuration discovery and TOML loading
//!
//! Backends that need an external configuration resource (instrument banks,
//! patch sets) locate it with [`ConfigSearch`], which applies this order:
//! 1. Environment variable (exclusive: no other candidate is tried)
//! 2. User-supplied override (exclusive: no other candidate is tried)
//! 3. Platform default paths, in the order given
//! 4. The backend's built-in default
//!
//! The first candidate whose initializer succeeds wins.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One place a configuration may come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCandidate {
    /// A configuration file on disk
    File(PathBuf),
    /// The consumer's compiled-in default
    BuiltIn,
}

impl ConfigCandidate {
    /// Path of a file candidate, `None` for the built-in default
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigCandidate::File(path) => Some(path),
            ConfigCandidate::BuiltIn => None,
        }
    }
}

impl fmt::Display for ConfigCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigCandidate::File(path) => write!(f, "{}", path.display()),
            ConfigCandidate::BuiltIn => write!(f, "<built-in>"),
        }
    }
}

/// Ordered search over configuration candidates
#[derive(Debug, Clone)]
pub struct ConfigSearch {
    subject: String,
    env_var: Option<String>,
    user_override: Option<PathBuf>,
    platform_defaults: Vec<PathBuf>,
    builtin_fallback: bool,
}

impl ConfigSearch {
    /// Start a search for `subject` (used in log and error messages)
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            env_var: None,
            user_override: None,
            platform_defaults: Vec::new(),
            builtin_fallback: true,
        }
    }

    /// Environment variable holding an explicit configuration path
    pub fn env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = Some(name.into());
        self
    }

    /// Path supplied by the application user
    pub fn user_override(mut self, path: Option<PathBuf>) -> Self {
        self.user_override = path;
        self
    }

    /// Append one platform default path
    pub fn platform_default(mut self, path: impl Into<PathBuf>) -> Self {
        self.platform_defaults.push(path.into());
        self
    }

    /// Append several platform default paths
    pub fn platform_defaults<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.platform_defaults.extend(paths);
        self
    }

    /// Whether the built-in default ends the search (default: true)
    pub fn builtin_fallback(mut self, enabled: bool) -> Self {
        self.builtin_fallback = enabled;
        self
    }

    /// Candidates in the order they will be tried.
    ///
    /// An explicit environment variable or user override yields exactly one
    /// candidate.
    pub fn candidates(&self) -> Vec<ConfigCandidate> {
        if let Some(path) = self.explicit_path() {
            return vec![ConfigCandidate::File(path)];
        }

        let mut candidates: Vec<ConfigCandidate> = self
            .platform_defaults
            .iter()
            .cloned()
            .map(ConfigCandidate::File)
            .collect();
        if self.builtin_fallback {
            candidates.push(ConfigCandidate::BuiltIn);
        }
        candidates
    }

    /// Try each candidate with `init` until one succeeds.
    ///
    /// # Returns
    /// The initializer's value and the candidate that produced it.
    ///
    /// # Errors
    /// [`Error::CandidatesExhausted`] when every candidate failed; the message
    /// carries the last failure.
    pub fn resolve<T, E, F>(&self, mut init: F) -> Result<(T, ConfigCandidate)>
    where
        E: fmt::Display,
        F: FnMut(&ConfigCandidate) -> std::result::Result<T, E>,
    {
        let candidates = self.candidates();
        let mut tried = Vec::with_capacity(candidates.len());
        let mut last_error = String::from("no candidates");

        for candidate in candidates {
            debug!("{}: trying configuration {}", self.subject, candidate);
            match init(&candidate) {
                Ok(value) => {
                    debug!("{}: configured from {}", self.subject, candidate);
                    return Ok((value, candidate));
                }
                Err(e) => {
                    debug!("{}: {} rejected: {}", self.subject, candidate, e);
                    last_error = e.to_string();
                    tried.push(candidate.to_string());
                }
            }
        }

        warn!(
            "{}: no configuration candidate initialized ({})",
            self.subject, last_error
        );
        Err(Error::CandidatesExhausted {
            subject: self.subject.clone(),
            tried: format!("{}; last error: {}", tried.join(", "), last_error),
        })
    }

    fn explicit_path(&self) -> Option<PathBuf> {
        if let Some(name) = &self.env_var {
            if let Ok(value) = std::env::var(name) {
                if !value.is_empty() {
                    return Some(PathBuf::from(value));
                }
            }
        }
        self.user_override.clone()
    }
}

/// Per-user configuration file `<config dir>/mixr/<file_name>`, if the
/// platform has a configuration directory
pub fn user_config_file(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mixr").join(file_name))
}

/// Read and deserialize a TOML file
pub fn read_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|source| Error::Toml {
        path: path.to_path_buf(),
        source,
    })
}
