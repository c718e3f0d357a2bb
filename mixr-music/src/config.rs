//! Configuration for mixr-music
//!
//! Settings come from, highest priority first:
//! 1. Command-line arguments
//! 2. TOML file (`--config`, else `MIXR_CONFIG`, else
//!    `<config dir>/mixr/config.toml`)
//! 3. Built-in defaults
//!
//! A missing TOML file is not an error: a warning is logged and the defaults
//! are used.

use crate::audio::spec::{AudioSpec, SampleFormat, MAX_VOLUME};
use crate::error::{Error, Result};
use crate::music::session::{EndDetection, SessionOptions};
use crate::music::state::PlayCount;
use mixr_common::config::{read_toml_file, user_config_file};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML configuration file
pub const CONFIG_ENV: &str = "MIXR_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub synth: SynthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target output spec
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_frequency")]
    pub frequency: u32,

    #[serde(default = "default_format")]
    pub format: SampleFormat,

    #[serde(default = "default_channels")]
    pub channels: u16,
}

/// Session defaults
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// Decoder production unit override, in frames
    #[serde(default)]
    pub unit_frames: Option<usize>,

    #[serde(default)]
    pub end_detection: EndDetection,

    /// 0 to 128
    #[serde(default = "default_volume")]
    pub volume: i32,

    /// Play-throughs; negative loops forever
    #[serde(default = "default_loops")]
    pub loops: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SynthConfig {
    /// Instrument bank file, tried before the platform defaults
    #[serde(default)]
    pub config: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_frequency() -> u32 {
    44100
}

fn default_format() -> SampleFormat {
    SampleFormat::S16
}

fn default_channels() -> u16 {
    2
}

fn default_volume() -> i32 {
    MAX_VOLUME as i32
}

fn default_loops() -> i32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            format: default_format(),
            channels: default_channels(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            unit_frames: None,
            end_detection: EndDetection::default(),
            volume: default_volume(),
            loops: default_loops(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl OutputConfig {
    pub fn spec(&self) -> AudioSpec {
        AudioSpec::new(self.frequency, self.format, self.channels)
    }
}

impl PlaybackConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            end_detection: self.end_detection,
            unit_frames: self.unit_frames,
        }
    }

    pub fn play_count(&self) -> PlayCount {
        PlayCount::from_raw(self.loops)
    }
}

impl TomlConfig {
    /// Read and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: TomlConfig = read_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first configured location, falling back to defaults.
    ///
    /// An explicit `cli_path` must exist; the environment and per-user
    /// locations are optional.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            let config = Self::from_file(path)?;
            info!("Loaded configuration from {}", path.display());
            return Ok(config);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                let config = Self::from_file(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No configuration directory, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// `MIXR_CONFIG` if set, else the per-user file
    pub fn default_path() -> Option<PathBuf> {
        match std::env::var(CONFIG_ENV) {
            Ok(value) if !value.is_empty() => Some(PathBuf::from(value)),
            _ => user_config_file("config.toml"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.output.spec().validate()?;
        if self.playback.unit_frames == Some(0) {
            return Err(Error::Config("playback.unit_frames must be at least 1".into()));
        }
        if !(0..=MAX_VOLUME as i32).contains(&self.playback.volume) {
            return Err(Error::Config(format!(
                "playback.volume {} outside 0..={}",
                self.playback.volume, MAX_VOLUME
            )));
        }
        Ok(())
    }
}
