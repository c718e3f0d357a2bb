//! Synth backend: note-stream songs rendered with an instrument bank
//!
//! Opening the backend loads the instrument bank. The bank location is
//! resolved with [`ConfigSearch`]:
//! 1. `MIXR_SYNTH_CFG` environment variable
//! 2. Override set with [`SynthBackend::set_config_override`]
//! 3. Platform defaults (user config dir, then system locations)
//! 4. The compiled-in bank
//!
//! Songs are read completely when a decoder is created. Output is rendered at
//! the target rate and format, with at most two channels.

mod decoder;
pub mod patches;
pub mod song;

use crate::audio::spec::{AudioSpec, MAX_NATIVE_SYNTH_CHANNELS};
use crate::error::{Error, Result};
use crate::music::interface::{MusicBackend, MusicDecoder, MusicType};
use crate::music::source::MusicSource;
use decoder::SynthDecoder;
use mixr_common::config::{user_config_file, ConfigCandidate, ConfigSearch};
use patches::InstrumentBank;
use song::Song;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub const BACKEND_NAME: &str = "synth";

/// Environment variable naming an instrument bank file
pub const SYNTH_CONFIG_ENV: &str = "MIXR_SYNTH_CFG";

/// Platform locations searched for an instrument bank
pub fn default_bank_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = user_config_file("synth.toml") {
        paths.push(path);
    }
    #[cfg(windows)]
    paths.push(PathBuf::from(r"C:\MIXR\SYNTH.TOML"));
    #[cfg(not(windows))]
    {
        paths.push(PathBuf::from("/etc/mixr-synth.toml"));
        paths.push(PathBuf::from("/etc/mixr/synth.toml"));
    }
    paths
}

/// Bank discovery settings
#[derive(Debug, Clone)]
pub struct SynthOptions {
    pub platform_defaults: Vec<PathBuf>,
    /// Use the compiled-in bank when no file initializes
    pub builtin_fallback: bool,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            platform_defaults: default_bank_paths(),
            builtin_fallback: true,
        }
    }
}

struct LoadedBank {
    bank: Arc<InstrumentBank>,
    origin: ConfigCandidate,
}

pub struct SynthBackend {
    options: SynthOptions,
    config_override: Mutex<Option<PathBuf>>,
    loaded: Mutex<Option<LoadedBank>>,
}

impl SynthBackend {
    pub fn new(options: SynthOptions) -> Self {
        Self {
            options,
            config_override: Mutex::new(None),
            loaded: Mutex::new(None),
        }
    }

    /// Use `path` as the instrument bank on the next open
    pub fn set_config_override(&self, path: Option<PathBuf>) {
        *lock(&self.config_override) = path;
    }

    /// Where the open bank came from, `None` while closed
    pub fn bank_origin(&self) -> Option<ConfigCandidate> {
        lock(&self.loaded).as_ref().map(|l| l.origin.clone())
    }

    fn search(&self) -> ConfigSearch {
        ConfigSearch::new("synth instrument bank")
            .env_var(SYNTH_CONFIG_ENV)
            .user_override(lock(&self.config_override).clone())
            .platform_defaults(self.options.platform_defaults.iter().cloned())
            .builtin_fallback(self.options.builtin_fallback)
    }
}

impl Default for SynthBackend {
    fn default() -> Self {
        Self::new(SynthOptions::default())
    }
}

impl MusicBackend for SynthBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn music_types(&self) -> &'static [MusicType] {
        &[MusicType::Midi]
    }

    fn open(&self, _target: &AudioSpec) -> Result<()> {
        let (bank, origin) = self
            .search()
            .resolve(|candidate| match candidate {
                ConfigCandidate::File(path) => InstrumentBank::load(path),
                ConfigCandidate::BuiltIn => Ok(InstrumentBank::builtin()),
            })
            .map_err(|e| Error::BackendInit {
                backend: BACKEND_NAME,
                message: e.to_string(),
            })?;

        info!(
            "Synth instrument bank loaded from {} ({} instruments)",
            origin,
            bank.len()
        );
        *lock(&self.loaded) = Some(LoadedBank {
            bank: Arc::new(bank),
            origin,
        });
        Ok(())
    }

    fn close(&self) {
        if lock(&self.loaded).take().is_some() {
            debug!("Synth instrument bank released");
        }
    }

    fn create_decoder(&self, mut source: MusicSource, target: &AudioSpec) -> Result<Box<dyn MusicDecoder>> {
        let bank = lock(&self.loaded)
            .as_ref()
            .map(|l| Arc::clone(&l.bank))
            .ok_or_else(|| Error::BackendUnavailable("synth backend is not open".into()))?;

        let bytes = source.read_to_end()?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::Decode(format!("song is not UTF-8: {}", e)))?;
        let song = Song::parse(&text)?;
        let retained = source.finish();

        let spec = target.with_max_channels(MAX_NATIVE_SYNTH_CHANNELS);
        spec.validate()?;

        debug!(
            "Synth song {:?}: {} track(s) at {} bpm",
            song.title,
            song.tracks.len(),
            song.tempo
        );
        Ok(Box::new(SynthDecoder::new(spec, bank, song, retained)?))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
