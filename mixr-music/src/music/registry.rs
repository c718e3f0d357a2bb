//! Backend registry and process-wide lifecycle
//!
//! The registry owns every registered [`MusicBackend`] together with an open
//! count. [`BackendRegistry::acquire`] opens a backend on first use and hands
//! out a [`BackendLease`]; sessions keep a clone of the lease, and the backend
//! is closed when the last lease is dropped. All `open`/`close` calls happen
//! under the registry lock, so at most one is in flight at a time.

use crate::audio::spec::AudioSpec;
use crate::error::{Error, Result};
use crate::music::interface::{MusicBackend, MusicType};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

struct Entry {
    backend: Arc<dyn MusicBackend>,
    open_count: usize,
}

/// Registered backends and their open counts, for one target spec
pub struct BackendRegistry {
    target: AudioSpec,
    entries: Mutex<Vec<Entry>>,
}

impl BackendRegistry {
    /// Create an empty registry for `target`.
    ///
    /// # Errors
    /// [`Error::InvalidSpec`] when the target spec is unusable.
    pub fn new(target: AudioSpec) -> Result<Arc<Self>> {
        target.validate()?;
        Ok(Arc::new(Self {
            target,
            entries: Mutex::new(Vec::new()),
        }))
    }

    /// Output spec every backend opened here renders towards
    pub fn target_spec(&self) -> AudioSpec {
        self.target
    }

    /// Add a backend; names must be unique
    pub fn register(&self, backend: Arc<dyn MusicBackend>) -> Result<()> {
        let mut entries = self.lock();
        if entries.iter().any(|e| e.backend.name() == backend.name()) {
            return Err(Error::Config(format!(
                "backend '{}' is already registered",
                backend.name()
            )));
        }
        debug!("Registered music backend '{}'", backend.name());
        entries.push(Entry {
            backend,
            open_count: 0,
        });
        Ok(())
    }

    /// Names of registered backends, in registration order
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.lock().iter().map(|e| e.backend.name()).collect()
    }

    /// How many leases currently hold `name` open
    pub fn open_count(&self, name: &str) -> usize {
        self.lock()
            .iter()
            .find(|e| e.backend.name() == name)
            .map(|e| e.open_count)
            .unwrap_or(0)
    }

    /// Open the named backend (if not already open) and lease it.
    ///
    /// # Errors
    /// [`Error::BackendUnavailable`] for unknown names; the backend's own
    /// error when `open` fails (the count stays at zero and a later call
    /// retries).
    pub fn acquire(self: &Arc<Self>, name: &str) -> Result<BackendLease> {
        let mut entries = self.lock();
        let index = entries
            .iter()
            .position(|e| e.backend.name() == name)
            .ok_or_else(|| Error::BackendUnavailable(format!("no backend named '{}'", name)))?;
        self.open_entry(&mut entries, index)
    }

    /// Lease the first registered backend for `music_type` that opens.
    ///
    /// Backends are tried in registration order; one that fails to open is
    /// skipped.
    pub fn acquire_for(self: &Arc<Self>, music_type: MusicType) -> Result<BackendLease> {
        let mut entries = self.lock();
        let mut last_error = None;

        for index in 0..entries.len() {
            if !entries[index].backend.music_types().contains(&music_type) {
                continue;
            }
            match self.open_entry(&mut entries, index) {
                Ok(lease) => return Ok(lease),
                Err(e) => {
                    warn!(
                        "Backend '{}' unavailable for {}: {}",
                        entries[index].backend.name(),
                        music_type,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::BackendUnavailable(format!("no backend decodes {}", music_type))
        }))
    }

    fn open_entry(self: &Arc<Self>, entries: &mut [Entry], index: usize) -> Result<BackendLease> {
        let entry = &mut entries[index];
        if entry.open_count == 0 {
            entry.backend.open(&self.target)?;
            info!("Opened music backend '{}' for {}", entry.backend.name(), self.target);
        }
        entry.open_count += 1;

        Ok(BackendLease {
            registry: Arc::clone(self),
            backend: Arc::clone(&entry.backend),
            index,
        })
    }

    fn retain(&self, index: usize) {
        let mut entries = self.lock();
        entries[index].open_count += 1;
    }

    fn release(&self, index: usize) {
        let mut entries = self.lock();
        let entry = &mut entries[index];
        entry.open_count = entry.open_count.saturating_sub(1);
        if entry.open_count == 0 {
            entry.backend.close();
            info!("Closed music backend '{}'", entry.backend.name());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        // A panic inside open/close leaves the counts consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps one backend open; cloning adds a reference, dropping removes one
pub struct BackendLease {
    registry: Arc<BackendRegistry>,
    backend: Arc<dyn MusicBackend>,
    index: usize,
}

impl BackendLease {
    pub fn backend(&self) -> &dyn MusicBackend {
        self.backend.as_ref()
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Spec the backend was opened for
    pub fn target_spec(&self) -> AudioSpec {
        self.registry.target
    }
}

impl Clone for BackendLease {
    fn clone(&self) -> Self {
        self.registry.retain(self.index);
        Self {
            registry: Arc::clone(&self.registry),
            backend: Arc::clone(&self.backend),
            index: self.index,
        }
    }
}

impl Drop for BackendLease {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}

impl std::fmt::Debug for BackendLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendLease")
            .field("backend", &self.backend.name())
            .field("target", &self.registry.target)
            .finish()
    }
}
