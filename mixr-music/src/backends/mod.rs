//! Built-in music backends
//!
//! - `synth`: note-stream songs rendered with an instrument bank
//! - `symphonia`: WAV, Ogg Vorbis, MP3 and FLAC via symphonia

pub mod symphonia;
pub mod synth;

use crate::error::Result;
use crate::music::registry::BackendRegistry;
use std::sync::Arc;
use synth::{SynthBackend, SynthOptions};

/// Register every built-in backend, synth first
pub fn register_builtin(registry: &BackendRegistry, synth: SynthOptions) -> Result<Arc<SynthBackend>> {
    let synth = Arc::new(SynthBackend::new(synth));
    registry.register(synth.clone())?;
    registry.register(Arc::new(symphonia::SymphoniaBackend::new()))?;
    Ok(synth)
}
