//! Codec session: one open, playable music resource
//!
//! A session owns the decoder handle, the optional format adapter with its
//! scratch buffer, the session volume and the playback state. The adapter and
//! scratch buffer live in one [`Conversion`] value, so one cannot exist
//! without the other.
//!
//! Construction either yields a complete session or an error with everything
//! built so far already released. Dropping the session releases the decoder
//! before the backend lease.

use crate::audio::adapter::FormatAdapter;
use crate::audio::spec::{AudioSpec, MAX_VOLUME};
use crate::audio::volume::clamp_volume;
use crate::error::{Error, Result};
use crate::music::interface::{Capabilities, Capability, MetaTag, MusicDecoder};
use crate::music::registry::{BackendLease, BackendRegistry};
use crate::music::source::{MusicSource, SourceStream};
use crate::music::state::{Action, PlayCount, PlaybackEvent, PlaybackState};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// How a session recognizes the end of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndDetection {
    /// Only an explicit end-of-stream from the decoder ends a pass; short
    /// renders are underruns
    #[default]
    EndOfStream,
    /// Any render shorter than requested also ends a pass
    ShortRead,
}

/// Per-session tuning
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub end_detection: EndDetection,
    /// Override the decoder's production unit (frames)
    pub unit_frames: Option<usize>,
}

/// Adapter plus the scratch buffer the decoder renders into
pub(crate) struct Conversion {
    pub(crate) adapter: FormatAdapter,
    pub(crate) scratch: Vec<u8>,
}

impl Conversion {
    fn new(native: AudioSpec, target: AudioSpec, unit_frames: usize) -> Result<Self> {
        let adapter = FormatAdapter::new(native, target, unit_frames)?;

        let size = adapter.transfer_bytes();
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(size)
            .map_err(|e| Error::Adapter(format!("scratch buffer of {} bytes: {}", size, e)))?;
        scratch.resize(size, 0);

        Ok(Self { adapter, scratch })
    }
}

/// One open music resource
pub struct MusicSession {
    pub(crate) decoder: Box<dyn MusicDecoder>,
    pub(crate) conversion: Option<Conversion>,
    pub(crate) target: AudioSpec,
    pub(crate) capabilities: Capabilities,
    pub(crate) volume: u8,
    pub(crate) state: PlaybackState,
    pub(crate) options: SessionOptions,
    /// Bytes the decoder produced since the current pass started
    pub(crate) produced_in_pass: usize,
    // Declared last: the backend stays open until the decoder is gone
    lease: BackendLease,
}

impl MusicSession {
    /// Build a session from a byte source.
    ///
    /// Creates the decoder, then an adapter and scratch buffer when the
    /// decoder's native spec differs from the lease's target spec.
    ///
    /// # Errors
    /// Any failure while loading the decoder or allocating the adapter; all
    /// parts created before the failure are released.
    pub fn create(lease: &BackendLease, source: MusicSource, options: SessionOptions) -> Result<Self> {
        let target = lease.target_spec();
        let mut decoder = lease.backend().create_decoder(source, &target).map_err(|e| {
            warn!("{}: failed to load music: {}", lease.name(), e);
            e
        })?;

        let native = decoder.native_spec();
        let capabilities = decoder.capabilities();
        let unit_frames = options.unit_frames.unwrap_or_else(|| decoder.unit_frames());

        let conversion = if FormatAdapter::is_needed(&native, &target) {
            let conversion = Conversion::new(native, target, unit_frames).map_err(|e| {
                warn!(
                    "{}: cannot convert {} to {}: {}",
                    lease.name(),
                    native,
                    target,
                    e
                );
                e
            })?;
            Some(conversion)
        } else {
            None
        };

        if capabilities.supports(Capability::NativeVolume) {
            decoder.set_volume(MAX_VOLUME)?;
        }

        debug!(
            "Created {} session: native {}, target {}, adapter: {}, capabilities {:?}",
            lease.name(),
            native,
            target,
            conversion.is_some(),
            capabilities
        );

        Ok(Self {
            decoder,
            conversion,
            target,
            capabilities,
            volume: MAX_VOLUME,
            state: PlaybackState::default(),
            options,
            produced_in_pass: 0,
            lease: lease.clone(),
        })
    }

    /// Build a session with the first registered backend that loads the music.
    ///
    /// Backends are tried in registration order. A failed load consumes its
    /// source, so `open` is called once per backend tried.
    ///
    /// # Errors
    /// [`Error::BackendUnavailable`] when no backend accepts the music; errors
    /// from `open` are returned as they are.
    pub fn probe<F>(registry: &Arc<BackendRegistry>, mut open: F, options: SessionOptions) -> Result<Self>
    where
        F: FnMut() -> Result<MusicSource>,
    {
        let mut rejected = Vec::new();
        for name in registry.backend_names() {
            let lease = match registry.acquire(name) {
                Ok(lease) => lease,
                Err(e) => {
                    debug!("Skipping {}: {}", name, e);
                    rejected.push(name);
                    continue;
                }
            };
            match Self::create(&lease, open()?, options) {
                Ok(session) => return Ok(session),
                Err(e) => {
                    debug!("{} rejected the music: {}", name, e);
                    rejected.push(name);
                }
            }
        }
        Err(Error::BackendUnavailable(format!(
            "no backend could load the music (tried: {})",
            rejected.join(", ")
        )))
    }

    /// Tear the session down now
    pub fn delete(self) {
        debug!("Deleting {} session", self.lease.name());
        drop(self);
    }

    pub fn backend_name(&self) -> &'static str {
        self.lease.name()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.supports(capability)
    }

    /// Spec the decoder renders natively
    pub fn native_spec(&self) -> AudioSpec {
        self.decoder.native_spec()
    }

    /// Spec of the audio returned by [`get_audio`](Self::get_audio)
    pub fn target_spec(&self) -> AudioSpec {
        self.target
    }

    /// Whether decoded audio passes through a format adapter
    pub fn has_adapter(&self) -> bool {
        self.conversion.is_some()
    }

    /// Converted bytes waiting in the adapter
    pub fn buffered_bytes(&self) -> usize {
        self.conversion
            .as_ref()
            .map(|c| c.adapter.available())
            .unwrap_or(0)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Signed repeat count: 0 stopped, -1 forever
    pub fn repeat_count(&self) -> i32 {
        self.state.repeat_count()
    }

    /// Set the session volume, clamped to [0, MAX_VOLUME]
    pub fn set_volume(&mut self, level: i32) -> Result<()> {
        self.volume = clamp_volume(level);
        if self.supports(Capability::NativeVolume) {
            self.decoder.set_volume(self.volume)?;
        }
        Ok(())
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Start playback from the beginning, `count` times
    pub fn play(&mut self, count: PlayCount) -> Result<()> {
        self.apply(PlaybackEvent::Play(count))
    }

    /// Decoder-level activity, independent of buffered audio
    pub fn is_playing(&self) -> bool {
        self.decoder.is_active()
    }

    /// Stop playback; the next pull reports the session as stopped
    pub fn stop(&mut self) -> Result<()> {
        self.apply(PlaybackEvent::Stop)
    }

    pub fn seek(&mut self, position: f64) -> Result<()> {
        self.require(Capability::Seek)?;
        if !position.is_finite() || position < 0.0 {
            return Err(Error::InvalidState(format!("cannot seek to {}", position)));
        }
        self.decoder.seek(position)?;
        self.discard_buffered();
        debug!("{}: seeked to {:.3}s", self.backend_name(), position);
        Ok(())
    }

    pub fn tell(&self) -> Result<f64> {
        self.require(Capability::Tell)?;
        self.decoder.tell()
    }

    pub fn duration(&self) -> Result<f64> {
        self.require(Capability::Duration)?;
        self.decoder.duration()
    }

    pub fn loop_start(&self) -> Result<f64> {
        self.require(Capability::LoopPoints)?;
        self.decoder.loop_start()
    }

    pub fn loop_end(&self) -> Result<f64> {
        self.require(Capability::LoopPoints)?;
        self.decoder.loop_end()
    }

    pub fn loop_length(&self) -> Result<f64> {
        self.require(Capability::LoopPoints)?;
        self.decoder.loop_length()
    }

    pub fn meta_tag(&self, tag: MetaTag) -> Result<Option<String>> {
        self.require(Capability::MetaTags)?;
        self.decoder.meta_tag(tag)
    }

    pub fn num_tracks(&self) -> Result<usize> {
        self.require(Capability::Tracks)?;
        self.decoder.num_tracks()
    }

    /// Switch to `track`; a playing session restarts on the new track
    pub fn start_track(&mut self, track: usize) -> Result<()> {
        self.require(Capability::Tracks)?;
        self.decoder.start_track(track)?;
        self.discard_buffered();
        if self.state.is_playing() {
            self.restart_decoder()?;
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.require(Capability::Pause)?;
        self.decoder.pause()
    }

    pub fn resume(&mut self) -> Result<()> {
        self.require(Capability::Pause)?;
        self.decoder.resume()
    }

    /// Release decoder resources ahead of [`delete`](Self::delete)
    pub fn unload(&mut self) -> Result<()> {
        self.require(Capability::Unload)?;
        self.decoder.unload()?;
        self.discard_buffered();
        self.state = self.state.transition(PlaybackEvent::Stop).0;
        Ok(())
    }

    /// Reclaim a source stream that was passed without ownership
    pub fn take_source(&mut self) -> Option<Box<dyn SourceStream>> {
        self.decoder.take_source()
    }

    /// Run one state machine transition and carry out its action
    pub(crate) fn apply(&mut self, event: PlaybackEvent) -> Result<()> {
        let previous = self.state;
        let (next, action) = previous.transition(event);
        self.state = next;
        trace!(
            "{}: {:?} --{:?}--> {:?} ({:?})",
            self.backend_name(),
            previous,
            event,
            next,
            action
        );

        match action {
            Action::Start => {
                self.discard_buffered();
                self.restart_decoder()
            }
            Action::Rewind => self.restart_decoder(),
            Action::Halt => {
                self.discard_buffered();
                if self.supports(Capability::Stop) {
                    self.decoder.stop()?;
                }
                Ok(())
            }
            Action::None => Ok(()),
        }
    }

    /// Restart the decoder at position zero.
    ///
    /// Play and seek-to-zero are coupled: decoders without seek support
    /// rewind in `start`.
    fn restart_decoder(&mut self) -> Result<()> {
        self.decoder.start()?;
        if self.supports(Capability::Seek) {
            self.decoder.seek(0.0)?;
        }
        self.produced_in_pass = 0;
        Ok(())
    }

    fn discard_buffered(&mut self) {
        if let Some(conversion) = self.conversion.as_mut() {
            conversion.adapter.clear();
        }
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if self.capabilities.supports(capability) {
            Ok(())
        } else {
            Err(Error::unsupported(capability.operation(), self.backend_name()))
        }
    }
}

impl Drop for MusicSession {
    fn drop(&mut self) {
        trace!(
            "Releasing {} session (adapter: {})",
            self.lease.name(),
            self.conversion.is_some()
        );
    }
}

impl std::fmt::Debug for MusicSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicSession")
            .field("backend", &self.backend_name())
            .field("target", &self.target)
            .field("adapter", &self.conversion.is_some())
            .field("volume", &self.volume)
            .field("state", &self.state)
            .finish()
    }
}
