//! Codec interface contract
//!
//! Two traits split the contract along its lifetimes:
//! - [`MusicBackend`]: one per backend type, owns the process-wide
//!   `open`/`close` hooks and constructs decoders
//! - [`MusicDecoder`]: one per session, the opaque decoder handle
//!
//! Optional operations have default implementations returning
//! [`Error::Unsupported`]. A decoder advertises what it overrides through
//! [`Capabilities`]; sessions check the capability before delegating, so an
//! unsupported call never reaches the decoder.

use crate::audio::spec::{AudioSpec, DEFAULT_UNIT_FRAMES};
use crate::error::{Error, Result};
use crate::music::source::{MusicSource, SourceStream};
use std::fmt;

/// Family of music formats a backend can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MusicType {
    /// Microsoft WAV / RIFF PCM
    Wav,
    /// Tracker modules
    Mod,
    /// MIDI-like note streams rendered by a synthesizer
    Midi,
    /// Ogg Vorbis
    Ogg,
    Mp3,
    Flac,
    Opus,
}

impl fmt::Display for MusicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MusicType::Wav => "WAV",
            MusicType::Mod => "MOD",
            MusicType::Midi => "MIDI",
            MusicType::Ogg => "OGG",
            MusicType::Mp3 => "MP3",
            MusicType::Flac => "FLAC",
            MusicType::Opus => "OPUS",
        };
        f.write_str(name)
    }
}

/// Optional operation a decoder may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Decoder scales its own output by the session volume
    NativeVolume,
    Seek,
    Tell,
    Duration,
    Stop,
    /// LoopStart / LoopEnd / LoopLength
    LoopPoints,
    MetaTags,
    /// GetNumTracks / StartTrack
    Tracks,
    /// Pause / Resume
    Pause,
    Unload,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::NativeVolume,
        Capability::Seek,
        Capability::Tell,
        Capability::Duration,
        Capability::Stop,
        Capability::LoopPoints,
        Capability::MetaTags,
        Capability::Tracks,
        Capability::Pause,
        Capability::Unload,
    ];

    const fn bit(self) -> u16 {
        1 << self as u16
    }

    /// Operation name used in unsupported-operation errors
    pub const fn operation(self) -> &'static str {
        match self {
            Capability::NativeVolume => "SetVolume",
            Capability::Seek => "Seek",
            Capability::Tell => "Tell",
            Capability::Duration => "Duration",
            Capability::Stop => "Stop",
            Capability::LoopPoints => "LoopPoints",
            Capability::MetaTags => "GetMetaTag",
            Capability::Tracks => "Tracks",
            Capability::Pause => "Pause",
            Capability::Unload => "Unload",
        }
    }
}

/// Set of optional operations a decoder provides
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u16);

impl Capabilities {
    /// Only the required operations
    pub const NONE: Capabilities = Capabilities(0);

    pub const fn with(self, capability: Capability) -> Self {
        Capabilities(self.0 | capability.bit())
    }

    pub const fn without(self, capability: Capability) -> Self {
        Capabilities(self.0 & !capability.bit())
    }

    pub const fn supports(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Capabilities in declaration order
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.supports(*c))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Capabilities::NONE, Capabilities::with)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Metadata fields a decoder may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaTag {
    Title,
    Artist,
    Album,
    Copyright,
}

/// Result of one decoder render call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendered {
    /// Bytes written to the front of the output buffer
    pub bytes: usize,
    /// The decoder has nothing more to produce until restarted
    pub end_of_stream: bool,
}

impl Rendered {
    pub const fn more(bytes: usize) -> Self {
        Self {
            bytes,
            end_of_stream: false,
        }
    }

    pub const fn end(bytes: usize) -> Self {
        Self {
            bytes,
            end_of_stream: true,
        }
    }
}

/// Process-wide half of the contract, one instance per backend type.
///
/// `open` and `close` are only ever called by the
/// [`BackendRegistry`](crate::music::registry::BackendRegistry), under its
/// lock, so implementations need no extra serialization.
pub trait MusicBackend: Send + Sync {
    /// Stable backend name ("synth", "symphonia", ...)
    fn name(&self) -> &'static str;

    /// Formats this backend can decode
    fn music_types(&self) -> &'static [MusicType];

    /// One-time initialization for the given target spec
    fn open(&self, target: &AudioSpec) -> Result<()>;

    /// Release process-wide resources
    fn close(&self);

    /// Construct a decoder handle from a byte source.
    ///
    /// The decoder reports its native spec; the session decides whether a
    /// format adapter is needed. On error the source is dropped, borrowed or
    /// not.
    fn create_decoder(&self, source: MusicSource, target: &AudioSpec) -> Result<Box<dyn MusicDecoder>>;
}

/// Per-session decoder handle.
///
/// Required methods cover starting, rendering and activity reporting; every
/// other operation is optional and must be listed in
/// [`capabilities`](Self::capabilities) when overridden.
pub trait MusicDecoder: Send {
    /// Name of the backend that built this decoder
    fn backend_name(&self) -> &'static str;

    /// Optional operations this decoder overrides
    fn capabilities(&self) -> Capabilities;

    /// Spec of the PCM written by [`render`](Self::render)
    fn native_spec(&self) -> AudioSpec;

    /// Frames in one natural production unit
    fn unit_frames(&self) -> usize {
        DEFAULT_UNIT_FRAMES
    }

    /// (Re)start production from the beginning of the current track
    fn start(&mut self) -> Result<()>;

    /// Whether the decoder is currently producing audio
    fn is_active(&self) -> bool;

    /// Produce up to `out.len()` bytes of native PCM.
    ///
    /// Writes whole frames only. A short result without `end_of_stream` is a
    /// transient underrun.
    fn render(&mut self, out: &mut [u8]) -> Result<Rendered>;

    fn set_volume(&mut self, _volume: u8) -> Result<()> {
        Err(Error::unsupported("SetVolume", self.backend_name()))
    }

    /// Move to `position` seconds from the start of the track
    fn seek(&mut self, _position: f64) -> Result<()> {
        Err(Error::unsupported("Seek", self.backend_name()))
    }

    /// Current position in seconds
    fn tell(&self) -> Result<f64> {
        Err(Error::unsupported("Tell", self.backend_name()))
    }

    /// Track length in seconds
    fn duration(&self) -> Result<f64> {
        Err(Error::unsupported("Duration", self.backend_name()))
    }

    fn loop_start(&self) -> Result<f64> {
        Err(Error::unsupported("LoopStart", self.backend_name()))
    }

    fn loop_end(&self) -> Result<f64> {
        Err(Error::unsupported("LoopEnd", self.backend_name()))
    }

    fn loop_length(&self) -> Result<f64> {
        Err(Error::unsupported("LoopLength", self.backend_name()))
    }

    /// Metadata value, `None` when the field is absent
    fn meta_tag(&self, _tag: MetaTag) -> Result<Option<String>> {
        Err(Error::unsupported("GetMetaTag", self.backend_name()))
    }

    fn num_tracks(&self) -> Result<usize> {
        Err(Error::unsupported("GetNumTracks", self.backend_name()))
    }

    /// Select a track; takes effect at the next start
    fn start_track(&mut self, _track: usize) -> Result<()> {
        Err(Error::unsupported("StartTrack", self.backend_name()))
    }

    fn pause(&mut self) -> Result<()> {
        Err(Error::unsupported("Pause", self.backend_name()))
    }

    fn resume(&mut self) -> Result<()> {
        Err(Error::unsupported("Resume", self.backend_name()))
    }

    /// Halt production
    fn stop(&mut self) -> Result<()> {
        Err(Error::unsupported("Stop", self.backend_name()))
    }

    /// Release heavy resources early, ahead of drop
    fn unload(&mut self) -> Result<()> {
        Err(Error::unsupported("Unload", self.backend_name()))
    }

    /// Give back a source the caller did not hand over
    fn take_source(&mut self) -> Option<Box<dyn SourceStream>> {
        None
    }
}
