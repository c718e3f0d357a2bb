//! Core audio format types
//!
//! Describes PCM layouts exchanged between decoders, the format adapter and
//! the downstream consumer. All multi-byte formats are little-endian and
//! interleaved: [L, R, L, R, ...].

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Highest session volume; samples pass through unscaled at this level
pub const MAX_VOLUME: u8 = 128;

/// Frames a decoder produces per transfer unit unless it says otherwise
pub const DEFAULT_UNIT_FRAMES: usize = 4096;

/// Highest channel count a synthesis backend renders natively
pub const MAX_NATIVE_SYNTH_CHANNELS: u16 = 2;

/// PCM sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Unsigned 8-bit, silence at 128
    U8,
    /// Signed 8-bit
    S8,
    /// Signed 16-bit little-endian
    S16,
    /// Signed 32-bit little-endian
    S32,
    /// 32-bit float little-endian, nominal range [-1.0, 1.0]
    F32,
}

impl SampleFormat {
    /// Bytes occupied by one sample of one channel
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::S8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S32 | SampleFormat::F32 => 4,
        }
    }

    /// Bits per sample
    pub const fn bits(self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    /// Byte value that encodes silence
    pub const fn silence_byte(self) -> u8 {
        match self {
            SampleFormat::U8 => 0x80,
            _ => 0,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S8 => "s8",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "f32",
        };
        f.write_str(name)
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u8" => Ok(SampleFormat::U8),
            "s8" => Ok(SampleFormat::S8),
            "s16" => Ok(SampleFormat::S16),
            "s32" => Ok(SampleFormat::S32),
            "f32" => Ok(SampleFormat::F32),
            other => Err(Error::InvalidSpec(format!("unknown sample format '{}'", other))),
        }
    }
}

/// Sample rate, sample format and channel count of a PCM stream.
///
/// The registry's target spec is fixed for as long as a backend stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioSpec {
    /// Frames per second
    pub frequency: u32,
    /// Sample encoding
    pub format: SampleFormat,
    /// Interleaved channel count
    pub channels: u16,
}

impl AudioSpec {
    pub const fn new(frequency: u32, format: SampleFormat, channels: u16) -> Self {
        Self {
            frequency,
            format,
            channels,
        }
    }

    /// 44.1 kHz, signed 16-bit, stereo
    pub const fn cd_quality() -> Self {
        Self::new(44100, SampleFormat::S16, 2)
    }

    /// Bytes in one interleaved frame
    pub const fn frame_size(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// Bytes needed for `frames` frames
    pub const fn bytes_for_frames(&self, frames: usize) -> usize {
        frames * self.frame_size()
    }

    /// Whole frames contained in `bytes`
    pub const fn frames_in(&self, bytes: usize) -> usize {
        match self.frame_size() {
            0 => 0,
            size => bytes / size,
        }
    }

    /// Largest frame-aligned prefix of `bytes`
    pub const fn align_down(&self, bytes: usize) -> usize {
        self.frames_in(bytes) * self.frame_size()
    }

    /// Duration of `bytes` in seconds
    pub fn seconds_for_bytes(&self, bytes: usize) -> f64 {
        if self.frequency == 0 {
            return 0.0;
        }
        self.frames_in(bytes) as f64 / self.frequency as f64
    }

    /// Same spec with the channel count clamped to `max`
    pub fn with_max_channels(&self, max: u16) -> Self {
        Self {
            channels: self.channels.min(max),
            ..*self
        }
    }

    /// Reject specs no stream can be built on
    pub fn validate(&self) -> Result<()> {
        if self.frequency == 0 {
            return Err(Error::InvalidSpec(format!("{}: zero sample rate", self)));
        }
        if self.channels == 0 {
            return Err(Error::InvalidSpec(format!("{}: zero channels", self)));
        }
        Ok(())
    }
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self::cd_quality()
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}/{}ch", self.frequency, self.format, self.channels)
    }
}
