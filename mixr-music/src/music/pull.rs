//! Pull protocol: getting converted audio out of a session
//!
//! [`MusicSession::get_some`] is one step of the protocol:
//! 1. Drain converted audio left in the adapter; if any, return it
//! 2. If no longer playing, report done
//! 3. Render one unit (into the scratch buffer and through the adapter, or
//!    straight into the caller's buffer)
//! 4. On a track boundary, flush the adapter and let the state machine decide
//!    between rewinding and finishing
//!
//! [`MusicSession::get_audio`] repeats steps until the caller's buffer is
//! full, then applies the session volume.

use crate::audio::spec::MAX_VOLUME;
use crate::audio::volume::apply_volume;
use crate::error::Result;
use crate::music::interface::Capability;
use crate::music::session::{EndDetection, MusicSession};
use crate::music::state::{PlaybackEvent, PlaybackState, StopReason};
use tracing::trace;

/// Consecutive pulls that may produce nothing before a fill gives up
const MAX_IDLE_ROUNDS: usize = 4;

/// Outcome of one [`MusicSession::get_some`] step.
///
/// `written > 0` and `done` never occur together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Supply {
    pub written: usize,
    /// Playback has ended and nothing is buffered
    pub done: bool,
}

impl Supply {
    const fn data(written: usize) -> Self {
        Self {
            written,
            done: false,
        }
    }

    const PENDING: Supply = Supply {
        written: 0,
        done: false,
    };

    const DONE: Supply = Supply {
        written: 0,
        done: true,
    };
}

/// How a fill ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStatus {
    /// More audio will follow
    Streaming,
    /// All requested play-throughs completed
    Finished,
    /// Stopped explicitly or never started
    Stopped,
}

/// Outcome of [`MusicSession::get_audio`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPull {
    /// Bytes written to the front of the buffer
    pub written: usize,
    pub status: PullStatus,
}

impl AudioPull {
    /// The session will not produce more audio without a new play
    pub fn is_done(&self) -> bool {
        self.status != PullStatus::Streaming
    }
}

impl MusicSession {
    /// Perform one step of the pull protocol.
    ///
    /// Returns converted bytes written to `out`, 0 when a unit was decoded into
    /// the adapter (call again to drain it), or done when playback is over.
    pub fn get_some(&mut self, out: &mut [u8]) -> Result<Supply> {
        if out.len() < self.target.frame_size() {
            let idle = !self.state.is_playing() && self.buffered_bytes() == 0;
            return Ok(if idle { Supply::DONE } else { Supply::PENDING });
        }

        if let Some(conversion) = self.conversion.as_mut() {
            let drained = conversion.adapter.pull(out);
            if drained > 0 {
                return Ok(Supply::data(drained));
            }
        }

        if !self.state.is_playing() {
            return Ok(Supply::DONE);
        }

        let native = self.decoder.native_spec();
        let (expected, rendered) = match self.conversion.as_mut() {
            Some(conversion) => {
                let mut rendered = self.decoder.render(&mut conversion.scratch)?;
                rendered.bytes = rendered.bytes.min(conversion.scratch.len());
                conversion.adapter.push(&conversion.scratch[..rendered.bytes])?;
                (conversion.scratch.len(), rendered)
            }
            None => {
                let expected = native.align_down(out.len());
                if expected == 0 {
                    return Ok(Supply::PENDING);
                }
                let mut rendered = self.decoder.render(&mut out[..expected])?;
                rendered.bytes = rendered.bytes.min(expected);
                (expected, rendered)
            }
        };
        self.produced_in_pass += rendered.bytes;

        let short = rendered.bytes < expected;
        let boundary = rendered.end_of_stream
            || (short && self.options.end_detection == EndDetection::ShortRead);

        if boundary {
            if let Some(conversion) = self.conversion.as_mut() {
                conversion.adapter.flush()?;
            }
            let empty = self.produced_in_pass == 0;
            trace!(
                "{}: track boundary after {} bytes (empty pass: {})",
                self.backend_name(),
                self.produced_in_pass,
                empty
            );
            self.apply(PlaybackEvent::NaturalEnd { empty })?;
        } else if short {
            trace!(
                "{}: underrun, {} of {} bytes",
                self.backend_name(),
                rendered.bytes,
                expected
            );
        }

        if self.conversion.is_some() {
            Ok(Supply::PENDING)
        } else {
            Ok(Supply::data(rendered.bytes))
        }
    }

    /// Fill `buf` with target-format audio.
    ///
    /// Only whole frames are written; a trailing partial frame of `buf` is
    /// left untouched. Volume is applied here unless the decoder scales its
    /// own output.
    pub fn get_audio(&mut self, buf: &mut [u8]) -> Result<AudioPull> {
        let target = self.target;
        let len = target.align_down(buf.len());
        let scale = self.volume < MAX_VOLUME
            && !self.supports(Capability::NativeVolume);

        let mut written = 0;
        let mut idle = 0;
        let mut done = false;

        while written < len {
            let supply = self.get_some(&mut buf[written..len])?;
            if supply.written > 0 {
                if scale {
                    apply_volume(
                        target.format,
                        &mut buf[written..written + supply.written],
                        self.volume,
                    );
                }
                written += supply.written;
                idle = 0;
                continue;
            }
            if supply.done {
                done = true;
                break;
            }
            idle += 1;
            if idle >= MAX_IDLE_ROUNDS {
                trace!("{}: decoder idle, returning {} bytes", self.backend_name(), written);
                break;
            }
        }

        let status = if !done {
            PullStatus::Streaming
        } else if self.state == PlaybackState::Stopped(StopReason::Finished) {
            PullStatus::Finished
        } else {
            PullStatus::Stopped
        };

        Ok(AudioPull { written, status })
    }
}
