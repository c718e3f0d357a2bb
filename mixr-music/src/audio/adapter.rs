//! Format adapter: native decoder PCM to target output PCM
//!
//! Bridges a decoder's native spec (rate, sample format, channel count) to the
//! engine's target spec. The adapter is purely reactive: native bytes are
//! pushed in, converted bytes are pulled out. Converted output waits in a
//! bounded ring buffer sized from one transfer unit.
//!
//! Conversion order per push: decode to f32 → channel remap → resample →
//! encode to the target format.

use super::resampler::StreamResampler;
use super::sample::{decode_to_f32, encode_from_f32};
use super::spec::AudioSpec;
use crate::error::{Error, Result};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, trace};

/// Buffered converter owned by one session
pub struct FormatAdapter {
    native: AudioSpec,
    target: AudioSpec,
    unit_frames: usize,
    resampler: Option<StreamResampler>,

    /// Bytes of an incomplete native frame carried to the next push
    residue: Vec<u8>,

    // Reused conversion buffers
    decoded: Vec<f32>,
    remapped: Vec<f32>,
    resampled: Vec<f32>,
    encoded: Vec<u8>,

    /// Converted target-format bytes waiting to be pulled
    output: HeapRb<u8>,
}

impl FormatAdapter {
    /// True when PCM in `native` must be converted before reaching `target`
    pub fn is_needed(native: &AudioSpec, target: &AudioSpec) -> bool {
        native != target
    }

    /// Create an adapter for one decoder.
    ///
    /// # Arguments
    /// - `native`: spec the decoder produces
    /// - `target`: spec the consumer expects
    /// - `unit_frames`: the decoder's natural production unit, in frames
    ///
    /// # Errors
    /// Invalid specs, a zero unit, or a resampler that cannot be built.
    pub fn new(native: AudioSpec, target: AudioSpec, unit_frames: usize) -> Result<Self> {
        native.validate()?;
        target.validate()?;
        if unit_frames == 0 {
            return Err(Error::Adapter("transfer unit must hold at least one frame".into()));
        }

        let resampler = if native.frequency != target.frequency {
            Some(StreamResampler::new(
                native.frequency,
                target.frequency,
                target.channels,
                unit_frames,
            )?)
        } else {
            None
        };

        // Room for two units of converted output plus a flush
        let frames_per_step = resampler
            .as_ref()
            .map(|r| r.max_output_frames().max(unit_frames))
            .unwrap_or(unit_frames);
        let capacity = target.bytes_for_frames(frames_per_step * 3);

        debug!(
            "Format adapter {} -> {} (unit {} frames, buffer {} bytes, resampling: {})",
            native,
            target,
            unit_frames,
            capacity,
            resampler.is_some()
        );

        Ok(Self {
            native,
            target,
            unit_frames,
            resampler,
            residue: Vec::with_capacity(native.frame_size()),
            decoded: Vec::new(),
            remapped: Vec::new(),
            resampled: Vec::new(),
            encoded: Vec::new(),
            output: HeapRb::new(capacity),
        })
    }

    /// Spec of the PCM accepted by [`push`](Self::push)
    pub fn native_spec(&self) -> AudioSpec {
        self.native
    }

    /// Spec of the PCM returned by [`pull`](Self::pull)
    pub fn target_spec(&self) -> AudioSpec {
        self.target
    }

    /// Bytes in one native transfer unit (the scratch buffer size)
    pub fn transfer_bytes(&self) -> usize {
        self.native.bytes_for_frames(self.unit_frames)
    }

    /// Converted bytes ready to pull
    pub fn available(&self) -> usize {
        self.output.occupied_len()
    }

    /// Feed native PCM.
    ///
    /// # Errors
    /// [`Error::Adapter`] if the converted audio does not fit the output
    /// buffer (callers should drain before pushing) or resampling fails.
    pub fn push(&mut self, native_bytes: &[u8]) -> Result<()> {
        if native_bytes.is_empty() {
            return Ok(());
        }

        let frame = self.native.frame_size();
        self.decoded.clear();
        let whole = if self.residue.is_empty() {
            let whole = self.native.align_down(native_bytes.len());
            decode_to_f32(self.native.format, &native_bytes[..whole], &mut self.decoded);
            self.residue.extend_from_slice(&native_bytes[whole..]);
            whole
        } else {
            let mut joined = std::mem::take(&mut self.residue);
            joined.extend_from_slice(native_bytes);
            let whole = self.native.align_down(joined.len());
            decode_to_f32(self.native.format, &joined[..whole], &mut self.decoded);
            self.residue.extend_from_slice(&joined[whole..]);
            whole
        };
        debug_assert!(self.residue.len() < frame);

        self.remapped.clear();
        remap_channels(
            &self.decoded,
            self.native.channels as usize,
            self.target.channels as usize,
            &mut self.remapped,
        );

        let converted: &[f32] = match self.resampler.as_mut() {
            Some(resampler) => {
                self.resampled.clear();
                resampler.process(&self.remapped, &mut self.resampled)?;
                &self.resampled
            }
            None => &self.remapped,
        };

        self.encoded.clear();
        encode_from_f32(self.target.format, converted, &mut self.encoded);
        self.store_encoded()?;

        trace!(
            "Adapter push: {} native bytes -> {} buffered",
            whole,
            self.output.occupied_len()
        );
        Ok(())
    }

    /// Drain converted PCM into `out`.
    ///
    /// Returns the number of bytes written, always a whole number of target
    /// frames; 0 when nothing is buffered.
    pub fn pull(&mut self, out: &mut [u8]) -> usize {
        let wanted = self
            .target
            .align_down(out.len().min(self.output.occupied_len()));
        if wanted == 0 {
            return 0;
        }
        self.output.pop_slice(&mut out[..wanted])
    }

    /// Convert input still held by the resampler (natural end of stream)
    pub fn flush(&mut self) -> Result<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };

        self.resampled.clear();
        resampler.flush(&mut self.resampled)?;
        self.encoded.clear();
        encode_from_f32(self.target.format, &self.resampled, &mut self.encoded);
        self.store_encoded()
    }

    /// Discard everything buffered (seek, explicit stop)
    pub fn clear(&mut self) {
        let dropped = self.output.clear();
        self.residue.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        if dropped > 0 {
            trace!("Adapter cleared, {} bytes discarded", dropped);
        }
    }

    fn store_encoded(&mut self) -> Result<()> {
        if self.encoded.len() > self.output.vacant_len() {
            return Err(Error::Adapter(format!(
                "converted {} bytes but only {} bytes free; drain before pushing",
                self.encoded.len(),
                self.output.vacant_len()
            )));
        }
        self.output.push_slice(&self.encoded);
        Ok(())
    }
}

/// Map interleaved frames from `from` channels to `to` channels.
///
/// - Same count: copied
/// - Mono source: duplicated to the front pair, other channels silent
/// - Mono target: average of all channels
/// - Multi-channel to stereo: even channels averaged left, odd channels right
/// - Stereo to multi-channel: front pair copied, other channels silent
/// - Otherwise the common channel prefix is copied
pub fn remap_channels(input: &[f32], from: usize, to: usize, output: &mut Vec<f32>) {
    if from == 0 || to == 0 {
        return;
    }
    if from == to {
        output.extend_from_slice(input);
        return;
    }

    let frames = input.len() / from;
    output.reserve(frames * to);

    for frame in input.chunks_exact(from) {
        if from == 1 {
            let m = frame[0];
            output.push(m);
            output.push(m);
            output.extend(std::iter::repeat(0.0).take(to - 2));
        } else if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else if to == 2 {
            let (mut left, mut right) = (0.0f32, 0.0f32);
            let (mut left_count, mut right_count) = (0u32, 0u32);
            for (ch_idx, &sample) in frame.iter().enumerate() {
                if ch_idx % 2 == 0 {
                    left += sample;
                    left_count += 1;
                } else {
                    right += sample;
                    right_count += 1;
                }
            }
            output.push(left / left_count.max(1) as f32);
            output.push(right / right_count.max(1) as f32);
        } else {
            let common = from.min(to);
            output.extend_from_slice(&frame[..common]);
            output.extend(std::iter::repeat(0.0).take(to - common));
        }
    }
}
