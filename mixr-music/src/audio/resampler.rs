//! Streaming audio resampling using rubato
//!
//! Converts interleaved f32 audio from a decoder's native rate to the target
//! rate in fixed-size chunks. Input is queued until a full chunk is available;
//! `flush` pushes the remainder through at a natural end of stream.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Chunked sample-rate converter that keeps filter state across calls
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    ratio: f64,
    channels: usize,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    /// Create a resampler from `input_rate` to `output_rate`.
    ///
    /// # Arguments
    /// - `chunk_frames`: input frames consumed per conversion step
    pub fn new(input_rate: u32, output_rate: u32, channels: u16, chunk_frames: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 || channels == 0 || chunk_frames == 0 {
            return Err(Error::Adapter(format!(
                "cannot resample {}Hz -> {}Hz with {} channels, chunk {}",
                input_rate, output_rate, channels, chunk_frames
            )));
        }

        debug!(
            "Creating resampler {}Hz -> {}Hz ({} channels, chunk {} frames)",
            input_rate, output_rate, channels, chunk_frames
        );

        // FastFixedIn: good quality/performance tradeoff for real-time pulls
        let resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0, // max_relative_ratio (no runtime changes)
            PolynomialDegree::Septic,
            chunk_frames,
            channels as usize,
        )
        .map_err(|e| Error::Adapter(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            resampler,
            ratio: output_rate as f64 / input_rate as f64,
            channels: channels as usize,
            pending: vec![Vec::with_capacity(chunk_frames); channels as usize],
        })
    }

    /// Upper bound on frames produced by one conversion step
    pub fn max_output_frames(&self) -> usize {
        self.resampler.output_frames_max()
    }

    /// Queue interleaved input and convert every complete chunk.
    ///
    /// Converted interleaved frames are appended to `output`.
    pub fn process(&mut self, interleaved: &[f32], output: &mut Vec<f32>) -> Result<()> {
        deinterleave_into(interleaved, self.channels, &mut self.pending);

        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let chunk: Vec<&[f32]> = self.pending.iter().map(|ch| &ch[..needed]).collect();
            let planar = self
                .resampler
                .process(chunk.as_slice(), None)
                .map_err(|e| Error::Adapter(format!("Resampling failed: {}", e)))?;
            interleave_into(&planar, output);

            for ch in self.pending.iter_mut() {
                ch.drain(..needed);
            }
        }

        Ok(())
    }

    /// Convert whatever input is still queued (end of stream)
    pub fn flush(&mut self, output: &mut Vec<f32>) -> Result<()> {
        if self.pending[0].is_empty() {
            return Ok(());
        }

        let pending_frames = self.pending[0].len();
        let mut planar = self
            .resampler
            .process_partial(Some(self.pending.as_slice()), None)
            .map_err(|e| Error::Adapter(format!("Resampling flush failed: {}", e)))?;

        // The partial chunk is zero-padded internally; keep only its share
        let keep = (pending_frames as f64 * self.ratio).round() as usize;
        for ch in planar.iter_mut() {
            ch.truncate(keep);
        }
        interleave_into(&planar, output);

        for ch in self.pending.iter_mut() {
            ch.clear();
        }
        Ok(())
    }

    /// Drop queued input and filter history
    pub fn reset(&mut self) {
        self.resampler.reset();
        for ch in self.pending.iter_mut() {
            ch.clear();
        }
    }

    /// Input frames queued but not yet converted
    pub fn pending_frames(&self) -> usize {
        self.pending[0].len()
    }
}

/// Append interleaved samples to planar channel vectors.
///
/// Input:  [L, R, L, R, L, R, ...]
/// Output: [[L, L, L, ...], [R, R, R, ...]]
fn deinterleave_into(samples: &[f32], channels: usize, planar: &mut [Vec<f32>]) {
    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in planar.iter_mut().zip(frame) {
            ch.push(sample);
        }
    }
}

/// Append planar channel vectors to an interleaved buffer.
///
/// Input:  [[L, L, L, ...], [R, R, R, ...]]
/// Output: [L, R, L, R, L, R, ...]
fn interleave_into(planar: &[Vec<f32>], output: &mut Vec<f32>) {
    if planar.is_empty() {
        return;
    }

    let num_frames = planar[0].len();
    output.reserve(num_frames * planar.len());
    for frame_idx in 0..num_frames {
        for ch in planar {
            output.push(ch[frame_idx]);
        }
    }
}
