//! Sample encoding and decoding
//!
//! Converts between raw little-endian PCM bytes and normalized f32 samples in
//! the [-1.0, 1.0] range. Integer formats are normalized by their full-scale
//! magnitude (128, 32768, 2^31) and clamped on the way back.

use super::spec::SampleFormat;

/// Decode interleaved PCM bytes to f32, appending to `output`.
///
/// Trailing bytes that do not form a whole sample are ignored.
pub fn decode_to_f32(format: SampleFormat, bytes: &[u8], output: &mut Vec<f32>) {
    let width = format.bytes_per_sample();
    output.reserve(bytes.len() / width);

    match format {
        SampleFormat::U8 => {
            output.extend(bytes.iter().map(|&b| (b as i32 - 128) as f32 / 128.0));
        }
        SampleFormat::S8 => {
            output.extend(bytes.iter().map(|&b| b as i8 as f32 / 128.0));
        }
        SampleFormat::S16 => {
            output.extend(
                bytes
                    .chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0),
            );
        }
        SampleFormat::S32 => {
            output.extend(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2_147_483_648.0),
            );
        }
        SampleFormat::F32 => {
            output.extend(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }
    }
}

/// Encode f32 samples as interleaved PCM bytes, appending to `output`.
pub fn encode_from_f32(format: SampleFormat, samples: &[f32], output: &mut Vec<u8>) {
    output.reserve(samples.len() * format.bytes_per_sample());

    match format {
        SampleFormat::U8 => {
            output.extend(
                samples
                    .iter()
                    .map(|&s| ((s.clamp(-1.0, 1.0) * 127.0).round() as i32 + 128) as u8),
            );
        }
        SampleFormat::S8 => {
            output.extend(
                samples
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8),
            );
        }
        SampleFormat::S16 => {
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
                output.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleFormat::S32 => {
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) as f64 * 2_147_483_647.0).round() as i32;
                output.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleFormat::F32 => {
            for &s in samples {
                output.extend_from_slice(&s.to_le_bytes());
            }
        }
    }
}

/// Encode f32 samples into an exactly sized byte slice.
///
/// `output` must hold `samples.len() * bytes_per_sample` bytes; used by
/// decoders that render straight into a caller's buffer.
pub fn write_from_f32(format: SampleFormat, samples: &[f32], output: &mut [u8]) {
    let width = format.bytes_per_sample();
    debug_assert!(output.len() >= samples.len() * width);

    for (sample, dst) in samples.iter().zip(output.chunks_exact_mut(width)) {
        let s = sample.clamp(-1.0, 1.0);
        match format {
            SampleFormat::U8 => dst[0] = ((s * 127.0).round() as i32 + 128) as u8,
            SampleFormat::S8 => dst[0] = (s * 127.0).round() as i8 as u8,
            SampleFormat::S16 => dst.copy_from_slice(&((s * 32767.0).round() as i16).to_le_bytes()),
            SampleFormat::S32 => dst.copy_from_slice(
                &((s as f64 * 2_147_483_647.0).round() as i32).to_le_bytes(),
            ),
            SampleFormat::F32 => dst.copy_from_slice(&sample.to_le_bytes()),
        }
    }
}
