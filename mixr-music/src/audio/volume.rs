//! Session volume scaling
//!
//! Scales PCM in place by `volume / MAX_VOLUME`. Applied to pulled audio for
//! decoders that cannot attenuate natively.

use super::spec::{SampleFormat, MAX_VOLUME};

/// Clamp an arbitrary level to [0, MAX_VOLUME]
pub fn clamp_volume(level: i32) -> u8 {
    level.clamp(0, MAX_VOLUME as i32) as u8
}

/// Attenuate interleaved PCM bytes in place.
///
/// A no-op at `MAX_VOLUME`; writes silence at zero.
pub fn apply_volume(format: SampleFormat, bytes: &mut [u8], volume: u8) {
    if volume >= MAX_VOLUME {
        return;
    }
    if volume == 0 {
        bytes.fill(format.silence_byte());
        return;
    }

    let gain = volume as i32;
    let max = MAX_VOLUME as i32;

    match format {
        SampleFormat::U8 => {
            for b in bytes.iter_mut() {
                let centered = *b as i32 - 128;
                *b = (centered * gain / max + 128) as u8;
            }
        }
        SampleFormat::S8 => {
            for b in bytes.iter_mut() {
                *b = ((*b as i8 as i32) * gain / max) as i8 as u8;
            }
        }
        SampleFormat::S16 => {
            for c in bytes.chunks_exact_mut(2) {
                let v = i16::from_le_bytes([c[0], c[1]]) as i32 * gain / max;
                c.copy_from_slice(&(v as i16).to_le_bytes());
            }
        }
        SampleFormat::S32 => {
            for c in bytes.chunks_exact_mut(4) {
                let v = i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i64 * gain as i64
                    / max as i64;
                c.copy_from_slice(&(v as i32).to_le_bytes());
            }
        }
        SampleFormat::F32 => {
            let scale = volume as f32 / MAX_VOLUME as f32;
            for c in bytes.chunks_exact_mut(4) {
                let v = f32::from_le_bytes([c[0], c[1], c[2], c[3]]) * scale;
                c.copy_from_slice(&v.to_le_bytes());
            }
        }
    }
}
