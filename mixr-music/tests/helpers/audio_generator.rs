//! Audio test file generation
//!
//! Builds small sine-wave WAV files with known length for decoder tests.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::Path;

fn wav_spec(sample_rate: u32, channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_frames<W>(writer: &mut WavWriter<W>, sample_rate: u32, channels: u16, frames: usize, frequency_hz: f32) -> Result<(), hound::Error>
where
    W: std::io::Write + std::io::Seek,
{
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let value = (2.0 * PI * frequency_hz * t).sin() * 0.5;
        let sample = (value * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }
    Ok(())
}

/// 16-bit sine WAV held in memory
///
/// # Arguments
/// * `sample_rate` - Frames per second
/// * `channels` - Channel count (every channel carries the same signal)
/// * `frames` - Length in frames
/// * `frequency_hz` - Sine frequency
pub fn sine_wav_bytes(sample_rate: u32, channels: u16, frames: usize, frequency_hz: f32) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), wav_spec(sample_rate, channels))
            .expect("WAV header");
        write_frames(&mut writer, sample_rate, channels, frames, frequency_hz).expect("WAV samples");
        writer.finalize().expect("WAV finalize");
    }
    bytes
}

/// 16-bit sine WAV written to `path`
pub fn write_sine_wav<P: AsRef<Path>>(path: P, sample_rate: u32, channels: u16, frames: usize, frequency_hz: f32) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, wav_spec(sample_rate, channels))?;
    write_frames(&mut writer, sample_rate, channels, frames, frequency_hz)?;
    writer.finalize()
}
