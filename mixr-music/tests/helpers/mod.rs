//! Test helper modules for mixr-music integration tests
//!
//! - scripted: in-memory backend/decoder with counters and failure injection
//! - audio_generator: deterministic WAV files built with hound

#![allow(dead_code)]

pub mod audio_generator;
pub mod scripted;

pub use audio_generator::{sine_wav_bytes, write_sine_wav};
pub use scripted::{Counters, EndSignal, Script, ScriptedBackend};
