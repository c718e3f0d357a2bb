//! PCM formats and conversion
//!
//! Everything here is backend-agnostic data transformation: spec types,
//! sample encoding, volume scaling, resampling and the format adapter.

pub mod adapter;
pub mod resampler;
pub mod sample;
pub mod spec;
pub mod volume;

pub use adapter::FormatAdapter;
pub use resampler::StreamResampler;
pub use spec::{AudioSpec, SampleFormat, DEFAULT_UNIT_FRAMES, MAX_VOLUME};
pub use volume::apply_volume;
