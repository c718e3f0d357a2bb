//! Music sessions and the codec contract
//!
//! - `interface`: backend/decoder traits and capability flags
//! - `registry`: process-wide backend open/close bookkeeping
//! - `session`: one playable resource (decoder + adapter + state)
//! - `pull`: the audio pull protocol
//! - `state`: play/loop/stop state machine
//! - `source`: byte input for session construction

pub mod interface;
pub mod pull;
pub mod registry;
pub mod session;
pub mod source;
pub mod state;

pub use interface::{
    Capabilities, Capability, MetaTag, MusicBackend, MusicDecoder, MusicType, Rendered,
};
pub use pull::{AudioPull, PullStatus, Supply};
pub use registry::{BackendLease, BackendRegistry};
pub use session::{EndDetection, MusicSession, SessionOptions};
pub use source::{MusicSource, SourceStream};
pub use state::{PlayCount, PlaybackState, StopReason};
