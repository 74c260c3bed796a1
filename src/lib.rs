//! # Voice Session Engine
//!
//! Real-time, bidirectional voice conversation with a remote conversational
//! endpoint: microphone capture, 16-bit PCM encoding, streaming transport,
//! response decoding and gapless playback, supervised by one session state machine.
//!
//! ## Module Layout:
//! - **audio**: codec, loudness meter, capture encoder, playback scheduler and
//!   the platform capability traits (plus a headless WAV implementation)
//! - **transport**: the remote session contract and the live WebSocket adapter
//! - **session**: controller actor, observable state and resource guards
//! - **config** / **error**: ambient configuration and the engine error type
//!
//! ## Data Flow:
//! microphone → capture graph → CaptureEncoder → RemoteSession → network →
//! SessionEvent::Message → PlaybackScheduler → playback graph

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{EngineError, EngineResult};
