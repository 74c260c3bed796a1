//! # Audio Pipeline
//!
//! Everything between the microphone and the speaker, minus the network.
//!
//! ## Key Components:
//! - **Codec**: float blocks to 16-bit little-endian PCM and base64, and back
//! - **Meter**: bounded RMS loudness for UI feedback
//! - **Engine**: platform capability traits (microphone, capture and playback graphs)
//! - **Capture**: per-block metering, encoding and forwarding to the transport
//! - **Playback**: gapless scheduling of decoded server audio
//! - **Wav**: headless engine backed by WAV files and a wall clock
//!
//! ## Audio Format Requirements:
//! - **Capture**: 16kHz mono, sent as `audio/pcm;rate=16000`
//! - **Playback**: 24kHz mono, received as base64 PCM
//! - **Bit Depth**: 16-bit signed, little-endian

pub mod capture;
pub mod codec;
pub mod engine;
pub mod meter;
pub mod playback;
pub mod wav;
