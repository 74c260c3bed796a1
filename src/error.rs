//! # Engine Error Types
//!
//! Every fallible engine operation returns [`EngineResult`]. The variants follow
//! the session error taxonomy:
//!
//! - **DeviceUnavailable**: the microphone was denied or could not be opened
//! - **TransportOpen**: the streaming session could not be established
//! - **Transport**: the open session failed mid-stream
//! - **MalformedPayload**: a server audio payload could not be decoded
//!
//! The first three are terminal for the current session. A malformed payload
//! is dropped and the session continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Microphone denied, missing or in an unsupported format
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// Capture or playback graph could not be opened or driven
    #[error("audio graph error: {0}")]
    AudioGraph(String),

    /// `connect` was rejected by the provider
    #[error("transport failed to open: {0}")]
    TransportOpen(String),

    /// Error reported by an already open transport
    #[error("transport error: {0}")]
    Transport(String),

    /// Server audio that is not valid base64 16-bit PCM
    #[error("malformed audio payload: {0}")]
    MalformedPayload(String),

    /// Operation attempted on a resource that has already been released
    #[error("{0} has already been released")]
    Released(&'static str),

    /// Missing or invalid configuration (e.g. no API key)
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether this error ends the session it occurred in.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineError::MalformedPayload(_))
    }
}

impl From<base64::DecodeError> for EngineError {
    fn from(err: base64::DecodeError) -> Self {
        EngineError::MalformedPayload(format!("invalid base64: {}", err))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
