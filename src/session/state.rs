//! # Session State
//!
//! The observable session record and the bookkeeping attached to each live session.
//!
//! ## Status Lifecycle:
//! 1. **Disconnected**: initial, and after any stop or normal close
//! 2. **Connecting**: devices and transport being acquired
//! 3. **Connected**: transport open, audio flowing both ways
//! 4. **Error**: last session failed; stays until the next `start`

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Error => "error",
        }
    }

    /// Status line shown by presentation layers.
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Connecting => "Connecting...",
            SessionStatus::Connected => "Listening...",
            SessionStatus::Disconnected | SessionStatus::Error => "Disconnected",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What subscribers see: `{ isActive, status, volume }`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub is_active: bool,
    pub status: SessionStatus,
    /// Microphone loudness in `[0, 1]`
    pub volume: f32,
}

/// Identity of one live session, used for tracing.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        Utc::now().signed_duration_since(self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}
