//! # Application State Management
//!
//! Shared state handed to every HTTP and WebSocket handler.
//!
//! ## Ownership Model:
//! The voice session itself is not stored here. It lives inside the
//! [`SessionController`](voice_session_engine::session::SessionController)
//! task; handlers only hold a [`SessionHandle`], which is a pair of channels
//! and therefore cheap to clone into every worker.
//!
//! ## Key Rust Concepts:
//! - **Arc**: The configuration is read-only after startup, so plain shared
//!   ownership is enough (no lock needed)
//! - **Clone**: actix-web clones the state into each worker thread

use std::sync::Arc;
use std::time::Instant;
use voice_session_engine::config::AppConfig;
use voice_session_engine::session::{SessionHandle, SessionSnapshot};

#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration as loaded at startup
    pub config: Arc<AppConfig>,

    /// Front door to the session controller
    pub session: SessionHandle,

    /// When the server started (for uptime reporting)
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, session: SessionHandle) -> Self {
        Self {
            config: Arc::new(config),
            session,
            start_time: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
