//! # Session Control Endpoints
//!
//! REST surface over the three UI operations plus a snapshot read.
//!
//! ## Endpoints:
//! - `GET  /api/v1/session`: current `{isActive, status, volume}`
//! - `POST /api/v1/session/start`
//! - `POST /api/v1/session/stop`
//! - `POST /api/v1/session/toggle`
//!
//! Commands are asynchronous: the response is `202 Accepted` with the snapshot
//! as it was when the command was queued. Follow `/ws/session` (or poll the
//! snapshot) to see the outcome.

use crate::handlers::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;
use voice_session_engine::session::SessionHandle;

pub async fn get_session(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.snapshot())
}

pub async fn start_session(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    dispatch(&state, "start", SessionHandle::start)
}

pub async fn stop_session(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    dispatch(&state, "stop", SessionHandle::stop)
}

pub async fn toggle_session(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    dispatch(&state, "toggle", SessionHandle::toggle)
}

fn dispatch(state: &AppState, command: &str, send: fn(&SessionHandle)) -> AppResult<HttpResponse> {
    if !state.session.is_running() {
        return Err(AppError::Unavailable("session controller is not running".into()));
    }

    let before = state.snapshot();
    send(&state.session);
    info!(command, status = %before.status, "Session command accepted");

    Ok(HttpResponse::Accepted().json(json!({
        "command": command,
        "session": before,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
