//! # Session Event WebSocket
//!
//! Live feed of the session snapshot at `/ws/session`, for UI widgets that
//! render the control button, the volume meter and the status line.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the current snapshot is pushed immediately
//! 2. **Updates**: every subsequent change is pushed as it happens
//! 3. **Commands**: text frames `start`, `stop` or `toggle` drive the session
//! 4. **Disconnect**: closing the socket unsubscribes; the session keeps running
//!
//! ## Message Format:
//! - **Client → Server**: plain text command
//! - **Server → Client**: JSON, tagged by `type`
//!   (`session_state` with `isActive`/`status`/`volume`, or `error`)

use crate::state::AppState;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use voice_session_engine::session::{SessionHandle, SessionSnapshot};

/// How often a ping is sent to the client
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// No pong for this long closes the connection
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionState(SessionSnapshot),
    Error { code: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Start,
    Stop,
    Toggle,
}

impl ClientCommand {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "start" => Some(ClientCommand::Start),
            "stop" => Some(ClientCommand::Stop),
            "toggle" => Some(ClientCommand::Toggle),
            _ => None,
        }
    }

    fn apply(self, session: &SessionHandle) {
        match self {
            ClientCommand::Start => session.start(),
            ClientCommand::Stop => session.stop(),
            ClientCommand::Toggle => session.toggle(),
        }
    }
}

pub struct SessionSocket {
    session: SessionHandle,
    last_heartbeat: Instant,
}

impl SessionSocket {
    pub fn new(session: SessionHandle) -> Self {
        Self { session, last_heartbeat: Instant::now() }
    }

    fn send(&self, message: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize session message: {}", e),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        let error = ServerMessage::Error { code: code.to_string(), message: message.to_string() };
        self.send(&error, ctx);
    }
}

impl Actor for SessionSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Session event socket connected");

        // Yields the current snapshot first, then every change
        ctx.add_stream(self.session.updates());

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("Session socket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("Session event socket disconnected");
    }
}

impl StreamHandler<SessionSnapshot> for SessionSocket {
    fn handle(&mut self, snapshot: SessionSnapshot, ctx: &mut Self::Context) {
        self.send(&ServerMessage::SessionState(snapshot), ctx);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        warn!("Session controller stopped, closing event socket");
        ctx.close(Some(ws::CloseCode::Away.into()));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SessionSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match ClientCommand::parse(&text) {
                Some(command) => {
                    debug!(?command, "Session command over WebSocket");
                    command.apply(&self.session);
                }
                None => self.send_error(ctx, "unknown_command", "expected start, stop or toggle"),
            },
            Ok(ws::Message::Binary(_)) => {
                self.send_error(ctx, "unsupported", "binary frames are not accepted");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Session socket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// Upgrade `GET /ws/session` to a [`SessionSocket`].
pub async fn session_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New session socket request from: {:?}", req.connection_info().peer_addr());
    ws::start(SessionSocket::new(state.session.clone()), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_session_engine::session::SessionStatus;

    #[test]
    fn test_command_parsing() {
        assert_eq!(ClientCommand::parse("start"), Some(ClientCommand::Start));
        assert_eq!(ClientCommand::parse(" Stop\n"), Some(ClientCommand::Stop));
        assert_eq!(ClientCommand::parse("TOGGLE"), Some(ClientCommand::Toggle));
        assert_eq!(ClientCommand::parse("pause"), None);
    }

    #[test]
    fn test_state_message_shape() {
        let snapshot = SessionSnapshot { is_active: true, status: SessionStatus::Connected, volume: 0.5 };
        let json = serde_json::to_value(ServerMessage::SessionState(snapshot)).unwrap();

        assert_eq!(json["type"], "session_state");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["status"], "connected");
        assert_eq!(json["volume"], 0.5);
    }

    #[test]
    fn test_error_message_shape() {
        let error = ServerMessage::Error { code: "unknown_command".into(), message: "nope".into() };
        let json = serde_json::to_value(error).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "unknown_command");
    }
}
