//! # Live WebSocket Adapter
//!
//! [`RemoteConnector`] for the provider's bidirectional streaming endpoint.
//!
//! ## Protocol:
//! 1. **Handshake**: WebSocket upgrade against `<endpoint>?key=<api key>`
//! 2. **Setup**: first client message carries model, response modality, voice and instruction
//! 3. **Open**: the server acknowledges with `setupComplete`
//! 4. **Streaming**: client sends `realtimeInput.mediaChunks`, server replies with
//!    `serverContent.modelTurn.parts[].inlineData` audio
//!
//! Server JSON may arrive in text or binary WebSocket messages.

use super::{
    AudioPayload, LiveConfig, RemoteConnector, RemoteEnd, RemoteSession, ResponseModality,
    ServerFrame, SessionEvent,
};
use crate::audio::codec::EncodedFrame;
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type LiveSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/\
google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

// ---- client messages ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupMessage<'a> {
    setup: Setup<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: String,
    generation_config: GenerationConfig<'a>,
    system_instruction: Content<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: Vec<ResponseModality>,
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    data: String,
}

// ---- server messages ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

fn setup_json(config: &LiveConfig) -> EngineResult<String> {
    let message = SetupMessage {
        setup: Setup {
            model: format!("models/{}", config.model),
            generation_config: GenerationConfig {
                response_modalities: vec![config.response_modality],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: &config.voice },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart { text: &config.instruction }],
            },
        },
    };
    serde_json::to_string(&message).map_err(|e| EngineError::TransportOpen(e.to_string()))
}

fn realtime_input_json(frame: &EncodedFrame) -> EngineResult<String> {
    let message = RealtimeInputMessage {
        realtime_input: RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: frame.mime_type(),
                data: frame.payload_base64(),
            }],
        },
    };
    serde_json::to_string(&message).map_err(|e| EngineError::Transport(e.to_string()))
}

/// Map one server message to an engine event. Only the first part of a model
/// turn is inspected for audio.
fn parse_server_message(raw: &[u8]) -> EngineResult<SessionEvent> {
    let message: ServerMessage = serde_json::from_slice(raw)
        .map_err(|e| EngineError::Transport(format!("unparseable server message: {}", e)))?;

    if message.setup_complete.is_some() {
        return Ok(SessionEvent::Open);
    }

    if message.go_away.is_some() {
        debug!("Server announced upcoming disconnect");
    }

    let frame = match message.server_content {
        Some(content) => ServerFrame {
            audio: content
                .model_turn
                .and_then(|turn| turn.parts.into_iter().next())
                .and_then(|part| part.inline_data)
                .map(|inline| AudioPayload { mime_type: inline.mime_type, data: inline.data }),
            turn_complete: content.turn_complete,
        },
        None => ServerFrame::default(),
    };
    Ok(SessionEvent::Message(frame))
}

/// Connector for the hosted live endpoint.
#[derive(Debug, Clone)]
pub struct LiveConnector {
    endpoint: String,
    api_key: Option<String>,
}

impl LiveConnector {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    fn url(&self, api_key: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, separator, api_key)
    }
}

#[async_trait]
impl RemoteConnector for LiveConnector {
    async fn connect(&self, config: &LiveConfig) -> EngineResult<RemoteSession> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::Config("no API key configured for the live endpoint".into()))?;

        info!(endpoint = %self.endpoint, model = %config.model, "Connecting to live endpoint");

        let (mut socket, _response) = connect_async(self.url(api_key))
            .await
            .map_err(|e| EngineError::TransportOpen(e.to_string()))?;

        socket
            .send(Message::Text(setup_json(config)?))
            .await
            .map_err(|e| EngineError::TransportOpen(format!("setup rejected: {}", e)))?;

        let (session, end) = RemoteSession::channel();
        tokio::spawn(pump(socket, end));
        Ok(session)
    }
}

/// Shuttle frames between the socket and the engine until either side finishes.
async fn pump(socket: LiveSocket, end: RemoteEnd) {
    let RemoteEnd { events, mut outbound, mut shutdown } = end;
    let (mut sink, mut stream) = socket.split();
    let mut frames_sent: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = sink.send(Message::Close(None)).await;
                debug!(frames_sent, "Live session closed by engine");
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let text = match realtime_input_json(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "Skipping unserializable frame");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(text)).await {
                    error!(error = %err, "Live socket write failed");
                    let _ = events.send(SessionEvent::Error(err.to_string()));
                    break;
                }
                frames_sent += 1;
            }
            incoming = stream.next() => {
                let raw = match incoming {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Close(frame))) => {
                        info!(reason = ?frame, "Live endpoint closed the session");
                        let _ = events.send(SessionEvent::Closed);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        error!(error = %err, "Live socket read failed");
                        let _ = events.send(SessionEvent::Error(err.to_string()));
                        break;
                    }
                    None => {
                        let _ = events.send(SessionEvent::Closed);
                        break;
                    }
                };

                let event = match parse_server_message(&raw) {
                    Ok(event) => event,
                    Err(err) => SessionEvent::Error(err.to_string()),
                };
                let fatal = matches!(event, SessionEvent::Error(_));
                if events.send(event).is_err() || fatal {
                    break;
                }
            }
        }
    }
}
