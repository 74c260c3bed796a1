//! # Remote Session Transport
//!
//! The engine's view of the streaming-session provider. Instead of callbacks,
//! an open session is a pair of channels:
//!
//! - **Outbound**: [`EncodedFrame`]s pushed through a [`FrameSender`], fire-and-forget.
//!   The channel is unbounded, so a slow provider queues frames; the encoder
//!   never waits and never applies backpressure.
//! - **Inbound**: [`SessionEvent`]s (`Open`, `Message`, `Closed`, `Error`) consumed
//!   by the session controller's single loop, in arrival order.
//!
//! A provider adapter implements [`RemoteConnector`] and wires the far end of
//! those channels ([`RemoteEnd`]) to its network connection. Handshake, retry
//! and reconnection policy belong to the adapter, not the engine.

pub mod live;

use crate::audio::codec::EncodedFrame;
use crate::error::EngineResult;
use crate::session::resources::Releasable;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// Model used for the live conversation
pub const LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Prebuilt voice persona for responses
pub const VOICE_PERSONA: &str = "Kore";

/// Behavioral instruction sent at connect time
pub const SYSTEM_INSTRUCTION: &str = "You are Mohisa AI, a friendly automation expert. \
You help businesses automate workflows. Keep responses concise, energetic, and helpful.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Audio,
}

/// Fixed configuration handed to [`RemoteConnector::connect`].
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub model: String,
    pub voice: String,
    pub instruction: String,
    pub response_modality: ResponseModality,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: LIVE_MODEL.to_string(),
            voice: VOICE_PERSONA.to_string(),
            instruction: SYSTEM_INSTRUCTION.to_string(),
            response_modality: ResponseModality::Audio,
        }
    }
}

/// Base64 PCM carried by a server frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub mime_type: Option<String>,
    pub data: String,
}

/// Opaque message from the remote session. Only the audio payload matters to the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerFrame {
    pub audio: Option<AudioPayload>,
    pub turn_complete: bool,
}

impl ServerFrame {
    pub fn with_audio(data: impl Into<String>) -> Self {
        Self {
            audio: Some(AudioPayload { mime_type: None, data: data.into() }),
            turn_complete: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Open,
    Message(ServerFrame),
    Closed,
    Error(String),
}

/// Cloneable outbound half of a remote session.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<EncodedFrame>,
}

impl FrameSender {
    /// Queue a frame. Returns `false` if the transport has gone away; the frame is dropped.
    pub fn send(&self, frame: EncodedFrame) -> bool {
        match self.tx.send(frame) {
            Ok(()) => true,
            Err(_) => {
                trace!("Transport closed, dropping frame");
                false
            }
        }
    }
}

/// Handle to an open streaming session.
#[derive(Debug)]
pub struct RemoteSession {
    outbound: FrameSender,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Provider-side end of a [`RemoteSession`].
#[derive(Debug)]
pub struct RemoteEnd {
    /// Deliver events to the engine
    pub events: mpsc::UnboundedSender<SessionEvent>,
    /// Frames sent by the engine
    pub outbound: mpsc::UnboundedReceiver<EncodedFrame>,
    /// Resolves when the engine closes the session
    pub shutdown: oneshot::Receiver<()>,
}

impl RemoteSession {
    /// Create a session handle together with the end a provider adapter drives.
    pub fn channel() -> (RemoteSession, RemoteEnd) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let session = RemoteSession {
            outbound: FrameSender { tx: outbound_tx },
            events: Some(events_rx),
            shutdown: Some(shutdown_tx),
        };
        let end = RemoteEnd {
            events: events_tx,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        (session, end)
    }

    pub fn sender(&self) -> FrameSender {
        self.outbound.clone()
    }

    pub fn send(&self, frame: EncodedFrame) -> bool {
        self.outbound.send(frame)
    }

    /// Take the inbound event stream. Only the first call returns `Some`.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_none()
    }
}

impl Releasable for RemoteSession {
    fn release(&mut self) -> EngineResult<()> {
        if let Some(shutdown) = self.shutdown.take() {
            // The provider may already be gone
            let _ = shutdown.send(());
        }
        Ok(())
    }
}

/// Opens streaming sessions with the remote conversational endpoint.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Resolve once the transport is established. The session is not usable for
    /// audio until it reports [`SessionEvent::Open`].
    async fn connect(&self, config: &LiveConfig) -> EngineResult<RemoteSession>;
}
