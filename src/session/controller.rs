//! # Session Controller
//!
//! Single owner of the voice session. Runs as one tokio task; every mutation of
//! the session happens inside its loop, driven by:
//!
//! - **Commands** from any number of [`SessionHandle`]s (`start`, `stop`, `toggle`)
//! - **Connect progress**: microphone acquisition and transport connect, polled in place
//! - **Transport events**: `Open`, `Message`, `Closed`, `Error`
//! - **Capture blocks** from the capture graph
//! - **Playback completion** from the playback graph
//!
//! ## Failure Semantics:
//! Microphone denial, connect rejection and transport errors end the session
//! with status `Error`; a normal close ends it with `Disconnected`. Nothing is
//! retried. Every exit path releases every acquired resource before the new
//! status is published.

use crate::audio::capture::{CaptureEncoder, CAPTURE_BLOCK_SIZE};
use crate::audio::codec::PcmFormat;
use crate::audio::engine::{AudioEngine, CaptureBlock, CaptureGraph, Microphone, SourceId};
use crate::audio::meter::VolumeMeter;
use crate::audio::playback::PlaybackScheduler;
use crate::error::{EngineError, EngineResult};
use crate::session::resources::Guarded;
use crate::session::state::{SessionRecord, SessionSnapshot, SessionStatus};
use crate::transport::{LiveConfig, RemoteConnector, RemoteSession, ServerFrame, SessionEvent};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Toggle,
}

/// Cloneable front door to a running [`SessionController`].
///
/// All three operations are fire-and-forget and never fail; observe the
/// outcome through [`SessionHandle::subscribe`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn start(&self) {
        self.dispatch(Command::Start);
    }

    pub fn stop(&self) {
        self.dispatch(Command::Stop);
    }

    pub fn toggle(&self) {
        self.dispatch(Command::Toggle);
    }

    fn dispatch(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!(?command, "Session controller has shut down, command ignored");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.state.borrow()
    }

    /// Whether the controller task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// New observer of state changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// State changes as a stream, starting with the current snapshot.
    pub fn updates(&self) -> WatchStream<SessionSnapshot> {
        WatchStream::new(self.state.clone())
    }

    /// Wait until the snapshot satisfies `predicate`. `None` if the controller is gone.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Option<SessionSnapshot> {
        let mut state = self.state.clone();
        let snapshot = state.wait_for(predicate).await.ok()?;
        Some(*snapshot)
    }
}

/// Resources that settle asynchronously during `start`.
struct Established {
    microphone: Guarded<dyn Microphone>,
    remote: RemoteSession,
}

type PendingConnect = BoxFuture<'static, EngineResult<Established>>;

/// Everything owned by one live session.
struct ActiveSession {
    record: SessionRecord,
    capture: Guarded<dyn CaptureGraph>,
    scheduler: PlaybackScheduler,
    ended: mpsc::UnboundedReceiver<SourceId>,
    pending: Option<PendingConnect>,
    microphone: Option<Guarded<dyn Microphone>>,
    remote: Option<Guarded<RemoteSession>>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    blocks: Option<mpsc::Receiver<CaptureBlock>>,
    encoder: Option<CaptureEncoder>,
}

impl ActiveSession {
    /// Release in order: in-flight connect, capture graph, playback, transport,
    /// microphone. Each step is independent of the others succeeding.
    fn teardown(&mut self) {
        self.pending = None;
        self.blocks = None;
        self.encoder = None;
        self.events = None;

        self.capture.release();
        self.scheduler.shutdown();
        if let Some(remote) = self.remote.as_mut() {
            remote.release();
        }
        if let Some(microphone) = self.microphone.as_mut() {
            microphone.release();
        }
    }
}

enum LoopEvent {
    Command(Option<Command>),
    Settled(EngineResult<Established>),
    Remote(Option<SessionEvent>),
    Block(Option<CaptureBlock>),
    Ended(SourceId),
}

/// Owner of the voice session and everything it holds.
///
/// Created with [`SessionController::new`] (or [`SessionController::spawn`]),
/// which also returns the first [`SessionHandle`]. The controller runs until
/// every handle is dropped.
///
/// ## Rust Concepts:
/// - **`Arc<dyn AudioEngine>` / `Arc<dyn RemoteConnector>`**: Shared capability objects;
///   the connect future clones them so it can outlive one loop iteration
/// - **`watch::Sender`**: Holds the latest snapshot; receivers always see the newest value
/// - **`Option<ActiveSession>`**: `None` while idle, so "not running" owns no resources
pub struct SessionController {
    engine: Arc<dyn AudioEngine>,
    connector: Arc<dyn RemoteConnector>,
    config: LiveConfig,
    meter: VolumeMeter,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<SessionSnapshot>,
    session: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        connector: Arc<dyn RemoteConnector>,
        config: LiveConfig,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(SessionSnapshot::default());

        let controller = Self {
            engine,
            connector,
            config,
            meter: VolumeMeter::default(),
            commands,
            state,
            session: None,
        };
        let handle = SessionHandle { commands: commands_tx, state: state_rx };
        (controller, handle)
    }

    /// Create a controller and run it on the current tokio runtime.
    pub fn spawn(
        engine: Arc<dyn AudioEngine>,
        connector: Arc<dyn RemoteConnector>,
        config: LiveConfig,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (controller, handle) = Self::new(engine, connector, config);
        (handle, tokio::spawn(controller.run()))
    }

    /// Process events until every handle is dropped, then stop.
    ///
    /// Commands are polled first, so a `stop` is never starved by a busy
    /// transport or capture stream.
    pub async fn run(mut self) {
        loop {
            match self.next_event().await {
                LoopEvent::Command(Some(command)) => self.handle_command(command),
                LoopEvent::Command(None) => break,
                LoopEvent::Settled(result) => self.on_settled(result),
                LoopEvent::Remote(Some(event)) => self.on_session_event(event),
                LoopEvent::Remote(None) => {
                    info!("Transport dropped its event stream");
                    self.finish(SessionStatus::Disconnected);
                }
                LoopEvent::Block(Some(block)) => self.on_capture_block(block),
                LoopEvent::Block(None) => {
                    if let Some(active) = self.session.as_mut() {
                        info!(session_id = %active.record.id, "Capture stream ended");
                        active.blocks = None;
                    }
                }
                LoopEvent::Ended(id) => {
                    if let Some(active) = self.session.as_mut() {
                        active.scheduler.on_ended(id);
                    }
                }
            }
        }

        self.stop();
        debug!("Session controller stopped");
    }

    async fn next_event(&mut self) -> LoopEvent {
        let Self { commands, session, .. } = self;
        let Some(active) = session.as_mut() else {
            return LoopEvent::Command(commands.recv().await);
        };
        let ActiveSession { pending, events, blocks, ended, .. } = active;

        tokio::select! {
            biased;
            command = commands.recv() => LoopEvent::Command(command),
            result = settle(pending) => LoopEvent::Settled(result),
            event = recv_event(events) => LoopEvent::Remote(event),
            block = recv_block(blocks) => LoopEvent::Block(block),
            Some(id) = ended.recv() => LoopEvent::Ended(id),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Toggle => {
                if self.session.is_some() {
                    self.stop();
                } else {
                    self.start();
                }
            }
        }
    }

    fn start(&mut self) {
        if let Some(active) = &self.session {
            debug!(session_id = %active.record.id, "Session already active, start ignored");
            return;
        }

        let record = SessionRecord::new();
        info!(session_id = %record.id, "Starting voice session");
        self.publish(|s| {
            s.is_active = true;
            s.status = SessionStatus::Connecting;
        });

        let capture = match self.engine.open_capture_graph(PcmFormat::CAPTURE) {
            Ok(graph) => Guarded::new("capture graph", graph),
            Err(err) => return self.fail(err),
        };
        let playback = match self.engine.open_playback_graph(PcmFormat::PLAYBACK) {
            Ok(output) => output,
            // `capture` is released as it goes out of scope
            Err(err) => return self.fail(err),
        };

        self.session = Some(ActiveSession {
            record,
            capture,
            scheduler: PlaybackScheduler::new(playback.graph),
            ended: playback.ended,
            pending: Some(self.establish()),
            microphone: None,
            remote: None,
            events: None,
            blocks: None,
            encoder: None,
        });
    }

    /// Microphone first, then transport. Dropping the future releases whatever
    /// it already holds.
    fn establish(&self) -> PendingConnect {
        let engine = self.engine.clone();
        let connector = self.connector.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let microphone = Guarded::new("microphone", engine.acquire_microphone().await?);
            let remote = connector.connect(&config).await?;
            Ok(Established { microphone, remote })
        })
    }

    /// Idempotent; valid from every state, including mid-connect.
    fn stop(&mut self) {
        self.finish(SessionStatus::Disconnected);
    }

    fn fail(&mut self, err: EngineError) {
        error!(error = %err, "Voice session failed");
        self.finish(SessionStatus::Error);
    }

    /// Tear down the live session (if any) and publish the resting state.
    fn finish(&mut self, status: SessionStatus) {
        if let Some(mut active) = self.session.take() {
            active.teardown();
            info!(
                session_id = %active.record.id,
                status = %status,
                duration_seconds = active.record.elapsed_seconds(),
                "Voice session ended"
            );
        }

        self.publish(|s| {
            s.is_active = false;
            s.status = status;
            s.volume = 0.0;
        });
    }

    fn on_settled(&mut self, result: EngineResult<Established>) {
        let Established { microphone, mut remote } = match result {
            Ok(established) => established,
            Err(err) => return self.fail(err),
        };
        let Some(active) = self.session.as_mut() else {
            return;
        };

        debug!(session_id = %active.record.id, "Transport established, waiting for open");
        active.events = remote.take_events();
        active.microphone = Some(microphone);
        active.remote = Some(Guarded::new("remote session", Box::new(remote)));
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Open => self.on_open(),
            SessionEvent::Message(frame) => self.on_server_frame(frame),
            SessionEvent::Closed => {
                info!("Remote session closed");
                self.finish(SessionStatus::Disconnected);
            }
            SessionEvent::Error(cause) => self.fail(EngineError::Transport(cause)),
        }
    }

    /// Wire capture to the open transport.
    fn on_open(&mut self) {
        if self.snapshot().status != SessionStatus::Connecting {
            debug!("Duplicate open event ignored");
            return;
        }

        let wired = match self.session.as_mut() {
            Some(active) => wire_capture(active, self.meter),
            None => return,
        };

        match wired {
            Ok(()) => {
                info!("Voice session connected");
                self.publish(|s| s.status = SessionStatus::Connected);
            }
            Err(err) => self.fail(err),
        }
    }

    fn on_server_frame(&mut self, frame: ServerFrame) {
        let Some(active) = self.session.as_mut() else {
            return;
        };

        if frame.turn_complete {
            debug!(session_id = %active.record.id, "Model turn complete");
        }

        match active.scheduler.handle_frame(&frame) {
            Ok(Some(source)) => debug!(
                id = source.id,
                start_time = source.start_time,
                duration = source.duration,
                "Queued response audio"
            ),
            Ok(None) => {}
            Err(err) if !err.is_terminal() => {
                warn!(error = %err, "Dropping undecodable response audio");
            }
            Err(err) => self.fail(err),
        }
    }

    fn on_capture_block(&mut self, block: CaptureBlock) {
        let volume = match self.session.as_mut().and_then(|a| a.encoder.as_mut()) {
            Some(encoder) => encoder.process(&block),
            None => return,
        };
        self.publish(|s| s.volume = volume);
    }

    fn snapshot(&self) -> SessionSnapshot {
        *self.state.borrow()
    }

    /// Apply `update` and notify subscribers if anything changed.
    fn publish(&self, update: impl FnOnce(&mut SessionSnapshot)) {
        self.state.send_if_modified(|snapshot| {
            let before = *snapshot;
            update(snapshot);
            if *snapshot != before {
                debug!(
                    is_active = snapshot.is_active,
                    status = %snapshot.status,
                    volume = snapshot.volume,
                    "Session state changed"
                );
                true
            } else {
                false
            }
        });
    }
}

fn wire_capture(active: &mut ActiveSession, meter: VolumeMeter) -> EngineResult<()> {
    let sender = active
        .remote
        .as_ref()
        .and_then(|remote| remote.get())
        .map(|remote| remote.sender())
        .ok_or(EngineError::Released("remote session"))?;
    let microphone = active
        .microphone
        .as_mut()
        .and_then(|microphone| microphone.get_mut())
        .ok_or(EngineError::Released("microphone"))?;
    let capture = active.capture.get_mut().ok_or(EngineError::Released("capture graph"))?;

    active.blocks = Some(capture.connect(microphone, CAPTURE_BLOCK_SIZE)?);
    active.encoder = Some(CaptureEncoder::new(sender, capture.format(), meter));
    Ok(())
}

async fn settle(pending: &mut Option<PendingConnect>) -> EngineResult<Established> {
    match pending.as_mut() {
        Some(future) => {
            let result = future.await;
            *pending = None;
            result
        }
        None => std::future::pending().await,
    }
}

async fn recv_event(events: &mut Option<mpsc::UnboundedReceiver<SessionEvent>>) -> Option<SessionEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_block(blocks: &mut Option<mpsc::Receiver<CaptureBlock>>) -> Option<CaptureBlock> {
    match blocks {
        Some(blocks) => blocks.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::{encode_base64, pcm16_to_le_bytes};
    use crate::testing::{eventually, ConnectBehavior, EngineProbe, FakeAudioEngine, FakeConnector};
    use crate::transport::RemoteEnd;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        handle: SessionHandle,
        probe: Arc<EngineProbe>,
        connector: Arc<FakeConnector>,
        far_ends: mpsc::UnboundedReceiver<RemoteEnd>,
    }

    fn harness_with(engine: FakeAudioEngine, behavior: ConnectBehavior) -> Harness {
        let probe = engine.probe.clone();
        let (connector, far_ends) = FakeConnector::new(behavior);
        let (handle, _task) = SessionController::spawn(
            Arc::new(engine),
            connector.clone(),
            LiveConfig::default(),
        );
        Harness { handle, probe, connector, far_ends }
    }

    fn harness(behavior: ConnectBehavior) -> Harness {
        harness_with(FakeAudioEngine::new(), behavior)
    }

    impl Harness {
        async fn status(&self, status: SessionStatus) -> SessionSnapshot {
            timeout(WAIT, self.handle.wait_for(|s| s.status == status))
                .await
                .expect("timed out waiting for status")
                .expect("controller gone")
        }

        async fn far_end(&mut self) -> RemoteEnd {
            timeout(WAIT, self.far_ends.recv()).await.expect("no connect attempt").unwrap()
        }

        /// Start, open the transport and wait for Connected.
        async fn connect(&mut self) -> RemoteEnd {
            self.handle.start();
            let end = self.far_end().await;
            end.events.send(SessionEvent::Open).unwrap();
            self.status(SessionStatus::Connected).await;
            end
        }

        fn all_released(&self) -> bool {
            let p = &self.probe;
            EngineProbe::count(&p.microphones_acquired) == EngineProbe::count(&p.microphones_released)
                && EngineProbe::count(&p.captures_opened) == EngineProbe::count(&p.captures_released)
                && p.playback().release_count() == 1
        }
    }

    fn audio_frame(frames: usize) -> SessionEvent {
        let data = encode_base64(&pcm16_to_le_bytes(&vec![500i16; frames]));
        SessionEvent::Message(ServerFrame::with_audio(data))
    }

    #[tokio::test]
    async fn test_start_twice_opens_one_session() {
        let mut h = harness(ConnectBehavior::Succeed);
        h.handle.start();
        h.handle.start();

        let end = h.far_end().await;
        h.handle.start();
        end.events.send(SessionEvent::Open).unwrap();
        let snapshot = h.status(SessionStatus::Connected).await;
        h.handle.start();

        assert!(snapshot.is_active);
        assert!(eventually(|| h.probe.capture_connected()).await);
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(EngineProbe::count(&h.probe.microphones_acquired), 1);
        assert_eq!(EngineProbe::count(&h.probe.captures_opened), 1);
        assert_eq!(EngineProbe::count(&h.probe.playbacks_opened), 1);
    }

    #[tokio::test]
    async fn test_capture_blocks_are_encoded_and_metered() {
        let mut h = harness(ConnectBehavior::Succeed);
        let mut end = h.connect().await;

        h.probe
            .capture(CaptureBlock { sequence: 0, samples: vec![0.05; CAPTURE_BLOCK_SIZE] })
            .await;

        let frame = timeout(WAIT, end.outbound.recv()).await.unwrap().unwrap();
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(frame.payload.len(), CAPTURE_BLOCK_SIZE * 2);

        let snapshot = timeout(WAIT, h.handle.wait_for(|s| s.volume > 0.0)).await.unwrap().unwrap();
        assert!((snapshot.volume - 0.5).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_stop_twice_is_safe() {
        let mut h = harness(ConnectBehavior::Succeed);
        let mut end = h.connect().await;

        h.probe
            .capture(CaptureBlock { sequence: 0, samples: vec![0.05; CAPTURE_BLOCK_SIZE] })
            .await;
        timeout(WAIT, h.handle.wait_for(|s| s.volume > 0.0)).await.unwrap().unwrap();

        h.handle.stop();
        let first = h.status(SessionStatus::Disconnected).await;
        h.handle.stop();
        let second = h.status(SessionStatus::Disconnected).await;

        assert!(!first.is_active && !second.is_active);
        assert_eq!(first.volume, 0.0);
        assert_eq!(second.volume, 0.0);
        assert!(eventually(|| h.all_released()).await);
        assert!(end.shutdown.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_stop_from_idle_is_safe() {
        let h = harness(ConnectBehavior::Succeed);
        h.handle.stop();
        h.handle.stop();
        h.handle.toggle();
        let snapshot = h.status(SessionStatus::Connecting).await;
        assert!(snapshot.is_active);
    }

    #[tokio::test]
    async fn test_toggle_cycles_session() {
        let mut h = harness(ConnectBehavior::Hang);

        h.handle.toggle();
        let connecting = h.status(SessionStatus::Connecting).await;
        assert!(connecting.is_active);

        // Microphone is held by the in-flight connect
        let _end = h.far_end().await;
        assert_eq!(EngineProbe::count(&h.probe.microphones_acquired), 1);

        h.handle.toggle();
        let stopped = h.status(SessionStatus::Disconnected).await;
        assert!(!stopped.is_active);
        assert!(eventually(|| h.all_released()).await);
    }

    #[tokio::test]
    async fn test_toggle_from_connected_disconnects() {
        let mut h = harness(ConnectBehavior::Succeed);
        let _end = h.connect().await;

        h.handle.toggle();
        let snapshot = h.status(SessionStatus::Disconnected).await;
        assert!(!snapshot.is_active);
    }

    #[tokio::test]
    async fn test_error_while_connecting_releases_everything() {
        let mut h = harness(ConnectBehavior::Succeed);
        h.handle.start();
        let mut end = h.far_end().await;

        end.events.send(SessionEvent::Error("socket reset".into())).unwrap();
        let snapshot = h.status(SessionStatus::Error).await;

        assert!(!snapshot.is_active);
        assert!(h.all_released());
        assert!(end.shutdown.try_recv().is_ok());
        assert!(!h.probe.capture_connected());
    }

    #[tokio::test]
    async fn test_microphone_denied_is_terminal() {
        let mut engine = FakeAudioEngine::new();
        engine.deny_microphone = true;
        let h = harness_with(engine, ConnectBehavior::Succeed);

        h.handle.start();
        let snapshot = h.status(SessionStatus::Error).await;

        assert!(!snapshot.is_active);
        assert_eq!(h.connector.attempts(), 0);
        assert!(h.all_released());
    }

    #[tokio::test]
    async fn test_connect_rejection_is_terminal() {
        let h = harness(ConnectBehavior::Reject);

        h.handle.start();
        let snapshot = h.status(SessionStatus::Error).await;

        assert!(!snapshot.is_active);
        assert_eq!(EngineProbe::count(&h.probe.microphones_acquired), 1);
        assert!(h.all_released());
    }

    #[tokio::test]
    async fn test_restart_after_error() {
        let mut h = harness(ConnectBehavior::Succeed);
        h.handle.start();
        let end = h.far_end().await;
        end.events.send(SessionEvent::Error("boom".into())).unwrap();
        h.status(SessionStatus::Error).await;

        let _end = h.connect().await;
        assert_eq!(h.connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_remote_close_disconnects() {
        let mut h = harness(ConnectBehavior::Succeed);
        let end = h.connect().await;

        end.events.send(SessionEvent::Closed).unwrap();
        let snapshot = h.status(SessionStatus::Disconnected).await;

        assert!(!snapshot.is_active);
        assert!(h.all_released());
    }

    #[tokio::test]
    async fn test_response_audio_is_gapless() {
        let mut h = harness(ConnectBehavior::Succeed);
        let end = h.connect().await;

        end.events.send(audio_frame(2400)).unwrap();
        end.events.send(SessionEvent::Message(ServerFrame::default())).unwrap();
        end.events.send(audio_frame(4800)).unwrap();

        let playback = h.probe.playback();
        assert!(eventually(|| playback.scheduled().len() == 2).await);
        let scheduled = playback.scheduled();
        assert_eq!(scheduled[0].1, 0.0);
        assert!((scheduled[1].1 - (scheduled[0].1 + scheduled[0].2)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_malformed_audio_is_dropped() {
        let mut h = harness(ConnectBehavior::Succeed);
        let end = h.connect().await;

        end.events.send(SessionEvent::Message(ServerFrame::with_audio("!!not-base64"))).unwrap();
        end.events.send(audio_frame(2400)).unwrap();

        let playback = h.probe.playback();
        assert!(eventually(|| playback.scheduled().len() == 1).await);
        assert_eq!(h.handle.snapshot().status, SessionStatus::Connected);
    }

    #[tokio::test]
    async fn test_stop_cancels_playback() {
        let mut h = harness(ConnectBehavior::Succeed);
        let end = h.connect().await;
        end.events.send(audio_frame(2400)).unwrap();
        end.events.send(audio_frame(2400)).unwrap();

        let playback = h.probe.playback();
        assert!(eventually(|| playback.scheduled().len() == 2).await);

        h.handle.stop();
        h.status(SessionStatus::Disconnected).await;
        assert_eq!(playback.stopped().len(), 2);
    }

    #[tokio::test]
    async fn test_finished_sources_leave_the_live_set() {
        let mut h = harness(ConnectBehavior::Succeed);
        let end = h.connect().await;
        for _ in 0..3 {
            end.events.send(audio_frame(2400)).unwrap();
        }

        let playback = h.probe.playback();
        assert!(eventually(|| playback.scheduled().len() == 3).await);
        let ids: Vec<SourceId> = playback.scheduled().iter().map(|(id, _, _)| *id).collect();

        h.probe.end(ids[0]);
        h.probe.end(ids[1]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        h.handle.stop();
        h.status(SessionStatus::Disconnected).await;
        assert_eq!(playback.stopped(), vec![ids[2]]);
    }

    #[tokio::test]
    async fn test_stop_after_playback_finished_stops_nothing() {
        let mut h = harness(ConnectBehavior::Succeed);
        let end = h.connect().await;
        end.events.send(audio_frame(2400)).unwrap();
        end.events.send(audio_frame(2400)).unwrap();

        let playback = h.probe.playback();
        assert!(eventually(|| playback.scheduled().len() == 2).await);
        for (id, _, _) in playback.scheduled() {
            h.probe.end(id);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        h.handle.stop();
        h.status(SessionStatus::Disconnected).await;
        assert!(playback.stopped().is_empty());
        assert!(h.all_released());
    }
}
