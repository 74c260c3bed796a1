//! Test doubles for the audio engine and the remote connector.

use crate::audio::codec::PcmFormat;
use crate::audio::engine::{
    AudioEngine, CaptureBlock, CaptureGraph, Microphone, PlaybackGraph, PlaybackOutput, SourceId,
};
use crate::audio::playback::PlaybackBuffer;
use crate::error::{EngineError, EngineResult};
use crate::session::resources::Releasable;
use crate::transport::{LiveConfig, RemoteConnector, RemoteEnd, RemoteSession};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Output clock advanced by hand.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<f64>>);

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn now(&self) -> f64 {
        *self.0.lock().unwrap()
    }

    pub fn advance(&self, seconds: f64) {
        *self.0.lock().unwrap() += seconds;
    }
}

#[derive(Debug, Default)]
struct PlaybackLog {
    next_id: SourceId,
    scheduled: Vec<(SourceId, f64, f64)>,
    stopped: Vec<SourceId>,
    releases: usize,
}

/// Playback graph that records every call.
#[derive(Debug, Clone)]
pub struct FakePlaybackGraph {
    clock: ManualClock,
    format: PcmFormat,
    log: Arc<Mutex<PlaybackLog>>,
}

impl FakePlaybackGraph {
    pub fn new(clock: ManualClock, format: PcmFormat) -> Self {
        Self { clock, format, log: Arc::default() }
    }

    /// `(id, start_time, duration)` of every schedule call
    pub fn scheduled(&self) -> Vec<(SourceId, f64, f64)> {
        self.log.lock().unwrap().scheduled.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.log.lock().unwrap().stopped.clone()
    }

    pub fn release_count(&self) -> usize {
        self.log.lock().unwrap().releases
    }
}

impl Releasable for FakePlaybackGraph {
    fn release(&mut self) -> EngineResult<()> {
        self.log.lock().unwrap().releases += 1;
        Ok(())
    }
}

impl PlaybackGraph for FakePlaybackGraph {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn current_time(&self) -> f64 {
        self.clock.now()
    }

    fn schedule(&mut self, buffer: &PlaybackBuffer, start_time: f64) -> EngineResult<SourceId> {
        let mut log = self.log.lock().unwrap();
        log.next_id += 1;
        let id = log.next_id;
        log.scheduled.push((id, start_time, buffer.duration()));
        Ok(id)
    }

    fn stop(&mut self, source: SourceId) {
        self.log.lock().unwrap().stopped.push(source);
    }
}

/// Counters shared by every resource the fake engine hands out.
#[derive(Debug, Default)]
pub struct EngineProbe {
    pub microphones_acquired: AtomicUsize,
    pub microphones_released: AtomicUsize,
    pub captures_opened: AtomicUsize,
    pub captures_released: AtomicUsize,
    pub playbacks_opened: AtomicUsize,
    block_tx: Mutex<Option<mpsc::Sender<CaptureBlock>>>,
    playback: Mutex<Option<FakePlaybackGraph>>,
    ended_tx: Mutex<Option<mpsc::UnboundedSender<SourceId>>>,
}

impl EngineProbe {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Push a block as if the capture graph produced it.
    pub async fn capture(&self, block: CaptureBlock) {
        let tx = self.block_tx.lock().unwrap().clone().expect("capture graph not connected");
        tx.send(block).await.expect("capture consumer gone");
    }

    pub fn capture_connected(&self) -> bool {
        self.block_tx.lock().unwrap().is_some()
    }

    /// Report `id` as finished, as the output graph does when a source plays out.
    pub fn end(&self, id: SourceId) {
        let tx = self.ended_tx.lock().unwrap().clone().expect("no playback graph opened");
        tx.send(id).expect("playback consumer gone");
    }

    /// The most recently opened playback graph.
    pub fn playback(&self) -> FakePlaybackGraph {
        self.playback.lock().unwrap().clone().expect("no playback graph opened")
    }
}

struct FakeMicrophone {
    probe: Arc<EngineProbe>,
}

impl Releasable for FakeMicrophone {
    fn release(&mut self) -> EngineResult<()> {
        self.probe.microphones_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Microphone for FakeMicrophone {
    fn format(&self) -> PcmFormat {
        PcmFormat::CAPTURE
    }

    fn open_stream(&mut self) -> EngineResult<mpsc::Receiver<Vec<f32>>> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}

struct FakeCaptureGraph {
    probe: Arc<EngineProbe>,
}

impl Releasable for FakeCaptureGraph {
    fn release(&mut self) -> EngineResult<()> {
        self.probe.block_tx.lock().unwrap().take();
        self.probe.captures_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl CaptureGraph for FakeCaptureGraph {
    fn format(&self) -> PcmFormat {
        PcmFormat::CAPTURE
    }

    fn connect(
        &mut self,
        _microphone: &mut dyn Microphone,
        _block_size: usize,
    ) -> EngineResult<mpsc::Receiver<CaptureBlock>> {
        let (tx, rx) = mpsc::channel(8);
        *self.probe.block_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}

/// Audio engine built from fakes, driven by a [`ManualClock`].
pub struct FakeAudioEngine {
    pub probe: Arc<EngineProbe>,
    pub clock: ManualClock,
    pub deny_microphone: bool,
}

impl FakeAudioEngine {
    pub fn new() -> Self {
        Self {
            probe: Arc::default(),
            clock: ManualClock::new(0.0),
            deny_microphone: false,
        }
    }
}

#[async_trait]
impl AudioEngine for FakeAudioEngine {
    async fn acquire_microphone(&self) -> EngineResult<Box<dyn Microphone>> {
        if self.deny_microphone {
            return Err(EngineError::DeviceUnavailable("permission denied".into()));
        }
        self.probe.microphones_acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMicrophone { probe: self.probe.clone() }))
    }

    fn open_capture_graph(&self, _format: PcmFormat) -> EngineResult<Box<dyn CaptureGraph>> {
        self.probe.captures_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCaptureGraph { probe: self.probe.clone() }))
    }

    fn open_playback_graph(&self, format: PcmFormat) -> EngineResult<PlaybackOutput> {
        self.probe.playbacks_opened.fetch_add(1, Ordering::SeqCst);
        let graph = FakePlaybackGraph::new(self.clock.clone(), format);
        *self.probe.playback.lock().unwrap() = Some(graph.clone());
        let (ended_tx, ended) = mpsc::unbounded_channel();
        *self.probe.ended_tx.lock().unwrap() = Some(ended_tx);
        Ok(PlaybackOutput { graph: Box::new(graph), ended })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Reject,
    Hang,
}

/// Connector that hands the far end of every session to the test.
pub struct FakeConnector {
    behavior: ConnectBehavior,
    attempts: AtomicUsize,
    far_ends: mpsc::UnboundedSender<RemoteEnd>,
}

impl FakeConnector {
    pub fn new(behavior: ConnectBehavior) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (far_ends, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self { behavior, attempts: AtomicUsize::new(0), far_ends });
        (connector, rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(&self, _config: &LiveConfig) -> EngineResult<RemoteSession> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.behavior == ConnectBehavior::Reject {
            return Err(EngineError::TransportOpen("connection refused".into()));
        }

        let (session, end) = RemoteSession::channel();
        let _ = self.far_ends.send(end);
        if self.behavior == ConnectBehavior::Hang {
            std::future::pending::<()>().await;
        }
        Ok(session)
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
