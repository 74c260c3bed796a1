//! # Audio Engine Capability
//!
//! Platform seam between the session core and a concrete audio stack.
//! The core only needs four things from a platform:
//!
//! - **Microphone**: an acquirable input device producing raw sample chunks
//! - **Capture graph**: reframes microphone audio into fixed-size [`CaptureBlock`]s
//! - **Playback graph**: a clock plus sample-accurate buffer scheduling
//! - **Completion events**: notification when a scheduled buffer finishes
//!
//! Every handle is [`Releasable`], so the controller can hold them in
//! [`Guarded`](crate::session::resources::Guarded) wrappers.

use crate::audio::codec::PcmFormat;
use crate::audio::playback::PlaybackBuffer;
use crate::error::EngineResult;
use crate::session::resources::Releasable;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Identifier of a buffer scheduled on a playback graph.
pub type SourceId = u64;

/// Fixed-length block of normalized samples, delivered in capture order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureBlock {
    pub sequence: u64,
    pub samples: Vec<f32>,
}

/// An acquired input device.
pub trait Microphone: Releasable {
    fn format(&self) -> PcmFormat;

    /// Start the device. Chunks may be any length and arrive until the device
    /// stops or is released.
    fn open_stream(&mut self) -> EngineResult<mpsc::Receiver<Vec<f32>>>;
}

/// Processing graph that turns microphone audio into capture blocks.
pub trait CaptureGraph: Releasable {
    fn format(&self) -> PcmFormat;

    /// Route `microphone` into the graph. Every block on the returned channel
    /// holds exactly `block_size` samples.
    fn connect(
        &mut self,
        microphone: &mut dyn Microphone,
        block_size: usize,
    ) -> EngineResult<mpsc::Receiver<CaptureBlock>>;
}

/// Output graph with its own clock.
pub trait PlaybackGraph: Releasable {
    fn format(&self) -> PcmFormat;

    /// Output clock in seconds. Monotonic for the life of the graph.
    fn current_time(&self) -> f64;

    /// Start `buffer` at `start_time` on the output clock.
    fn schedule(&mut self, buffer: &PlaybackBuffer, start_time: f64) -> EngineResult<SourceId>;

    /// Stop a source immediately, whether playing or queued. Unknown ids are ignored.
    fn stop(&mut self, source: SourceId);
}

/// Freshly opened playback graph and its completion stream.
pub struct PlaybackOutput {
    pub graph: Box<dyn PlaybackGraph>,
    /// Ids of sources that finished playing naturally
    pub ended: mpsc::UnboundedReceiver<SourceId>,
}

/// Factory for the platform's audio resources.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Acquire the input device. May suspend while the platform asks for permission.
    async fn acquire_microphone(&self) -> EngineResult<Box<dyn Microphone>>;

    fn open_capture_graph(&self, format: PcmFormat) -> EngineResult<Box<dyn CaptureGraph>>;

    fn open_playback_graph(&self, format: PcmFormat) -> EngineResult<PlaybackOutput>;
}
