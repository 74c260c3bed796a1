//! # Playback Scheduler
//!
//! Gapless sequential playback of server audio.
//!
//! ## Scheduling Law:
//! For each decoded buffer:
//! - `start = max(clock.now(), next_start_time)`
//! - `next_start_time = start + buffer.duration`
//!
//! `next_start_time` is initialized lazily to the clock at first use. When
//! payloads arrive at least as fast as they play, each buffer starts exactly
//! where the previous one ends. When they arrive late the buffer starts "now"
//! and the gap is accepted; there is no look-ahead buffering.
//!
//! ## Live Set:
//! Every scheduled buffer is tracked as a [`ScheduledSource`] until its graph
//! reports completion. [`PlaybackScheduler::stop_all`] cancels all of them at once.

use crate::audio::codec::{self, PcmFormat};
use crate::audio::engine::{PlaybackGraph, SourceId};
use crate::error::{EngineError, EngineResult};
use crate::session::resources::Guarded;
use crate::transport::{AudioPayload, ServerFrame};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Decoded audio ready for scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    samples: Vec<f32>,
    format: PcmFormat,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, format: PcmFormat) -> Self {
        Self { samples, format }
    }

    /// Decode a base64 16-bit PCM payload.
    pub fn from_payload(payload: &AudioPayload, format: PcmFormat) -> EngineResult<Self> {
        Ok(Self::new(codec::decode_payload(&payload.data)?, format))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.format.duration_of(self.frames())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A buffer playing or queued on the output graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start_time: f64,
    pub duration: f64,
}

impl ScheduledSource {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Gapless scheduler in front of one playback graph.
///
/// Owns the graph through a [`Guarded`], so dropping the scheduler stops every
/// live source and releases the output.
///
/// ## Rust Concepts:
/// - **`Guarded<dyn PlaybackGraph>`**: Trait object behind an idempotent release guard
/// - **`Option<f64>`**: `None` until the first buffer, then the end of the queued audio
/// - **BTreeMap**: Live sources ordered by id, so `stop_all` stops them oldest first
pub struct PlaybackScheduler {
    graph: Guarded<dyn PlaybackGraph>,
    next_start_time: Option<f64>,
    live: BTreeMap<SourceId, ScheduledSource>,
}

impl PlaybackScheduler {
    pub fn new(graph: Box<dyn PlaybackGraph>) -> Self {
        Self {
            graph: Guarded::new("playback graph", graph),
            next_start_time: None,
            live: BTreeMap::new(),
        }
    }

    /// Schedule the audio carried by `frame`, if any.
    ///
    /// Frames without audio and empty payloads leave the scheduler untouched
    /// and return `Ok(None)`. Undecodable payloads return
    /// [`EngineError::MalformedPayload`], also without touching any state.
    pub fn handle_frame(&mut self, frame: &ServerFrame) -> EngineResult<Option<ScheduledSource>> {
        match &frame.audio {
            Some(payload) => self.enqueue(payload),
            None => {
                trace!("Server frame without audio");
                Ok(None)
            }
        }
    }

    pub fn enqueue(&mut self, payload: &AudioPayload) -> EngineResult<Option<ScheduledSource>> {
        let format = self.graph.get().map(|g| g.format()).ok_or(EngineError::Released("playback graph"))?;
        let buffer = PlaybackBuffer::from_payload(payload, format)?;
        self.schedule(buffer)
    }

    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> EngineResult<Option<ScheduledSource>> {
        if buffer.is_empty() {
            debug!("Ignoring empty audio payload");
            return Ok(None);
        }

        let graph = self.graph.get_mut().ok_or(EngineError::Released("playback graph"))?;
        let now = graph.current_time();
        let next = *self.next_start_time.get_or_insert(now);
        let start_time = now.max(next);
        let duration = buffer.duration();

        let id = graph.schedule(&buffer, start_time)?;
        let source = ScheduledSource { id, start_time, duration };

        self.live.insert(id, source);
        self.next_start_time = Some(start_time + duration);

        trace!(id, start_time, duration, live = self.live.len(), "Scheduled playback buffer");
        Ok(Some(source))
    }

    /// Completion notification from the graph. Returns whether `id` was live.
    ///
    /// Unknown ids (already stopped, or from a previous session) are ignored.
    pub fn on_ended(&mut self, id: SourceId) -> bool {
        self.live.remove(&id).is_some()
    }

    /// Stop and forget every live source immediately.
    pub fn stop_all(&mut self) {
        if let Some(graph) = self.graph.get_mut() {
            for id in self.live.keys() {
                graph.stop(*id);
            }
        }
        if !self.live.is_empty() {
            debug!(stopped = self.live.len(), "Stopped playback sources");
        }
        self.live.clear();
        self.next_start_time = None;
    }

    /// Stop all sources and release the output graph. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop_all();
        self.graph.release();
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_sources(&self) -> impl Iterator<Item = &ScheduledSource> {
        self.live.values()
    }

    pub fn next_start_time(&self) -> Option<f64> {
        self.next_start_time
    }

    pub fn is_released(&self) -> bool {
        self.graph.is_released()
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
