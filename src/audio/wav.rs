//! # Headless WAV Audio Engine
//!
//! [`AudioEngine`] for hosts without sound hardware. The "microphone" is a
//! 16kHz mono 16-bit WAV file replayed in real time; the "speaker" is a
//! timeline rendered to a WAV file when the playback graph is released.
//!
//! ## Timing:
//! - Microphone chunks of [`MIC_CHUNK_SIZE`] samples are paced by a tokio interval
//! - The playback clock is wall time since the graph was opened
//! - Each scheduled source reports completion at `start_time + duration`
//!
//! ## Capture Framing:
//! [`FramingCaptureGraph`] works with any [`Microphone`]. It reframes chunks
//! into fixed blocks and drops a block when the consumer has fallen behind.

use crate::audio::capture::BlockFramer;
use crate::audio::codec::{self, PcmFormat};
use crate::audio::engine::{
    AudioEngine, CaptureBlock, CaptureGraph, Microphone, PlaybackGraph, PlaybackOutput, SourceId,
};
use crate::audio::playback::PlaybackBuffer;
use crate::config::DeviceConfig;
use crate::error::{EngineError, EngineResult};
use crate::session::resources::Releasable;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Samples per simulated device callback
pub const MIC_CHUNK_SIZE: usize = 1024;

/// Capture blocks buffered ahead of the encoder before new ones are dropped
const CAPTURE_QUEUE_DEPTH: usize = 4;

/// File-backed [`AudioEngine`].
///
/// ## Fields:
/// - `input_path`: Read again on every `acquire_microphone`, so the file can change between sessions
/// - `output_path`: Overwritten by each session that plays any audio
pub struct WavAudioEngine {
    input_path: PathBuf,
    output_path: PathBuf,
}

impl WavAudioEngine {
    pub fn new(device: &DeviceConfig) -> Self {
        Self::from_paths(&device.input_path, &device.output_path)
    }

    pub fn from_paths(input_path: impl AsRef<Path>, output_path: impl AsRef<Path>) -> Self {
        Self {
            input_path: input_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl AudioEngine for WavAudioEngine {
    async fn acquire_microphone(&self) -> EngineResult<Box<dyn Microphone>> {
        let path = self.input_path.clone();
        let samples = tokio::task::spawn_blocking(move || read_input(&path))
            .await
            .map_err(|e| EngineError::DeviceUnavailable(format!("input reader failed: {}", e)))??;

        info!(
            path = %self.input_path.display(),
            seconds = PcmFormat::CAPTURE.duration_of(samples.len()),
            "Microphone acquired"
        );
        Ok(Box::new(WavMicrophone { samples: Some(samples), feeder: None }))
    }

    fn open_capture_graph(&self, format: PcmFormat) -> EngineResult<Box<dyn CaptureGraph>> {
        Ok(Box::new(FramingCaptureGraph::new(format)))
    }

    fn open_playback_graph(&self, format: PcmFormat) -> EngineResult<PlaybackOutput> {
        let (ended_tx, ended) = mpsc::unbounded_channel();
        let graph = WavPlaybackGraph::new(format, self.output_path.clone(), ended_tx);
        Ok(PlaybackOutput { graph: Box::new(graph), ended })
    }
}

/// Read a 16kHz mono 16-bit PCM file as normalized samples.
fn read_input(path: &Path) -> EngineResult<Vec<f32>> {
    let unavailable = |reason: String| EngineError::DeviceUnavailable(format!("{}: {}", path.display(), reason));

    let mut file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
    let (header, data) = wav::read(&mut file).map_err(|e| unavailable(e.to_string()))?;

    if header.audio_format != wav::WAV_FORMAT_PCM {
        return Err(unavailable(format!("unsupported encoding {}", header.audio_format)));
    }
    if header.channel_count != PcmFormat::CAPTURE.channels {
        return Err(unavailable(format!("expected mono, found {} channels", header.channel_count)));
    }
    if header.sampling_rate != PcmFormat::CAPTURE.sample_rate {
        return Err(unavailable(format!("expected 16000 Hz, found {} Hz", header.sampling_rate)));
    }

    match data {
        wav::BitDepth::Sixteen(samples) => Ok(codec::pcm16_to_float(&samples)),
        _ => Err(unavailable(format!("expected 16-bit samples, found {}-bit", header.bits_per_sample))),
    }
}

struct WavMicrophone {
    samples: Option<Vec<f32>>,
    feeder: Option<JoinHandle<()>>,
}

impl Releasable for WavMicrophone {
    fn release(&mut self) -> EngineResult<()> {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        self.samples = None;
        Ok(())
    }
}

impl Microphone for WavMicrophone {
    fn format(&self) -> PcmFormat {
        PcmFormat::CAPTURE
    }

    fn open_stream(&mut self) -> EngineResult<mpsc::Receiver<Vec<f32>>> {
        let samples = self
            .samples
            .take()
            .ok_or_else(|| EngineError::AudioGraph("microphone stream already open".into()))?;

        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE_DEPTH);
        let period = Duration::from_secs_f64(self.format().duration_of(MIC_CHUNK_SIZE));

        self.feeder = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            for chunk in samples.chunks(MIC_CHUNK_SIZE) {
                ticker.tick().await;
                if tx.send(chunk.to_vec()).await.is_err() {
                    return;
                }
            }
            debug!("Microphone input exhausted");
        }));
        Ok(rx)
    }
}

/// Capture graph that reframes any microphone's chunks into fixed blocks.
pub struct FramingCaptureGraph {
    format: PcmFormat,
    pump: Option<JoinHandle<()>>,
}

impl FramingCaptureGraph {
    pub fn new(format: PcmFormat) -> Self {
        Self { format, pump: None }
    }
}

impl Releasable for FramingCaptureGraph {
    fn release(&mut self) -> EngineResult<()> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        Ok(())
    }
}

impl CaptureGraph for FramingCaptureGraph {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn connect(
        &mut self,
        microphone: &mut dyn Microphone,
        block_size: usize,
    ) -> EngineResult<mpsc::Receiver<CaptureBlock>> {
        if self.pump.is_some() {
            return Err(EngineError::AudioGraph("capture graph already connected".into()));
        }
        if microphone.format() != self.format {
            return Err(EngineError::AudioGraph(format!(
                "microphone delivers {:?}, graph expects {:?}",
                microphone.format(),
                self.format
            )));
        }

        let mut chunks = microphone.open_stream()?;
        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE_DEPTH);

        self.pump = Some(tokio::spawn(async move {
            let mut framer = BlockFramer::new(block_size);
            while let Some(chunk) = chunks.recv().await {
                for block in framer.push(&chunk) {
                    match tx.try_send(block) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(block)) => {
                            warn!(sequence = block.sequence, "Capture consumer lagging, block dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => return,
                    }
                }
            }
        }));
        Ok(rx)
    }
}

#[derive(Debug)]
struct Segment {
    start_time: f64,
    samples: Vec<f32>,
    stopped_at: Option<f64>,
}

impl Segment {
    /// Samples that actually reached the output.
    fn audible(&self, sample_rate: u32) -> &[f32] {
        let limit = match self.stopped_at {
            Some(at) => (((at - self.start_time).max(0.0)) * sample_rate as f64).round() as usize,
            None => self.samples.len(),
        };
        &self.samples[..limit.min(self.samples.len())]
    }
}

/// Playback graph that renders its timeline to a WAV file on release.
///
/// A graph that never made a sound leaves the output file untouched, so a
/// session that fails before any response keeps the previous recording.
pub struct WavPlaybackGraph {
    format: PcmFormat,
    output_path: PathBuf,
    opened_at: Instant,
    next_id: SourceId,
    segments: HashMap<SourceId, Segment>,
    timers: HashMap<SourceId, JoinHandle<()>>,
    ended: mpsc::UnboundedSender<SourceId>,
    released: bool,
}

impl WavPlaybackGraph {
    pub fn new(format: PcmFormat, output_path: PathBuf, ended: mpsc::UnboundedSender<SourceId>) -> Self {
        Self {
            format,
            output_path,
            opened_at: Instant::now(),
            next_id: 0,
            segments: HashMap::new(),
            timers: HashMap::new(),
            ended,
            released: false,
        }
    }

    /// Mix every segment into one buffer, starting at clock zero.
    fn render(&self) -> Vec<f32> {
        let rate = self.format.sample_rate;
        let mut timeline: Vec<f32> = Vec::new();

        for segment in self.segments.values() {
            let offset = (segment.start_time * rate as f64).round() as usize;
            let audible = segment.audible(rate);
            if audible.is_empty() {
                continue;
            }
            if timeline.len() < offset + audible.len() {
                timeline.resize(offset + audible.len(), 0.0);
            }
            for (slot, sample) in timeline[offset..].iter_mut().zip(audible) {
                *slot += sample;
            }
        }
        timeline
    }
}

/// A rendered timeline waiting to be written to disk.
struct OutputWrite {
    path: PathBuf,
    format: PcmFormat,
    samples: Vec<i16>,
    sources: usize,
}

impl OutputWrite {
    /// Write next to the target, then rename over it so readers never see a partial file.
    fn run(self) -> EngineResult<()> {
        let OutputWrite { path, format, samples, sources } = self;
        let failed = |e: std::io::Error| EngineError::AudioGraph(format!("{}: {}", path.display(), e));
        let seconds = format.duration_of(samples.len());
        let header = wav::Header::new(wav::WAV_FORMAT_PCM, format.channels, format.sample_rate, 16);
        let staging = path.with_extension("wav.part");

        let mut file = File::create(&staging).map_err(failed)?;
        wav::write(header, &wav::BitDepth::Sixteen(samples), &mut file).map_err(failed)?;
        drop(file);
        std::fs::rename(&staging, &path).map_err(failed)?;

        info!(path = %path.display(), seconds, sources, "Playback written");
        Ok(())
    }
}

impl Releasable for WavPlaybackGraph {
    fn release(&mut self) -> EngineResult<()> {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        if self.released {
            return Ok(());
        }
        self.released = true;

        let timeline = self.render();
        if timeline.is_empty() {
            debug!(path = %self.output_path.display(), "No audio played, output left untouched");
            return Ok(());
        }

        let job = OutputWrite {
            path: self.output_path.clone(),
            format: self.format,
            samples: codec::float_to_pcm16(&timeline),
            sources: self.segments.len(),
        };

        // File I/O stays off the calling task when a runtime is available
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || {
                    if let Err(err) = job.run() {
                        warn!(error = %err, "Failed to write playback output");
                    }
                });
                Ok(())
            }
            Err(_) => job.run(),
        }
    }
}

impl PlaybackGraph for WavPlaybackGraph {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn current_time(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    fn schedule(&mut self, buffer: &PlaybackBuffer, start_time: f64) -> EngineResult<SourceId> {
        if self.released {
            return Err(EngineError::Released("playback graph"));
        }
        if buffer.format() != self.format {
            return Err(EngineError::AudioGraph(format!(
                "buffer is {:?}, graph plays {:?}",
                buffer.format(),
                self.format
            )));
        }

        self.timers.retain(|_, timer| !timer.is_finished());

        self.next_id += 1;
        let id = self.next_id;
        let ends_in = (start_time + buffer.duration() - self.current_time()).max(0.0);
        let ended = self.ended.clone();

        self.timers.insert(
            id,
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(ends_in)).await;
                let _ = ended.send(id);
            }),
        );
        self.segments.insert(
            id,
            Segment { start_time, samples: buffer.samples().to_vec(), stopped_at: None },
        );
        Ok(id)
    }

    fn stop(&mut self, source: SourceId) {
        if let Some(timer) = self.timers.remove(&source) {
            timer.abort();
        }
        let now = self.current_time();
        if let Some(segment) = self.segments.get_mut(&source) {
            segment.stopped_at.get_or_insert(now);
        }
    }
}
