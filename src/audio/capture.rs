//! # Capture Encoder
//!
//! Per-block microphone pipeline: meter, encode, send.
//!
//! ## Per Block:
//! 1. **Meter**: RMS loudness for the UI
//! 2. **Encode**: quantize to 16-bit little-endian PCM
//! 3. **Send**: hand the frame to the transport without waiting
//!
//! Blocks are never retried or buffered here. If the transport rejects a frame
//! it is counted and dropped; the session carries on.

use crate::audio::codec::{EncodedFrame, PcmFormat};
use crate::audio::engine::CaptureBlock;
use crate::audio::meter::VolumeMeter;
use crate::transport::FrameSender;
use tracing::debug;

/// Samples per capture block (~256 ms at 16 kHz)
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Turns capture blocks into outbound frames and volume readings.
///
/// One encoder exists per connected session. For every block it measures the
/// volume, encodes the samples as base64 16-bit PCM and hands the frame to the
/// transport without waiting.
///
/// ## Rust Concepts:
/// - **FrameSender**: Clonable sending half of the transport's outbound channel
/// - **`&mut self` in `process`**: The counters are updated in place, so only the
///   owning controller can drive the encoder
/// - **u64 counters**: Running totals for logging, never reset during a session
pub struct CaptureEncoder {
    sender: FrameSender,
    format: PcmFormat,
    meter: VolumeMeter,
    blocks_encoded: u64,
    frames_dropped: u64,
}

impl CaptureEncoder {
    /// `format` must match the capture graph the blocks come from; it becomes
    /// the frame's mime type.
    pub fn new(sender: FrameSender, format: PcmFormat, meter: VolumeMeter) -> Self {
        Self {
            sender,
            format,
            meter,
            blocks_encoded: 0,
            frames_dropped: 0,
        }
    }

    /// Process one block and return its volume in `[0, 1]`.
    ///
    /// A frame the transport refuses (closed or full) is counted and dropped;
    /// the block's volume is still returned.
    pub fn process(&mut self, block: &CaptureBlock) -> f32 {
        let volume = self.meter.measure(&block.samples);
        let frame = EncodedFrame::encode(&block.samples, self.format);

        if !self.sender.send(frame) {
            self.frames_dropped += 1;
            debug!(sequence = block.sequence, dropped = self.frames_dropped, "Capture frame dropped");
        }
        self.blocks_encoded += 1;

        volume
    }

    pub fn blocks_encoded(&self) -> u64 {
        self.blocks_encoded
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

/// Reframes arbitrary-length chunks into fixed-size capture blocks.
///
/// Used by capture graphs whose device delivers a different chunk size than
/// the encoder's block size. Leftover samples wait for the next chunk.
#[derive(Debug)]
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
    next_sequence: u64,
}

impl BlockFramer {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
            next_sequence: 0,
        }
    }

    /// Append `chunk` and return every block it completes, oldest first.
    pub fn push(&mut self, chunk: &[f32]) -> Vec<CaptureBlock> {
        self.pending.extend_from_slice(chunk);

        let complete = self.pending.len() / self.block_size;
        let mut blocks = Vec::with_capacity(complete);
        for samples in self.pending.chunks_exact(self.block_size) {
            blocks.push(CaptureBlock { sequence: self.next_sequence, samples: samples.to_vec() });
            self.next_sequence += 1;
        }
        self.pending.drain(..complete * self.block_size);

        blocks
    }

    /// Samples waiting for a complete block.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
