//! # Audio Codec
//!
//! Pure conversions between normalized float sample blocks and the wire
//! format used by the streaming session.
//!
//! ## Wire Format:
//! - **Encoding**: signed 16-bit PCM, little-endian, mono
//! - **Outgoing**: 16 000 Hz, tagged `audio/pcm;rate=16000`
//! - **Incoming**: 24 000 Hz, carried as base64 text inside server frames
//!
//! ## Quantization:
//! Floats are clamped to `[-1.0, 1.0]` before scaling by 32768 and the product
//! is clamped to the i16 range. Unclamped scaling wraps loud samples (a sample
//! of exactly 1.0 becomes -32768), so out-of-range input saturates here instead.

use crate::error::{EngineError, EngineResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Scale between i16 samples and normalized floats
const PCM16_SCALE: f32 = 32768.0;

/// Sample format of PCM audio on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    /// Microphone format sent to the remote session
    pub const CAPTURE: PcmFormat = PcmFormat { sample_rate: 16_000, channels: 1 };

    /// Format of audio returned by the remote session
    pub const PLAYBACK: PcmFormat = PcmFormat { sample_rate: 24_000, channels: 1 };

    /// MIME tag for this format, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Duration in seconds of `frames` sample frames.
    pub fn duration_of(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate as f64
    }
}

/// One encoded capture block, ready to hand to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub format: PcmFormat,
    /// Little-endian i16 samples
    pub payload: Vec<u8>,
}

impl EncodedFrame {
    /// Quantize and serialize a capture block.
    pub fn encode(samples: &[f32], format: PcmFormat) -> Self {
        Self {
            format,
            payload: pcm16_to_le_bytes(&float_to_pcm16(samples)),
        }
    }

    pub fn mime_type(&self) -> String {
        self.format.mime_type()
    }

    /// Payload as base64 text for JSON transports.
    pub fn payload_base64(&self) -> String {
        encode_base64(&self.payload)
    }
}

/// Convert normalized floats to i16 samples, saturating at the range limits.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let sample = if sample.is_nan() { 0.0 } else { sample };
            let scaled = sample.clamp(-1.0, 1.0) * PCM16_SCALE;
            scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

/// Convert i16 samples to floats in `[-1.0, 1.0)`.
pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / PCM16_SCALE).collect()
}

pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // Writing into a Vec cannot fail
        let _ = bytes.write_i16::<LittleEndian>(sample);
    }
    bytes
}

/// Parse little-endian i16 samples. Odd-length input is malformed.
pub fn le_bytes_to_pcm16(bytes: &[u8]) -> EngineResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(EngineError::MalformedPayload(format!(
            "16-bit PCM payload has odd length {}",
            bytes.len()
        )));
    }

    let mut samples = vec![0i16; bytes.len() / 2];
    LittleEndian::read_i16_into(bytes, &mut samples);
    Ok(samples)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_base64(text: &str) -> EngineResult<Vec<u8>> {
    Ok(BASE64.decode(text.trim())?)
}

/// Decode a base64 server payload straight to normalized float samples.
pub fn decode_payload(text: &str) -> EngineResult<Vec<f32>> {
    let bytes = decode_base64(text)?;
    let samples = le_bytes_to_pcm16(&bytes)?;
    Ok(pcm16_to_float(&samples))
}
