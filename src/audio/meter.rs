//! # Volume Meter
//!
//! Bounded loudness estimate of a capture block for UI feedback.
//! `clamp(rms(block) * gain, 0, 1)`; speech typically peaks around an RMS of
//! 0.1, so the default gain of 10 maps normal speaking level near full scale.

/// Gain applied to the raw RMS before clamping
pub const DEFAULT_METER_GAIN: f32 = 10.0;

/// Stateless loudness estimator.
///
/// ## Rust Concepts:
/// - **Copy**: A single `f32` field, so the meter is passed by value into each encoder
/// - **Default**: `VolumeMeter::default()` uses [`DEFAULT_METER_GAIN`]
#[derive(Debug, Clone, Copy)]
pub struct VolumeMeter {
    gain: f32,
}

impl Default for VolumeMeter {
    fn default() -> Self {
        Self::new(DEFAULT_METER_GAIN)
    }
}

impl VolumeMeter {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// Loudness of `block` in `[0, 1]`. Empty blocks and NaN samples read as silence.
    pub fn measure(&self, block: &[f32]) -> f32 {
        let level = rms(block) * self.gain;
        if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        }
    }
}

/// Root-mean-square amplitude. Accumulates in f64 to keep 4096-sample blocks exact.
pub fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }

    let sum: f64 = block.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / block.len() as f64).sqrt() as f32
}
