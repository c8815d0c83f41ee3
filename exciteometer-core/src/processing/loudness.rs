//! Coarse per-frame loudness estimation.
//!
//! Uses the final byte of a frame as an amplitude proxy instead of a full RMS
//! pass. For 16-bit little-endian PCM that byte is the high-order byte of the
//! last sample, so its signed magnitude scaled by 256 approximates the
//! sample's 16-bit amplitude. Good enough for a relative "excitement" score,
//! not a calibrated meter.

use crate::traits::estimator::LoudnessEstimator;

/// Full-scale reference for 16-bit samples.
pub const FULL_SCALE: f64 = 32768.0;

/// Decibels relative to full scale for a 16-bit amplitude.
pub fn amplitude_to_decibel(amplitude: f64) -> f64 {
    20.0 * (amplitude / FULL_SCALE).log10()
}

/// Default estimator: final byte of the frame, promoted to 16-bit magnitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastByteEstimator;

impl LoudnessEstimator for LastByteEstimator {
    fn sample(&self, frame: &[u8]) -> Option<f64> {
        let last = *frame.last()?;
        let proxy = f64::from((last as i8).unsigned_abs()) * 256.0;
        if proxy == 0.0 {
            log::debug!("No audio value received, frame treated as silence");
            return None;
        }

        // proxy is in 256..=32768, so the result is finite and at most 0 dB.
        let decibel = amplitude_to_decibel(proxy);
        log::debug!("Decibel: {:.3}", decibel);
        Some(decibel)
    }

    fn name(&self) -> &str {
        "last-byte"
    }

    fn clone_box(&self) -> Box<dyn LoudnessEstimator> {
        Box::new(*self)
    }
}

/// Arithmetic mean of the collected samples.
///
/// Returns negative infinity when nothing was collected.
pub fn finalize(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Ordered decibel samples for one session.
///
/// Only finite estimator output reaches the sequence; there is no way to
/// insert NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoudnessSamples {
    values: Vec<f64>,
}

impl LoudnessSamples {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `estimator` on `frame` and keep the result, if any.
    pub fn record(&mut self, estimator: &dyn LoudnessEstimator, frame: &[u8]) -> Option<f64> {
        let decibel = estimator.sample(frame).filter(|db| !db.is_nan())?;
        self.values.push(decibel);
        Some(decibel)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Session aggregate; see [`finalize`].
    pub fn aggregate(&self) -> f64 {
        finalize(&self.values)
    }
}
