//! Wavelet-ridge gait strategy.
//!
//! A bank of Morlet kernels spans the search band through the standard
//! scale-frequency mapping `f = omega0 * fs / (2 * pi * scale)`. Each kernel
//! is truncated to at most `max_taps` taps and correlated against the most
//! recent samples of the mean-centered buffer (a causal approximation rather
//! than a full windowed convolution). The scale with maximum coefficient
//! magnitude is the ridge.

use std::f32::consts::PI;

use num_complex::Complex32;
use tracing::trace;

use contracts::{DetectionConfig, RidgeConfig};

use crate::GaitDecision;

#[derive(Debug)]
pub struct RidgeDetector {
    band_low_hz: f32,
    band_high_hz: f32,
    config: RidgeConfig,
}

impl RidgeDetector {
    pub fn new(detection: &DetectionConfig) -> Self {
        Self {
            band_low_hz: detection.band_low_hz,
            band_high_hz: detection.band_high_hz,
            config: detection.ridge.clone(),
        }
    }

    fn frequency_to_scale(&self, freq_hz: f32, sample_rate_hz: f32) -> f32 {
        self.config.omega0 * sample_rate_hz / (2.0 * PI * freq_hz)
    }

    /// Analyze one full window. `samples` is the buffer oldest-first.
    pub fn analyze(&mut self, samples: &[f32], sample_rate_hz: f32) -> GaitDecision {
        let n = samples.len();
        if n < 2 || self.config.scales < 2 {
            return GaitDecision {
                frequency_hz: 0.0,
                magnitude: 0.0,
                walking: false,
            };
        }

        let mean = samples.iter().sum::<f32>() / n as f32;

        let mut ridge_freq = 0.0f32;
        let mut ridge_mag = 0.0f32;

        let span = self.band_high_hz - self.band_low_hz;
        for i in 0..self.config.scales {
            let freq = self.band_low_hz + span * i as f32 / (self.config.scales - 1) as f32;
            let scale = self.frequency_to_scale(freq, sample_rate_hz);
            let mag = self.correlate(samples, mean, scale);
            if mag > ridge_mag {
                ridge_mag = mag;
                ridge_freq = freq;
            }
        }

        let walking = ridge_mag > self.config.threshold
            && ridge_freq >= self.band_low_hz
            && ridge_freq <= self.band_high_hz;
        trace!(
            frequency_hz = ridge_freq,
            magnitude = ridge_mag,
            walking,
            "ridge window"
        );

        GaitDecision {
            frequency_hz: ridge_freq,
            magnitude: ridge_mag,
            walking,
        }
    }

    /// Correlate one truncated kernel against the newest samples. The
    /// coefficient is normalized by the kernel's L1 norm so the magnitude
    /// reads as a correlation amplitude independent of scale.
    fn correlate(&self, samples: &[f32], mean: f32, scale: f32) -> f32 {
        let taps = self.config.max_taps.min(samples.len());
        let tail = &samples[samples.len() - taps..];

        let mut acc = Complex32::new(0.0, 0.0);
        let mut kernel_l1 = 0.0f32;
        let norm = PI.powf(-0.25);

        for (k, &v) in tail.iter().enumerate() {
            // Tap time relative to the newest sample, in units of scale.
            let t = (k as f32 - (taps - 1) as f32) / scale;
            let envelope = norm * (-0.5 * t * t).exp();
            let kernel = Complex32::new(
                envelope * (self.config.omega0 * t).cos(),
                -envelope * (self.config.omega0 * t).sin(),
            );
            acc += kernel * (v - mean);
            kernel_l1 += envelope;
        }

        if kernel_l1 > 0.0 {
            acc.norm() / kernel_l1
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, fs: f32, n: usize, amp: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / fs).sin())
            .collect()
    }

    #[test]
    fn test_scale_frequency_mapping_round_trip() {
        let det = RidgeDetector::new(&DetectionConfig::default());
        let fs = 52.0;
        let scale = det.frequency_to_scale(2.0, fs);
        let back = det.config.omega0 * fs / (2.0 * PI * scale);
        assert!((back - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_ridge_tracks_cadence() {
        let mut det = RidgeDetector::new(&DetectionConfig::default());
        let fs = 52.0;
        let decision = det.analyze(&sine(2.0, fs, 256, 2.0), fs);
        assert!(decision.walking, "magnitude {}", decision.magnitude);
        assert!(
            (decision.frequency_hz - 2.0).abs() < 0.3,
            "ridge at {} Hz",
            decision.frequency_hz
        );
    }

    #[test]
    fn test_flat_signal_below_threshold() {
        let mut det = RidgeDetector::new(&DetectionConfig::default());
        let decision = det.analyze(&vec![0.7; 256], 52.0);
        assert!(!decision.walking);
        assert!(decision.magnitude < 0.01);
    }

    #[test]
    fn test_stronger_signal_higher_magnitude() {
        let mut det = RidgeDetector::new(&DetectionConfig::default());
        let fs = 52.0;
        let weak = det.analyze(&sine(2.0, fs, 256, 0.2), fs);
        let strong = det.analyze(&sine(2.0, fs, 256, 2.0), fs);
        assert!(strong.magnitude > weak.magnitude);
    }
}
