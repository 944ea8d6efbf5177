//! Spectral-peak gait strategy.
//!
//! Windowed discrete transform of the sample buffer; the bin of maximum
//! magnitude inside the search band is the cadence candidate. The walking
//! threshold adapts: a trailing moving average over non-walking magnitudes,
//! scaled and floor-clamped, with a fixed fallback until enough history
//! accumulates.

use std::collections::VecDeque;
use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use tracing::trace;

use contracts::{DetectionConfig, SpectralConfig};

use crate::GaitDecision;

pub struct SpectralPeakDetector {
    band_low_hz: f32,
    band_high_hz: f32,
    config: SpectralConfig,
    quiet_history: VecDeque<f32>,
    planner: FftPlanner<f32>,
    cached_fft: Option<Arc<dyn Fft<f32>>>,
    cached_size: usize,
}

impl std::fmt::Debug for SpectralPeakDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralPeakDetector")
            .field("band_low_hz", &self.band_low_hz)
            .field("band_high_hz", &self.band_high_hz)
            .field("history_len", &self.quiet_history.len())
            .finish_non_exhaustive()
    }
}

impl SpectralPeakDetector {
    pub fn new(detection: &DetectionConfig) -> Self {
        Self {
            band_low_hz: detection.band_low_hz,
            band_high_hz: detection.band_high_hz,
            config: detection.spectral.clone(),
            quiet_history: VecDeque::with_capacity(detection.spectral.adaptive_window),
            planner: FftPlanner::new(),
            cached_fft: None,
            cached_size: 0,
        }
    }

    /// Analyze one full window. `samples` is the buffer oldest-first.
    pub fn analyze(&mut self, samples: &[f32], sample_rate_hz: f32) -> GaitDecision {
        let n = samples.len();
        if n < 2 {
            return GaitDecision {
                frequency_hz: 0.0,
                magnitude: 0.0,
                walking: false,
            };
        }

        let mean = samples.iter().sum::<f32>() / n as f32;
        let mut spectrum: Vec<Complex32> =
            samples.iter().map(|&v| Complex32::new(v - mean, 0.0)).collect();

        if self.cached_size != n {
            self.cached_fft = Some(self.planner.plan_fft_forward(n));
            self.cached_size = n;
        }
        if let Some(fft) = self.cached_fft.as_ref() {
            fft.process(&mut spectrum);
        }

        // Bin k maps to k * fs / n Hz.
        let hz_per_bin = sample_rate_hz / n as f32;
        let lo = (self.band_low_hz / hz_per_bin).ceil() as usize;
        let hi = ((self.band_high_hz / hz_per_bin).floor() as usize).min(n / 2);

        let mut peak_bin = lo;
        let mut peak_mag = 0.0f32;
        for k in lo..=hi {
            let mag = spectrum[k].norm();
            if mag > peak_mag {
                peak_mag = mag;
                peak_bin = k;
            }
        }

        let frequency_hz = peak_bin as f32 * hz_per_bin;
        let magnitude = peak_mag / n as f32;

        let threshold = self.threshold();
        let walking = magnitude > threshold && frequency_hz >= self.band_low_hz;
        trace!(frequency_hz, magnitude, threshold, walking, "spectral window");

        // Only quiet windows feed the adaptive baseline.
        if !walking {
            if self.quiet_history.len() == self.config.adaptive_window {
                self.quiet_history.pop_front();
            }
            self.quiet_history.push_back(magnitude);
        }

        GaitDecision {
            frequency_hz,
            magnitude,
            walking,
        }
    }

    fn threshold(&self) -> f32 {
        if self.quiet_history.len() < self.config.bootstrap_min {
            return self.config.fallback_threshold;
        }
        let mean =
            self.quiet_history.iter().sum::<f32>() / self.quiet_history.len() as f32;
        (mean * self.config.adaptive_factor).max(self.config.threshold_floor)
    }
}
