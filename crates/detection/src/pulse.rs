//! Optical heart-rate estimation.
//!
//! Two independent estimators over the same optical buffer, both run on the
//! analysis cadence once enough samples exist:
//! - beat peaks: moving-average smoothing, local maxima above a fraction of
//!   the smoothed maximum, averaged inter-peak gaps converted to bpm;
//! - spectral: fixed-length transform of the newest samples, dominant
//!   frequency in the search band converted to bpm.
//!
//! Estimates outside the plausibility band are rejected.

use std::collections::VecDeque;
use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use tracing::trace;

use contracts::{DetectionConfig, PulseConfig};

/// Latest accepted estimates from each source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulseEstimate {
    pub peak_bpm: Option<u16>,
    pub spectral_bpm: Option<u16>,
}

pub struct PulseEstimator {
    band_low_hz: f32,
    band_high_hz: f32,
    config: PulseConfig,
    /// (capture timestamp ms, masked optical value)
    samples: VecDeque<(i64, f32)>,
    estimate: PulseEstimate,
    planner: FftPlanner<f32>,
    cached_fft: Option<Arc<dyn Fft<f32>>>,
    cached_size: usize,
}

impl std::fmt::Debug for PulseEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseEstimator")
            .field("buffered", &self.samples.len())
            .field("estimate", &self.estimate)
            .finish_non_exhaustive()
    }
}

impl PulseEstimator {
    pub fn new(detection: &DetectionConfig) -> Self {
        let config = detection.pulse.clone();
        Self {
            band_low_hz: detection.band_low_hz,
            band_high_hz: detection.band_high_hz,
            samples: VecDeque::with_capacity(config.spectral_len),
            config,
            estimate: PulseEstimate::default(),
            planner: FftPlanner::new(),
            cached_fft: None,
            cached_size: 0,
        }
    }

    /// Buffer one optical sample; retains the newest `spectral_len`.
    pub fn push(&mut self, value: u32, captured_at_ms: i64) {
        if self.samples.len() == self.config.spectral_len {
            self.samples.pop_front();
        }
        self.samples.push_back((captured_at_ms, value as f32));
    }

    pub fn buffered(&self) -> usize {
        self.samples.len()
    }

    pub fn estimate(&self) -> PulseEstimate {
        self.estimate
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Run both estimators; each updates its slot only when it produces a
    /// plausible value.
    pub fn analyze(&mut self) -> PulseEstimate {
        if self.samples.len() >= self.config.min_peak_samples {
            if let Some(bpm) = self.peak_bpm() {
                self.estimate.peak_bpm = Some(bpm);
            }
        }
        if self.samples.len() >= self.config.spectral_len {
            if let Some(bpm) = self.spectral_bpm() {
                self.estimate.spectral_bpm = Some(bpm);
            }
        }
        trace!(estimate = ?self.estimate, buffered = self.samples.len(), "pulse window");
        self.estimate
    }

    fn accept(&self, bpm: f32) -> Option<u16> {
        let rounded = bpm.round() as i64;
        if rounded >= self.config.min_bpm as i64 && rounded <= self.config.max_bpm as i64 {
            Some(rounded as u16)
        } else {
            None
        }
    }

    fn peak_bpm(&self) -> Option<u16> {
        let half = self.config.smooth_half_width;
        let values: Vec<f32> = self.samples.iter().map(|&(_, v)| v).collect();
        let times: Vec<i64> = self.samples.iter().map(|&(t, _)| t).collect();
        let n = values.len();

        // Moving-average smoothing with clamped edges.
        let mut smoothed = Vec::with_capacity(n);
        for i in 0..n {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            let mean = values[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;
            smoothed.push(mean);
        }

        let max = smoothed.iter().cloned().fold(f32::MIN, f32::max);
        if max <= 0.0 {
            return None;
        }
        let floor = max * self.config.peak_fraction;

        let mut peak_times = Vec::new();
        for i in 1..n - 1 {
            if smoothed[i] > floor && smoothed[i] > smoothed[i - 1] && smoothed[i] >= smoothed[i + 1]
            {
                peak_times.push(times[i]);
            }
        }
        if peak_times.len() < 2 {
            return None;
        }

        let mut gaps = Vec::with_capacity(peak_times.len() - 1);
        for pair in peak_times.windows(2) {
            let gap = pair[1] - pair[0];
            if gap > 0 && gap < self.config.max_peak_gap_ms {
                gaps.push(gap as f32);
            }
        }
        if gaps.is_empty() {
            return None;
        }
        let mean_gap = gaps.iter().sum::<f32>() / gaps.len() as f32;
        self.accept(60_000.0 / mean_gap)
    }

    fn spectral_bpm(&mut self) -> Option<u16> {
        let n = self.config.spectral_len;
        let start = self.samples.len() - n;
        let tail: Vec<(i64, f32)> = self.samples.iter().skip(start).copied().collect();

        // Effective sample rate from the buffered timestamps; the optical
        // channel's nominal rate is not transmitted.
        let span_ms = tail[n - 1].0 - tail[0].0;
        if span_ms <= 0 {
            return None;
        }
        let sample_rate_hz = 1000.0 * (n - 1) as f32 / span_ms as f32;

        let mean = tail.iter().map(|&(_, v)| v).sum::<f32>() / n as f32;
        let mut spectrum: Vec<Complex32> = tail
            .iter()
            .map(|&(_, v)| Complex32::new(v - mean, 0.0))
            .collect();

        if self.cached_size != n {
            self.cached_fft = Some(self.planner.plan_fft_forward(n));
            self.cached_size = n;
        }
        self.cached_fft.as_ref()?.process(&mut spectrum);

        let hz_per_bin = sample_rate_hz / n as f32;
        let lo = (self.band_low_hz / hz_per_bin).ceil() as usize;
        let hi = ((self.band_high_hz / hz_per_bin).floor() as usize).min(n / 2);
        if lo > hi {
            return None;
        }

        let mut peak_bin = lo;
        let mut peak_mag = 0.0f32;
        for k in lo..=hi {
            let mag = spectrum[k].norm();
            if mag > peak_mag {
                peak_mag = mag;
                peak_bin = k;
            }
        }
        if peak_mag <= f32::EPSILON {
            return None;
        }

        self.accept(peak_bin as f32 * hz_per_bin * 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn estimator() -> PulseEstimator {
        PulseEstimator::new(&DetectionConfig::default())
    }

    /// Synthesize an optical pulse train at `bpm` sampled at `fs` Hz.
    fn feed_pulse(est: &mut PulseEstimator, bpm: f32, fs: f32, n: usize) {
        let freq = bpm / 60.0;
        for i in 0..n {
            let t = i as f32 / fs;
            let v = 10_000.0 + 2_000.0 * (2.0 * PI * freq * t).sin();
            est.push(v as u32, (t * 1000.0) as i64);
        }
    }

    #[test]
    fn test_insufficient_samples_yield_nothing() {
        let mut est = estimator();
        feed_pulse(&mut est, 60.0, 50.0, 50);
        assert_eq!(est.analyze(), PulseEstimate::default());
    }

    #[test]
    fn test_peak_estimate_tracks_rate() {
        let mut est = estimator();
        feed_pulse(&mut est, 72.0, 50.0, 400);
        let e = est.analyze();
        let bpm = e.peak_bpm.expect("peak estimate");
        assert!((bpm as i32 - 72).abs() <= 5, "peak bpm {bpm}");
    }

    #[test]
    fn test_spectral_estimate_tracks_rate() {
        let mut est = estimator();
        feed_pulse(&mut est, 90.0, 50.0, 512);
        let e = est.analyze();
        let bpm = e.spectral_bpm.expect("spectral estimate");
        assert!((bpm as i32 - 90).abs() <= 6, "spectral bpm {bpm}");
    }

    #[test]
    fn test_implausible_rates_rejected() {
        let mut est = estimator();
        // 250 bpm is above the plausibility band; both estimators stay empty.
        feed_pulse(&mut est, 250.0, 50.0, 512);
        let e = est.analyze();
        assert_eq!(e.peak_bpm, None);
        assert_eq!(e.spectral_bpm, None);
    }

    #[test]
    fn test_buffer_bounded_by_spectral_len() {
        let mut est = estimator();
        feed_pulse(&mut est, 60.0, 50.0, 2_000);
        assert_eq!(est.buffered(), 512);
    }
}
