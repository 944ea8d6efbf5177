//! Detection engine: wires the shared scaffold (axis selection, circular
//! buffer, debounce) to the configured gait strategy and the pulse
//! estimators.

use tracing::instrument;

use contracts::{DecodedSample, DetectionConfig, GaitStrategy, SampleEvent};

use crate::{
    AxisVarianceTracker, CircularSampleBuffer, GaitDecision, PulseEstimate, PulseEstimator,
    RidgeDetector, SpectralPeakDetector, WalkingDetector,
};

enum Strategy {
    Spectral(SpectralPeakDetector),
    Ridge(RidgeDetector),
}

impl Strategy {
    fn analyze(&mut self, samples: &[f32], sample_rate_hz: f32) -> GaitDecision {
        match self {
            Strategy::Spectral(s) => s.analyze(samples, sample_rate_hz),
            Strategy::Ridge(r) => r.analyze(samples, sample_rate_hz),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Strategy::Spectral(_) => "spectral_peak",
            Strategy::Ridge(_) => "wavelet_ridge",
        }
    }
}

/// Read-only view of the engine's current state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSnapshot {
    pub is_walking: bool,
    pub is_confirmed_walking: bool,
    pub cadence_hz: f32,
    pub step_count: u64,
    pub pulse: PulseEstimate,
    pub motion_samples_buffered: usize,
    pub optical_samples_buffered: usize,
}

pub struct DetectionEngine {
    sample_rate_hz: f32,
    axis: AxisVarianceTracker,
    motion: CircularSampleBuffer,
    strategy: Strategy,
    walking: WalkingDetector,
    pulse: PulseEstimator,
}

impl std::fmt::Debug for DetectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionEngine")
            .field("strategy", &self.strategy.label())
            .field("motion_buffered", &self.motion.len())
            .finish_non_exhaustive()
    }
}

impl DetectionEngine {
    pub fn new(config: &DetectionConfig) -> Self {
        let strategy = match config.strategy {
            GaitStrategy::SpectralPeak => Strategy::Spectral(SpectralPeakDetector::new(config)),
            GaitStrategy::WaveletRidge => Strategy::Ridge(RidgeDetector::new(config)),
        };
        Self {
            sample_rate_hz: config.sample_rate_hz,
            axis: AxisVarianceTracker::new(),
            motion: CircularSampleBuffer::for_window(config.sample_rate_hz, config.window_seconds),
            strategy,
            walking: WalkingDetector::new(config),
            pulse: PulseEstimator::new(config),
        }
    }

    /// Feed one decoded sample. Gyroscope samples drive gait analysis,
    /// optical samples drive pulse estimation; everything else is ignored.
    pub fn observe(&mut self, event: &SampleEvent) {
        match event.sample {
            DecodedSample::Gyro { raw } => {
                let scalar = self.axis.push_triple(raw);
                self.motion.push(scalar);
            }
            DecodedSample::Ppg { value } => {
                self.pulse.push(value, event.captured_at_ms);
            }
            _ => {}
        }
    }

    /// One analysis tick. Gait analysis only runs once the motion buffer has
    /// filled; pulse estimators gate on their own sample minimums.
    #[instrument(skip(self), fields(strategy = self.strategy.label()))]
    pub fn analyze(&mut self, now_ms: i64) {
        if self.motion.is_filled() {
            let window = self.motion.snapshot();
            let decision = self.strategy.analyze(&window, self.sample_rate_hz);
            self.walking.update(decision, now_ms);
            metrics::counter!("detection_windows_total", "strategy" => self.strategy.label())
                .increment(1);
        }
        self.pulse.analyze();
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        DetectionSnapshot {
            is_walking: self.walking.is_walking(),
            is_confirmed_walking: self.walking.is_confirmed_walking(),
            cadence_hz: self.walking.cadence_hz(),
            step_count: self.walking.step_count(),
            pulse: self.pulse.estimate(),
            motion_samples_buffered: self.motion.len(),
            optical_samples_buffered: self.pulse.buffered(),
        }
    }

    /// Clear per-session transients after a link drop. The step accumulator
    /// survives; raw buffers and debounce streaks do not.
    pub fn reset_session(&mut self) {
        self.motion.clear();
        self.pulse.clear();
        self.walking.reset_session();
    }
}
