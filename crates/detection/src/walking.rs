//! Debounced walking confirmation and fractional step accounting.
//!
//! Each analysis window yields a raw walking verdict; the externally visible
//! confirmed flag only flips after `frames_to_confirm` consecutive agreeing
//! windows. A single dissenting window resets the opposing streak. Steps
//! accumulate fractionally while both the raw and confirmed flags agree.

use tracing::debug;

use contracts::DetectionConfig;

use crate::GaitDecision;

#[derive(Debug)]
pub struct WalkingDetector {
    frames_to_confirm: u32,
    min_cadence_hz: f32,
    max_cadence_hz: f32,
    /// Elapsed-time cap per window, seconds
    max_elapsed_s: f64,

    is_walking: bool,
    consecutive_walking: u32,
    consecutive_stationary: u32,
    is_confirmed: bool,
    cadence_hz: f32,
    step_accumulator: f64,
    last_decision_ms: Option<i64>,
}

impl WalkingDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            frames_to_confirm: config.frames_to_confirm,
            min_cadence_hz: config.min_cadence_hz,
            max_cadence_hz: config.max_cadence_hz,
            max_elapsed_s: config.analysis_interval_ms as f64 / 1000.0,
            is_walking: false,
            consecutive_walking: 0,
            consecutive_stationary: 0,
            is_confirmed: false,
            cadence_hz: 0.0,
            step_accumulator: 0.0,
            last_decision_ms: None,
        }
    }

    /// Apply one window's verdict at wall-clock time `now_ms`.
    pub fn update(&mut self, decision: GaitDecision, now_ms: i64) {
        self.is_walking = decision.walking;

        if decision.walking {
            self.consecutive_walking += 1;
            self.consecutive_stationary = 0;
            if !self.is_confirmed && self.consecutive_walking >= self.frames_to_confirm {
                self.is_confirmed = true;
                debug!(cadence_hz = decision.frequency_hz, "walking confirmed");
            }
        } else {
            self.consecutive_stationary += 1;
            self.consecutive_walking = 0;
            if self.is_confirmed && self.consecutive_stationary >= self.frames_to_confirm {
                self.is_confirmed = false;
                debug!(steps = self.step_count(), "walking ended");
            }
        }

        if self.is_confirmed && self.is_walking {
            self.cadence_hz = decision
                .frequency_hz
                .clamp(self.min_cadence_hz, self.max_cadence_hz);

            // Elapsed wall-clock time, capped at one analysis interval so a
            // stalled timer cannot mint steps.
            let elapsed_s = match self.last_decision_ms {
                Some(prev) => ((now_ms - prev).max(0) as f64 / 1000.0).min(self.max_elapsed_s),
                None => self.max_elapsed_s,
            };
            self.step_accumulator += self.cadence_hz as f64 * elapsed_s;
            metrics::gauge!("detection_step_count").set(self.step_count() as f64);
        }

        self.last_decision_ms = Some(now_ms);
    }

    pub fn is_walking(&self) -> bool {
        self.is_walking
    }

    pub fn is_confirmed_walking(&self) -> bool {
        self.is_confirmed
    }

    pub fn cadence_hz(&self) -> f32 {
        self.cadence_hz
    }

    /// Displayed step count: the rounded accumulator.
    pub fn step_count(&self) -> u64 {
        self.step_accumulator.round() as u64
    }

    /// Clear transient state after a link drop; accumulated steps survive.
    pub fn reset_session(&mut self) {
        self.is_walking = false;
        self.consecutive_walking = 0;
        self.consecutive_stationary = 0;
        self.is_confirmed = false;
        self.last_decision_ms = None;
    }
}
