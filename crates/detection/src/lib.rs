//! # Detection
//!
//! Frequency-domain analysis over decoded sample streams: dominant-axis
//! selection, windowed gait analysis with debounced walking confirmation and
//! fractional step accounting, and optical heart-rate estimation.
//!
//! The engine is a synchronous state machine. Samples are fed as they decode;
//! analysis runs on an external timer cadence (the orchestrator owns the
//! timers).

mod axis;
mod engine;
mod pulse;
mod ridge;
mod sample_buffer;
mod spectral;
mod walking;

pub use axis::{Axis, AxisVarianceTracker};
pub use engine::{DetectionEngine, DetectionSnapshot};
pub use pulse::{PulseEstimate, PulseEstimator};
pub use ridge::RidgeDetector;
pub use sample_buffer::CircularSampleBuffer;
pub use spectral::SpectralPeakDetector;
pub use walking::WalkingDetector;

/// One gait analysis window's verdict, produced by either strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitDecision {
    /// Dominant frequency found in the search band, Hz
    pub frequency_hz: f32,
    /// Normalized response magnitude at that frequency
    pub magnitude: f32,
    /// Raw per-window walking verdict (pre-debounce)
    pub walking: bool,
}
