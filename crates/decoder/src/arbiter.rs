//! Heart-rate source arbitration.
//!
//! Two independent estimates can coexist: the standard characteristic's bpm
//! and a bpm derived from beat-to-beat intervals. When the interval channel
//! is enabled the interval-derived value wins the display slot; both values
//! are retained so consumers can compare sources.

use contracts::DecodedSample;

/// Tracks the latest heart-rate estimate from each source and picks the one
/// to display.
#[derive(Debug)]
pub struct HeartRateArbiter {
    ppi_enabled: bool,
    standard_bpm: Option<u16>,
    interval_bpm: Option<u16>,
}

impl HeartRateArbiter {
    pub fn new(ppi_enabled: bool) -> Self {
        Self {
            ppi_enabled,
            standard_bpm: None,
            interval_bpm: None,
        }
    }

    /// Feed a decoded sample; non-heart-rate samples are ignored.
    pub fn observe(&mut self, sample: &DecodedSample) {
        match sample {
            DecodedSample::HeartRate { bpm } => self.standard_bpm = Some(*bpm),
            DecodedSample::RrInterval { ms } if *ms > 0 => {
                self.interval_bpm = Some(((60_000 + ms / 2) / ms) as u16);
            }
            _ => {}
        }
    }

    /// The value the pipeline should surface.
    pub fn displayed(&self) -> Option<u16> {
        if self.ppi_enabled {
            self.interval_bpm.or(self.standard_bpm)
        } else {
            self.standard_bpm
        }
    }

    /// Latest standard-characteristic estimate.
    pub fn standard(&self) -> Option<u16> {
        self.standard_bpm
    }

    /// Latest interval-derived estimate.
    pub fn interval_derived(&self) -> Option<u16> {
        self.interval_bpm
    }
}
