//! DecodedSample - Decoder output
//!
//! Typed, scaled samples reconstructed from raw notification frames.

use serde::{Deserialize, Serialize};

/// Raw three-axis reading (little-endian signed 16-bit per axis on the wire).
///
/// Stored unscaled so the persistence layer keeps the wire representation;
/// scaling constants are applied through [`AxisTriple::scaled`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisTriple {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl AxisTriple {
    /// Create from raw axis values
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Empirical channel scale: raw / 1000 (g for accelerometer, deg/s for
    /// gyroscope). Must be preserved exactly for compatibility.
    pub fn scaled(&self) -> [f64; 3] {
        [
            self.x as f64 / 1000.0,
            self.y as f64 / 1000.0,
            self.z as f64 / 1000.0,
        ]
    }
}

/// One decoded sensor sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DecodedSample {
    /// Standard-channel heart rate (beats per minute)
    HeartRate { bpm: u16 },

    /// Beat-to-beat interval in milliseconds
    RrInterval { ms: u32 },

    /// Optical channel value, masked to 22 bits
    Ppg { value: u32 },

    /// Accelerometer reading (raw; scale /1000 -> g)
    Accel { raw: AxisTriple },

    /// Gyroscope reading (raw; scale /1000 -> deg/s)
    Gyro { raw: AxisTriple },

    /// Magnetometer reading (raw)
    Mag { raw: AxisTriple },
}

impl DecodedSample {
    /// Short channel label for logging and metrics
    pub fn channel(&self) -> &'static str {
        match self {
            DecodedSample::HeartRate { .. } => "hr",
            DecodedSample::RrInterval { .. } => "rr",
            DecodedSample::Ppg { .. } => "ppg",
            DecodedSample::Accel { .. } => "acc",
            DecodedSample::Gyro { .. } => "gyro",
            DecodedSample::Mag { .. } => "mag",
        }
    }
}

/// A decoded sample tagged with its decode-time capture timestamp.
///
/// The peripheral does not transmit wall-clock time; every sample in one
/// frame shares the frame's arrival timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    /// The decoded sample
    pub sample: DecodedSample,

    /// Capture timestamp, epoch milliseconds
    pub captured_at_ms: i64,
}

impl SampleEvent {
    /// Tag a sample with a capture timestamp
    pub fn new(sample: DecodedSample, captured_at_ms: i64) -> Self {
        Self {
            sample,
            captured_at_ms,
        }
    }
}
