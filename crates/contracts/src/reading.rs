//! BufferedReading - Durable Buffer row shape
//!
//! A reading is a sparse union of channel values: samples from different
//! channels arriving within the merge window collapse into one row instead of
//! duplicating rows per channel.

use serde::{Deserialize, Serialize};

use crate::AxisTriple;

/// One sparse sensor row, pre-persistence.
///
/// Axis values are stored raw (unscaled), matching the decoder's wire
/// representation, so scaling can be revisited without a data migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferedReading {
    /// Capture timestamp, epoch milliseconds
    pub timestamp_ms: i64,

    /// Optical channel value (22-bit)
    pub ppg: Option<u32>,

    /// Accelerometer raw axes
    pub acc: Option<AxisTriple>,

    /// Gyroscope raw axes
    pub gyro: Option<AxisTriple>,
}

impl BufferedReading {
    /// Create an empty reading at a timestamp
    pub fn at(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    /// True if every channel slot is empty
    pub fn is_empty(&self) -> bool {
        self.ppg.is_none() && self.acc.is_none() && self.gyro.is_none()
    }
}

/// A reading as stored in the local row store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// Row id assigned by the store
    pub id: i64,

    /// The sparse channel values
    pub reading: BufferedReading,

    /// Whether this row has been uploaded to the remote store
    pub synced: bool,
}

/// Recording session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Heart-rate characteristic only (optionally + beat-interval channel)
    Standard,
    /// Proprietary channel streaming accelerometer + gyroscope + optical
    #[default]
    Raw,
}

impl SessionMode {
    /// Label used in the remote session record
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Standard => "standard",
            SessionMode::Raw => "raw",
        }
    }
}

/// Remote session record metadata, inferred up front from the full unsynced
/// set before the first batch is uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Device display name
    pub device_name: String,

    /// Recording mode
    pub mode: SessionMode,

    /// Whether interval-derived heart rate was enabled
    pub ppi_enabled: bool,

    /// Earliest unsynced capture timestamp, epoch milliseconds
    pub start_time_ms: i64,

    /// Latest unsynced capture timestamp, epoch milliseconds
    pub end_time_ms: i64,

    /// Number of rows the attempt will upload
    pub total_records: u64,
}
