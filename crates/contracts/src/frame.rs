//! RawFrame - Link layer output
//!
//! One notification payload from a subscribed characteristic, consumed once
//! by the decoder.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Subscribed notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    /// Standard heart-rate measurement characteristic
    HeartRate,
    /// Proprietary measurement-data characteristic (multiplexed channels)
    MeasurementData,
}

impl NotifyChannel {
    /// Short label for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyChannel::HeartRate => "heart_rate",
            NotifyChannel::MeasurementData => "measurement_data",
        }
    }
}

/// Raw notification frame
///
/// Immutable; the payload is zero-copy shared with the link layer.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Channel the notification arrived on
    pub channel: NotifyChannel,

    /// Raw payload bytes
    pub payload: Bytes,
}

impl RawFrame {
    /// Create a new frame
    pub fn new(channel: NotifyChannel, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}
