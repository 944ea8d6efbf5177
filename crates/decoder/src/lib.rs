//! # Decoder
//!
//! Pure vendor-protocol decoding: raw notification frames to typed, scaled
//! samples.
//!
//! Runs synchronously on the notification delivery path and never propagates
//! an error past its boundary: malformed payloads are dropped with a logged
//! warning and the caller keeps processing the stream.

mod arbiter;
mod heart_rate;
mod pmd;

pub use arbiter::HeartRateArbiter;
pub use pmd::{FRAME_TYPE_DELTA, PMD_HEADER_LEN, PPG_MASK};

use contracts::{DecodedSample, NotifyChannel, RawFrame, SampleEvent};

/// Decode one raw frame into zero or more samples, each tagged with the
/// given capture timestamp.
///
/// Pure and non-blocking; safe to call from the notification path.
pub fn decode(frame: &RawFrame, captured_at_ms: i64) -> Vec<SampleEvent> {
    let samples = decode_samples(frame);
    samples
        .into_iter()
        .map(|s| SampleEvent::new(s, captured_at_ms))
        .collect()
}

/// Decode one raw frame into bare samples (no timestamp tagging).
pub fn decode_samples(frame: &RawFrame) -> Vec<DecodedSample> {
    match frame.channel {
        NotifyChannel::HeartRate => heart_rate::decode(&frame.payload),
        NotifyChannel::MeasurementData => pmd::decode(&frame.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::AxisTriple;

    #[test]
    fn test_decode_tags_capture_timestamp() {
        // flags=0x00, hr=80 (8-bit)
        let frame = RawFrame::new(NotifyChannel::HeartRate, Bytes::from(vec![0x00, 80]));
        let events = decode(&frame, 42);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].captured_at_ms, 42);
        assert_eq!(events[0].sample, DecodedSample::HeartRate { bpm: 80 });
    }

    #[test]
    fn test_decode_raw_accel_example() {
        // 10-byte header + 3 raw samples of 3x i16 LE each.
        let mut payload = vec![0u8; 10];
        payload[0] = 0x02; // accelerometer tag
        payload[9] = 0x00; // raw frame type
        for v in [
            [1000i16, -1000, 500],
            [1001, -999, 501],
            [1002, -998, 502],
        ] {
            for axis in v {
                payload.extend_from_slice(&axis.to_le_bytes());
            }
        }
        let frame = RawFrame::new(NotifyChannel::MeasurementData, Bytes::from(payload));
        let events = decode(&frame, 0);
        assert_eq!(events.len(), 3);
        match events[0].sample {
            DecodedSample::Accel { raw } => {
                assert_eq!(raw, AxisTriple::new(1000, -1000, 500));
                assert_eq!(raw.scaled(), [1.0, -1.0, 0.5]);
            }
            other => panic!("expected accel, got {other:?}"),
        }
    }
}
