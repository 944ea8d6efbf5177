//! Standard heart-rate characteristic decoding.
//!
//! Byte 0 is a flags byte: bit 0 selects 16-bit vs 8-bit heart-rate value,
//! bit 4 marks trailing beat-to-beat interval fields. Intervals arrive in
//! 1/1024-second units and are converted to rounded milliseconds.

use contracts::DecodedSample;
use tracing::warn;

const FLAG_HR_16BIT: u8 = 0x01;
const FLAG_RR_PRESENT: u8 = 0x10;

pub fn decode(payload: &[u8]) -> Vec<DecodedSample> {
    if payload.len() < 2 {
        warn!(len = payload.len(), "heart-rate payload too short, dropped");
        metrics::counter!("decoder_frames_dropped_total", "reason" => "short").increment(1);
        return Vec::new();
    }

    let flags = payload[0];
    let mut out = Vec::new();
    let mut offset = 1usize;

    let bpm = if flags & FLAG_HR_16BIT != 0 {
        if payload.len() < 3 {
            warn!("heart-rate payload truncated at 16-bit value, dropped");
            metrics::counter!("decoder_frames_dropped_total", "reason" => "short").increment(1);
            return Vec::new();
        }
        offset += 2;
        u16::from_le_bytes([payload[1], payload[2]])
    } else {
        offset += 1;
        payload[1] as u16
    };
    out.push(DecodedSample::HeartRate { bpm });

    if flags & FLAG_RR_PRESENT != 0 {
        for c in payload[offset..].chunks_exact(2) {
            let raw = u16::from_le_bytes([c[0], c[1]]) as u32;
            if raw == 0 {
                continue;
            }
            out.push(DecodedSample::RrInterval {
                ms: rr_to_ms(raw),
            });
        }
    }

    out
}

/// 1/1024-second units to rounded milliseconds.
fn rr_to_ms(raw: u32) -> u32 {
    (raw * 1000 + 512) / 1024
}
