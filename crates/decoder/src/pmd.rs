//! Proprietary measurement-data (PMD) frame decoding.
//!
//! Layout: byte 0 carries the measurement-type tag, bytes 1..=8 a device
//! tick counter this pipeline ignores, byte 9 the frame-type flag. Samples
//! follow from byte 10.
//!
//! Frame-type `0x81` means delta-compressed: the first sample is a
//! full-resolution anchor (three little-endian i16 axis values) and every
//! subsequent sample is three signed 8-bit deltas added to the preceding
//! absolute sample. Delta state is scoped to a single frame; each frame
//! re-establishes its own anchor.

use contracts::{AxisTriple, DecodedSample};
use tracing::{debug, warn};

/// Fixed PMD frame header length
pub const PMD_HEADER_LEN: usize = 10;

/// Offset of the frame-type flag within the frame
pub const FRAME_TYPE_OFFSET: usize = 9;

/// Frame-type value marking delta compression; anything else is raw
pub const FRAME_TYPE_DELTA: u8 = 0x81;

/// Optical samples are 22-bit values
pub const PPG_MASK: u32 = 0x3F_FFFF;

const TAG_PPG: u8 = 0x01;
const TAG_ACC: u8 = 0x02;
const TAG_PPI: u8 = 0x03;
const TAG_GYRO: u8 = 0x05;
const TAG_MAG: u8 = 0x06;

const BYTES_PER_TRIPLE: usize = 6;
const BYTES_PER_PPG: usize = 3;
const BYTES_PER_PPI: usize = 2;

/// Decode a PMD frame payload. Malformed input yields an empty vec.
pub fn decode(payload: &[u8]) -> Vec<DecodedSample> {
    if payload.len() < PMD_HEADER_LEN {
        warn!(len = payload.len(), "pmd frame shorter than header, dropped");
        metrics::counter!("decoder_frames_dropped_total", "reason" => "short").increment(1);
        return Vec::new();
    }

    let tag = payload[0];
    let delta = payload[FRAME_TYPE_OFFSET] == FRAME_TYPE_DELTA;
    let body = &payload[PMD_HEADER_LEN..];

    match tag {
        TAG_ACC => decode_triples(body, delta)
            .into_iter()
            .map(|raw| DecodedSample::Accel { raw })
            .collect(),
        TAG_GYRO => decode_triples(body, delta)
            .into_iter()
            .map(|raw| DecodedSample::Gyro { raw })
            .collect(),
        TAG_MAG => decode_triples(body, delta)
            .into_iter()
            .map(|raw| DecodedSample::Mag { raw })
            .collect(),
        TAG_PPG => decode_ppg(body),
        TAG_PPI => decode_ppi(body),
        other => {
            debug!(tag = other, "unknown pmd measurement tag, dropped");
            metrics::counter!("decoder_frames_dropped_total", "reason" => "unknown_tag")
                .increment(1);
            Vec::new()
        }
    }
}

/// Three-axis samples, raw or delta-compressed.
fn decode_triples(body: &[u8], delta: bool) -> Vec<AxisTriple> {
    if delta {
        decode_delta_triples(body)
    } else {
        decode_raw_triples(body)
    }
}

/// Raw frames: fixed-width 3x i16 LE per sample;
/// sample count = floor(body_len / 6).
fn decode_raw_triples(body: &[u8]) -> Vec<AxisTriple> {
    body.chunks_exact(BYTES_PER_TRIPLE)
        .map(|c| {
            AxisTriple::new(
                i16::from_le_bytes([c[0], c[1]]),
                i16::from_le_bytes([c[2], c[3]]),
                i16::from_le_bytes([c[4], c[5]]),
            )
        })
        .collect()
}

/// Delta frames: full-resolution anchor, then per-axis i8 deltas.
fn decode_delta_triples(body: &[u8]) -> Vec<AxisTriple> {
    if body.len() < BYTES_PER_TRIPLE {
        warn!(len = body.len(), "delta frame missing anchor sample, dropped");
        metrics::counter!("decoder_frames_dropped_total", "reason" => "short").increment(1);
        return Vec::new();
    }

    let mut x = i16::from_le_bytes([body[0], body[1]]);
    let mut y = i16::from_le_bytes([body[2], body[3]]);
    let mut z = i16::from_le_bytes([body[4], body[5]]);

    let mut out = Vec::with_capacity(1 + (body.len() - BYTES_PER_TRIPLE) / 3);
    out.push(AxisTriple::new(x, y, z));

    for d in body[BYTES_PER_TRIPLE..].chunks_exact(3) {
        x = x.wrapping_add(d[0] as i8 as i16);
        y = y.wrapping_add(d[1] as i8 as i16);
        z = z.wrapping_add(d[2] as i8 as i16);
        out.push(AxisTriple::new(x, y, z));
    }

    out
}

/// Optical samples: 3 bytes LE, masked to 22 bits; zero values are sensor
/// artifacts and are discarded.
fn decode_ppg(body: &[u8]) -> Vec<DecodedSample> {
    body.chunks_exact(BYTES_PER_PPG)
        .map(|c| (u32::from_le_bytes([c[0], c[1], c[2], 0])) & PPG_MASK)
        .filter(|&v| v != 0)
        .map(|value| DecodedSample::Ppg { value })
        .collect()
}

/// Beat-to-beat intervals: 2 bytes LE milliseconds; zeros discarded.
fn decode_ppi(body: &[u8]) -> Vec<DecodedSample> {
    body.chunks_exact(BYTES_PER_PPI)
        .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
        .filter(|&ms| ms != 0)
        .map(|ms| DecodedSample::RrInterval { ms })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8, frame_type: u8, body: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8; PMD_HEADER_LEN];
        payload[0] = tag;
        payload[FRAME_TYPE_OFFSET] = frame_type;
        payload.extend_from_slice(body);
        payload
    }

    fn triple_bytes(t: [i16; 3]) -> Vec<u8> {
        t.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_raw_gyro_sample_count() {
        let mut body = Vec::new();
        for i in 0..4 {
            body.extend(triple_bytes([i, i + 1, i + 2]));
        }
        // Trailing partial sample must be ignored.
        body.push(0xFF);
        let samples = decode(&frame(TAG_GYRO, 0x00, &body));
        assert_eq!(samples.len(), 4);
        assert_eq!(
            samples[2],
            DecodedSample::Gyro {
                raw: AxisTriple::new(2, 3, 4)
            }
        );
    }

    #[test]
    fn test_delta_reconstruction() {
        // anchor (100, -200, 300), then deltas
        let mut body = triple_bytes([100, -200, 300]);
        let deltas: [[i8; 3]; 3] = [[1, -2, 3], [-5, 5, 0], [127, -128, 10]];
        for d in deltas {
            body.extend(d.iter().map(|&v| v as u8));
        }
        let samples = decode(&frame(TAG_ACC, FRAME_TYPE_DELTA, &body));
        assert_eq!(samples.len(), 4);

        let expect = [
            AxisTriple::new(100, -200, 300),
            AxisTriple::new(101, -202, 303),
            AxisTriple::new(96, -197, 303),
            AxisTriple::new(223, -325, 313),
        ];
        for (sample, want) in samples.iter().zip(expect) {
            assert_eq!(*sample, DecodedSample::Accel { raw: want });
        }
    }

    #[test]
    fn test_delta_anchor_resets_per_frame() {
        let body_a = {
            let mut b = triple_bytes([10, 10, 10]);
            b.extend([5u8, 5, 5]);
            b
        };
        let body_b = {
            let mut b = triple_bytes([100, 100, 100]);
            b.extend([1u8, 1, 1]);
            b
        };
        let a = decode(&frame(TAG_GYRO, FRAME_TYPE_DELTA, &body_a));
        let b = decode(&frame(TAG_GYRO, FRAME_TYPE_DELTA, &body_b));
        // Frame B's first sample is its own anchor, unaffected by frame A.
        assert_eq!(
            b[0],
            DecodedSample::Gyro {
                raw: AxisTriple::new(100, 100, 100)
            }
        );
        assert_eq!(
            a[1],
            DecodedSample::Gyro {
                raw: AxisTriple::new(15, 15, 15)
            }
        );
    }

    #[test]
    fn test_ppg_mask_and_zero_discard() {
        // 0xFFFFFF masks to 0x3FFFFF; a zero sample is dropped.
        let body = [0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        let samples = decode(&frame(TAG_PPG, 0x00, &body));
        assert_eq!(
            samples,
            vec![
                DecodedSample::Ppg { value: 0x3F_FFFF },
                DecodedSample::Ppg { value: 1 },
            ]
        );
    }

    #[test]
    fn test_ppi_zero_discard() {
        let body = [0x00u8, 0x00, 0x20, 0x03]; // 0, 800
        let samples = decode(&frame(TAG_PPI, 0x00, &body));
        assert_eq!(samples, vec![DecodedSample::RrInterval { ms: 800 }]);
    }

    #[test]
    fn test_unknown_tag_dropped_without_error() {
        let samples = decode(&frame(0x7F, 0x00, &[1, 2, 3, 4, 5, 6]));
        assert!(samples.is_empty());
    }

    #[test]
    fn test_short_payload_dropped() {
        assert!(decode(&[0x02, 0x00, 0x00]).is_empty());
    }
}
