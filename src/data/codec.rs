//! Transport codec: pairs of 12-bit samples packed into 3 bytes, then base64.
//!
//! ```text
//!  s1 = 0xABC, s2 = 0xDEF   →   0xAB 0xCD 0xEF
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::model::{RawMeasurement, TimeAnchor, MAX_SAMPLE};
use crate::error::{Error, Result};

/// Bytes per packed sample pair.
pub const BLOCK_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Byte packing
// ---------------------------------------------------------------------------

/// Pack samples into 3-byte blocks.
///
/// An odd trailing sample has no partner and is dropped; the caller gets
/// `len / 2 * 3` bytes back. Values above 12 bits are rejected.
pub fn pack(samples: &[u16]) -> Result<Vec<u8>> {
    if let Some((i, &s)) = samples.iter().enumerate().find(|(_, &s)| s > MAX_SAMPLE) {
        return Err(Error::Format(format!(
            "sample {i} = {s} does not fit in 12 bits"
        )));
    }
    if samples.len() % 2 == 1 {
        log::warn!(
            "odd sample count {}, dropping trailing sample from transport block",
            samples.len()
        );
    }

    let mut bytes = Vec::with_capacity(samples.len() / 2 * BLOCK_LEN);
    for pair in samples.chunks_exact(2) {
        let (s1, s2) = (pair[0], pair[1]);
        bytes.push((s1 >> 4) as u8);
        bytes.push((((s1 & 0xF) << 4) | ((s2 >> 8) & 0xF)) as u8);
        bytes.push((s2 & 0xFF) as u8);
    }
    Ok(bytes)
}

/// Inverse of [`pack`]. The byte count must be a multiple of [`BLOCK_LEN`].
pub fn unpack(bytes: &[u8]) -> Result<Vec<u16>> {
    if bytes.len() % BLOCK_LEN != 0 {
        return Err(Error::Format(format!(
            "decoded length {} is not a multiple of {BLOCK_LEN}",
            bytes.len()
        )));
    }

    let mut samples = Vec::with_capacity(bytes.len() / BLOCK_LEN * 2);
    for block in bytes.chunks_exact(BLOCK_LEN) {
        let (b0, b1, b2) = (block[0] as u16, block[1] as u16, block[2] as u16);
        samples.push((b0 << 4) | (b1 >> 4));
        samples.push(((b1 & 0xF) << 8) | b2);
    }
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Text transport
// ---------------------------------------------------------------------------

/// Encode samples as base64 transport text. Lossy for odd lengths, see [`pack`].
pub fn encode(samples: &[u16]) -> Result<String> {
    Ok(BASE64.encode(pack(samples)?))
}

/// Decode transport text into samples. ASCII whitespace (line breaks from
/// serial or stdin transfer) is ignored.
pub fn decode_samples(text: &str) -> Result<Vec<u16>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| Error::Format(format!("invalid base64: {e}")))?;
    unpack(&bytes)
}

/// Decode transport text into a measurement anchored at a known start or stop time.
pub fn decode(text: &str, sample_rate: f64, anchor: TimeAnchor) -> Result<RawMeasurement> {
    let samples = decode_samples(text)?;
    RawMeasurement::new(samples, sample_rate, anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn packs_reference_pair_bit_exact() {
        assert_eq!(pack(&[0x123, 0x456]).unwrap(), vec![0x12, 0x34, 0x56]);
        assert_eq!(unpack(&[0x12, 0x34, 0x56]).unwrap(), vec![0x123, 0x456]);
    }

    #[test]
    fn round_trips_full_range_through_base64() {
        let samples: Vec<u16> = (0..=MAX_SAMPLE).rev().step_by(7).chain([0, 4095]).collect();
        let samples = &samples[..samples.len() / 2 * 2];
        let text = encode(samples).unwrap();
        assert_eq!(decode_samples(&text).unwrap(), samples);
    }

    #[test]
    fn odd_length_drops_trailing_sample() {
        let text = encode(&[1, 2, 3]).unwrap();
        assert_eq!(decode_samples(&text).unwrap(), vec![1, 2]);
    }

    #[test]
    fn rejects_values_wider_than_12_bits() {
        assert!(matches!(pack(&[0x1000, 0]), Err(Error::Format(_))));
    }

    #[test]
    fn rejects_partial_block() {
        let text = BASE64.encode([0x12u8, 0x34, 0x56, 0x78]);
        assert!(matches!(decode_samples(&text), Err(Error::Format(_))));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(decode_samples("not*base64!"), Err(Error::Format(_))));
    }

    #[test]
    fn ignores_line_breaks_in_transport_text() {
        let text = encode(&[0x123, 0x456, 0xFFF, 0x000]).unwrap();
        let wrapped = format!("{}\n{}\r\n", &text[..4], &text[4..]);
        assert_eq!(
            decode_samples(&wrapped).unwrap(),
            vec![0x123, 0x456, 0xFFF, 0x000]
        );
    }

    #[test]
    fn decode_derives_start_from_stop_time() {
        let stop = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 10).unwrap();
        let text = encode(&vec![2048; 10_000]).unwrap();
        let m = decode(&text, 5000.0, TimeAnchor::Stop(stop)).unwrap();
        assert_eq!(m.len(), 10_000);
        assert_eq!(m.started_at(), stop - Duration::seconds(2));
    }

    #[test]
    fn decode_rejects_non_positive_sample_rate() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let text = encode(&[1, 2]).unwrap();
        assert!(decode(&text, 0.0, TimeAnchor::Start(start)).is_err());
    }
}
