//! Wire framing for engine audio: normalized `f32` samples to and from
//! base64-encoded PCM 16-bit signed little-endian.
//!
//! Encoding is total: out-of-range samples clamp to the nearest representable
//! bound and NaN encodes as silence. Decoding fails with [`DecodeError`] on
//! malformed base64 or a byte count that is not a multiple of the sample
//! width; the caller drops the offending chunk and continues.

use base64::prelude::*;
use bytes::Bytes;
use thiserror::Error;

use super::AudioFrame;

/// Width of one PCM sample in bytes.
const SAMPLE_WIDTH: usize = 2;

/// Errors raised while decoding an inbound audio payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was not valid base64
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded byte count does not divide into whole samples
    #[error("truncated PCM payload: {len} bytes is not a multiple of the sample width")]
    Truncated {
        /// Length of the truncated payload
        len: usize,
    },
}

/// Encode normalized samples as base64 PCM16-LE.
pub fn encode_frame(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * SAMPLE_WIDTH);
    for &sample in samples {
        let clamped = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(-1.0, 1.0)
        };
        let value = (clamped * 32767.0).round() as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    BASE64_STANDARD.encode(&bytes)
}

/// Decode a base64 wire payload into raw PCM bytes.
pub fn decode_wire(data: &str) -> Result<Bytes, DecodeError> {
    Ok(Bytes::from(BASE64_STANDARD.decode(data)?))
}

/// Convert raw PCM16-LE bytes into a normalized frame at the declared rate
/// and channel count.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioFrame, DecodeError> {
    if bytes.len() % SAMPLE_WIDTH != 0 {
        return Err(DecodeError::Truncated { len: bytes.len() });
    }
    let mut samples = Vec::with_capacity(bytes.len() / SAMPLE_WIDTH);
    for chunk in bytes.chunks_exact(SAMPLE_WIDTH) {
        let value = i16::from_le_bytes([chunk[0], chunk[1]]);
        samples.push(value as f32 / 32768.0);
    }
    Ok(AudioFrame {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_samples() {
        // 0.0 -> 0x0000, 1.0 -> 0x7FFF, -1.0 -> 0x8001, little-endian
        let encoded = encode_frame(&[0.0, 1.0, -1.0]);
        assert_eq!(encoded, "AAD/fwGA");
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode_frame(&[]), "");
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let over = encode_frame(&[2.0]);
        let one = encode_frame(&[1.0]);
        assert_eq!(over, one);

        let under = encode_frame(&[-3.5]);
        let neg_one = encode_frame(&[-1.0]);
        assert_eq!(under, neg_one);
    }

    #[test]
    fn test_encode_nan_is_silence() {
        assert_eq!(encode_frame(&[f32::NAN]), encode_frame(&[0.0]));
    }

    #[test]
    fn test_decode_roundtrip() {
        let input = vec![0.0, 0.25, -0.25, 0.5, -0.99];
        let wire = encode_frame(&input);
        let bytes = decode_wire(&wire).unwrap();
        let frame = decode_pcm16(&bytes, 24000, 1).unwrap();
        assert_eq!(frame.sample_rate, 24000);
        assert_eq!(frame.channels, 1);
        assert_eq!(frame.samples.len(), input.len());
        for (a, b) in input.iter().zip(frame.samples.iter()) {
            assert!((a - b).abs() < 1.0 / 32000.0, "{a} vs {b}");
        }
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        assert!(matches!(
            decode_wire("not base64!!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_pcm() {
        let err = decode_pcm16(&[0x00, 0x01, 0x02], 24000, 1).unwrap_err();
        match err {
            DecodeError::Truncated { len } => assert_eq!(len, 3),
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_pcm16_values() {
        let bytes = [0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80];
        let frame = decode_pcm16(&bytes, 24000, 1).unwrap();
        assert_eq!(frame.samples[0], 0.0);
        assert!((frame.samples[1] - 32767.0 / 32768.0).abs() < 1e-6);
        assert_eq!(frame.samples[2], -1.0);
    }
}
