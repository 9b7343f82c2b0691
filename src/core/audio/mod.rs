//! Audio primitives: frame types, wire codec, capture, and playback.
//!
//! Capture and playback run at independent sample rates (the engine expects
//! 16 kHz input and produces 24 kHz output); an [`AudioFrame`] always carries
//! the rate and channel count it was produced at so the two paths never mix.

pub mod capture;
pub mod codec;
pub mod playback;

use thiserror::Error;

pub use capture::{CaptureSource, FrameSink};
pub use codec::DecodeError;
pub use playback::{PlaybackScheduler, PlaybackSink, SegmentId};

#[cfg(feature = "devices")]
pub use capture::MicCapture;
#[cfg(feature = "devices")]
pub use playback::DeviceSink;

/// Errors raised while acquiring or driving an audio device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No input device is available on the host
    #[error("no input device available")]
    NoInputDevice,

    /// No output device is available on the host
    #[error("no output device available")]
    NoOutputDevice,

    /// The device rejected the requested configuration
    #[error("device configuration failed: {0}")]
    Configuration(String),

    /// The device stream could not be built or started
    #[error("device stream failed: {0}")]
    Stream(String),
}

/// An immutable chunk of normalized audio samples.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`, tagged with the rate and
/// channel count they were produced at.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Normalized samples, interleaved when `channels > 1`
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

impl AudioFrame {
    /// Duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Linear resampler between two rates.
///
/// Interpolation quality is sufficient for speech; both capture and playback
/// use it to bridge a device's native rate and the engine's fixed rates.
#[cfg(any(test, feature = "devices"))]
pub(crate) fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame {
            samples: vec![0.0; 24000],
            sample_rate: 24000,
            channels: 1,
        };
        assert!((frame.duration_secs() - 1.0).abs() < 1e-9);

        let stereo = AudioFrame {
            samples: vec![0.0; 48000],
            sample_rate: 24000,
            channels: 2,
        };
        assert!((stereo.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_duration_zero_rate() {
        let frame = AudioFrame {
            samples: vec![0.0; 100],
            sample_rate: 0,
            channels: 1,
        };
        assert_eq!(frame.duration_secs(), 0.0);
    }

    #[test]
    fn test_resample_identity() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16000, 16000), input);
    }

    #[test]
    fn test_resample_halves_length() {
        let input = vec![0.0; 320];
        let output = resample_linear(&input, 32000, 16000);
        assert_eq!(output.len(), 160);
    }
}
