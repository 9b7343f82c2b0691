//! Microphone capture.
//!
//! [`MicCapture`] owns the input device and a fixed-size framing buffer. Each
//! time the buffer fills it hands exactly one [`AudioFrame`] to the supplied
//! [`FrameSink`] and keeps no backlog: a frame is handed off or dropped,
//! never retried. A slow or failing sink must not stall the device callback,
//! so sinks are expected to be non-blocking (the session wires this to a
//! bounded `try_send`).

use std::sync::Arc;

use super::AudioFrame;

/// Non-blocking receiver for completed capture frames.
pub type FrameSink = Arc<dyn Fn(AudioFrame) + Send + Sync>;

/// A running capture device owned by a session.
pub trait CaptureSource: Send {
    /// Disconnect the device and release its handles. Idempotent.
    fn stop(&mut self);
}

#[cfg(feature = "devices")]
pub use device::MicCapture;

#[cfg(feature = "devices")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    use super::super::{resample_linear, DeviceError};
    use super::{AudioFrame, CaptureSource, FrameSink};

    /// `cpal::Stream` is `!Send` on some platforms due to internal raw
    /// pointers. The audio callback runs on cpal's own thread; the handle
    /// itself is only held and dropped.
    struct SendStream(#[allow(dead_code)] cpal::Stream);
    unsafe impl Send for SendStream {}

    /// Microphone capture backed by the host's default input device.
    ///
    /// Downmixes to mono and resamples the device's native rate to the
    /// requested capture rate, emitting fixed `frame_samples`-sized frames.
    pub struct MicCapture {
        stream: Option<SendStream>,
    }

    impl MicCapture {
        /// Open the default input device and start delivering frames to `sink`.
        pub fn start(
            sample_rate: u32,
            frame_samples: usize,
            sink: FrameSink,
        ) -> Result<Self, DeviceError> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or(DeviceError::NoInputDevice)?;
            let name = device.name().unwrap_or_else(|_| "unknown".into());

            let default_config = device
                .default_input_config()
                .map_err(|e| DeviceError::Configuration(e.to_string()))?;
            let native_rate = default_config.sample_rate().0;
            let channels = default_config.channels();

            let stream_config = cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(native_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let mut chunk_buf: Vec<f32> = Vec::with_capacity(frame_samples * 2);

            let stream = device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                        let mono = if channels > 1 {
                            let ch = channels as usize;
                            data.chunks_exact(ch)
                                .map(|frame| frame.iter().sum::<f32>() / ch as f32)
                                .collect::<Vec<f32>>()
                        } else {
                            data.to_vec()
                        };

                        let resampled = if native_rate != sample_rate {
                            resample_linear(&mono, native_rate, sample_rate)
                        } else {
                            mono
                        };

                        chunk_buf.extend_from_slice(&resampled);
                        while chunk_buf.len() >= frame_samples {
                            let samples: Vec<f32> = chunk_buf.drain(..frame_samples).collect();
                            sink(AudioFrame {
                                samples,
                                sample_rate,
                                channels: 1,
                            });
                        }
                    },
                    move |err| {
                        tracing::error!("audio input stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| DeviceError::Stream(e.to_string()))?;

            stream
                .play()
                .map_err(|e| DeviceError::Stream(e.to_string()))?;

            tracing::info!(
                device = %name,
                native_rate,
                channels,
                target_rate = sample_rate,
                frame_samples,
                "microphone capture started"
            );

            Ok(Self {
                stream: Some(SendStream(stream)),
            })
        }
    }

    impl CaptureSource for MicCapture {
        fn stop(&mut self) {
            if self.stream.take().is_some() {
                tracing::info!("microphone capture stopped");
            }
        }
    }
}
