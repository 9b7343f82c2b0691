//! Gapless playback scheduling.
//!
//! Response audio arrives as a stream of decoded segments on a producer
//! cadence independent of playback consumption. [`PlaybackScheduler`]
//! appends each segment back to back on the device timeline: a segment
//! starts exactly when the previous one ends, or immediately when the device
//! is idle. A segment that arrives after its computed start time produces an
//! audible gap; that is accepted rather than corrected.
//!
//! The in-flight set is owned by the scheduler and mutated only through
//! [`PlaybackScheduler::schedule_next`], [`PlaybackScheduler::complete`],
//! and [`PlaybackScheduler::stop_all`].

use std::collections::HashSet;

use super::AudioFrame;

/// Handle for a scheduled playback segment.
pub type SegmentId = u64;

/// Output-device seam for the scheduler.
///
/// `now` reads the device clock in seconds. Completion of a scheduled
/// segment is reported out of band (the device backend sends the segment id
/// over a channel once its last sample has played).
pub trait PlaybackSink: Send {
    /// Current reading of the playback clock, in seconds.
    fn now(&self) -> f64;

    /// Schedule `frame` to start playing at `start` seconds on the clock.
    fn play_at(&mut self, id: SegmentId, frame: AudioFrame, start: f64);

    /// Force-stop everything scheduled or playing. Teardown only.
    fn stop_all(&mut self);
}

/// Schedules decoded audio segments for gapless playback.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    next_start: f64,
    in_flight: HashSet<SegmentId>,
    next_id: SegmentId,
}

impl PlaybackScheduler {
    /// Create a scheduler over the given output sink.
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            next_start: 0.0,
            in_flight: HashSet::new(),
            next_id: 0,
        }
    }

    /// Schedule `frame` to start when the previous segment ends, or now if
    /// the device is idle.
    ///
    /// The start pointer is clamped forward to the device clock whenever it
    /// has drifted behind, so a segment is never scheduled in the past.
    pub fn schedule_next(&mut self, frame: AudioFrame) -> SegmentId {
        let id = self.next_id;
        self.next_id += 1;

        let start = self.next_start.max(self.sink.now());
        let duration = frame.duration_secs();
        self.sink.play_at(id, frame, start);
        self.next_start = start + duration;
        self.in_flight.insert(id);

        tracing::trace!(id, start, duration, "scheduled playback segment");
        id
    }

    /// Record that a segment finished playing.
    ///
    /// Returns true when this completion drained the in-flight set, which is
    /// the signal that the model has finished speaking.
    pub fn complete(&mut self, id: SegmentId) -> bool {
        self.in_flight.remove(&id) && self.in_flight.is_empty()
    }

    /// Number of segments currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// The clock position at which the next segment would start playing.
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Force-stop every in-flight segment, clear the set, and reset the
    /// start pointer. Used only during teardown.
    pub fn stop_all(&mut self) {
        self.sink.stop_all();
        self.in_flight.clear();
        self.next_start = 0.0;
    }
}

#[cfg(feature = "devices")]
pub use device::DeviceSink;

#[cfg(feature = "devices")]
mod device {
    use std::sync::Arc;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::super::{resample_linear, DeviceError};
    use super::{AudioFrame, PlaybackSink, SegmentId};

    /// See the capture-side twin: the stream handle is only held and dropped
    /// while the callback runs on cpal's thread.
    struct SendStream(#[allow(dead_code)] cpal::Stream);
    unsafe impl Send for SendStream {}

    struct ScheduledSegment {
        id: SegmentId,
        /// Absolute start position on the device clock, in samples.
        start: u64,
        /// Mono samples at the device rate.
        samples: Vec<f32>,
    }

    struct Timeline {
        /// Samples rendered so far; the device clock.
        clock: u64,
        segments: Vec<ScheduledSegment>,
        done_tx: mpsc::UnboundedSender<SegmentId>,
    }

    /// Output sink backed by the host's default output device.
    ///
    /// Keeps a sample-cursor timeline: the output callback renders silence
    /// plus whichever scheduled segments overlap the current buffer, then
    /// reports the ids of segments whose last sample has been rendered.
    pub struct DeviceSink {
        timeline: Arc<Mutex<Timeline>>,
        device_rate: u32,
        _stream: SendStream,
    }

    impl DeviceSink {
        /// Open the default output device. Completed segment ids are sent on
        /// `done_tx` from the device callback.
        pub fn open(done_tx: mpsc::UnboundedSender<SegmentId>) -> Result<Self, DeviceError> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(DeviceError::NoOutputDevice)?;
            let name = device.name().unwrap_or_else(|_| "unknown".into());

            let default_config = device
                .default_output_config()
                .map_err(|e| DeviceError::Configuration(e.to_string()))?;
            let device_rate = default_config.sample_rate().0;
            let channels = default_config.channels();

            let stream_config = cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(device_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let timeline = Arc::new(Mutex::new(Timeline {
                clock: 0,
                segments: Vec::new(),
                done_tx,
            }));
            let shared = Arc::clone(&timeline);
            let ch = channels as usize;

            let stream = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        data.fill(0.0);
                        let frames = data.len() / ch;
                        let mut tl = shared.lock();
                        let base = tl.clock;

                        let mut finished: Vec<SegmentId> = Vec::new();
                        for seg in tl.segments.iter() {
                            let buf_pos = seg.start.saturating_sub(base) as usize;
                            let seg_off = base.saturating_sub(seg.start) as usize;
                            for i in buf_pos..frames {
                                let idx = seg_off + (i - buf_pos);
                                if idx >= seg.samples.len() {
                                    break;
                                }
                                let value = seg.samples[idx];
                                for c in 0..ch {
                                    data[i * ch + c] += value;
                                }
                            }
                            if base + frames as u64 >= seg.start + seg.samples.len() as u64 {
                                finished.push(seg.id);
                            }
                        }

                        tl.segments.retain(|s| !finished.contains(&s.id));
                        for id in finished {
                            let _ = tl.done_tx.send(id);
                        }
                        tl.clock = base + frames as u64;
                    },
                    move |err| {
                        tracing::error!("audio output stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| DeviceError::Stream(e.to_string()))?;

            stream
                .play()
                .map_err(|e| DeviceError::Stream(e.to_string()))?;

            tracing::info!(device = %name, device_rate, channels, "playback device opened");

            Ok(Self {
                timeline,
                device_rate,
                _stream: SendStream(stream),
            })
        }
    }

    impl PlaybackSink for DeviceSink {
        fn now(&self) -> f64 {
            self.timeline.lock().clock as f64 / self.device_rate as f64
        }

        fn play_at(&mut self, id: SegmentId, frame: AudioFrame, start: f64) {
            let samples = if frame.sample_rate != self.device_rate {
                resample_linear(&frame.samples, frame.sample_rate, self.device_rate)
            } else {
                frame.samples
            };
            let start_sample = (start * self.device_rate as f64).round() as u64;
            self.timeline.lock().segments.push(ScheduledSegment {
                id,
                start: start_sample,
                samples,
            });
        }

        fn stop_all(&mut self) {
            self.timeline.lock().segments.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct SinkState {
        clock: f64,
        plays: Vec<(SegmentId, f64, f64)>,
        stopped: usize,
    }

    struct TestSink(Arc<Mutex<SinkState>>);

    impl PlaybackSink for TestSink {
        fn now(&self) -> f64 {
            self.0.lock().clock
        }
        fn play_at(&mut self, id: SegmentId, frame: AudioFrame, start: f64) {
            let duration = frame.duration_secs();
            self.0.lock().plays.push((id, start, duration));
        }
        fn stop_all(&mut self) {
            self.0.lock().stopped += 1;
        }
    }

    fn one_second_frame() -> AudioFrame {
        AudioFrame {
            samples: vec![0.0; 24000],
            sample_rate: 24000,
            channels: 1,
        }
    }

    fn harness() -> (PlaybackScheduler, Arc<Mutex<SinkState>>) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        let scheduler = PlaybackScheduler::new(Box::new(TestSink(state.clone())));
        (scheduler, state)
    }

    #[test]
    fn test_segments_never_overlap() {
        let (mut scheduler, state) = harness();
        for _ in 0..4 {
            scheduler.schedule_next(one_second_frame());
        }
        let plays = state.lock().plays.clone();
        for pair in plays.windows(2) {
            let (_, start_a, dur_a) = pair[0];
            let (_, start_b, _) = pair[1];
            assert!(start_b >= start_a + dur_a);
        }
    }

    #[test]
    fn test_gapless_when_timely() {
        let (mut scheduler, state) = harness();
        scheduler.schedule_next(one_second_frame());
        scheduler.schedule_next(one_second_frame());
        scheduler.schedule_next(one_second_frame());
        let plays = state.lock().plays.clone();
        assert_eq!(plays[0].1, 0.0);
        assert_eq!(plays[1].1, 1.0);
        assert_eq!(plays[2].1, 2.0);
    }

    #[test]
    fn test_late_arrival_clamps_to_clock() {
        let (mut scheduler, state) = harness();
        scheduler.schedule_next(one_second_frame());
        // Device clock runs well past the pointer before the next chunk
        // arrives; the pointer must not schedule into the past.
        state.lock().clock = 5.5;
        scheduler.schedule_next(one_second_frame());
        let plays = state.lock().plays.clone();
        assert_eq!(plays[1].1, 5.5);
        assert_eq!(scheduler.next_start(), 6.5);
    }

    #[test]
    fn test_complete_signals_drained_once() {
        let (mut scheduler, _state) = harness();
        let a = scheduler.schedule_next(one_second_frame());
        let b = scheduler.schedule_next(one_second_frame());
        assert_eq!(scheduler.in_flight(), 2);

        assert!(!scheduler.complete(a));
        assert!(scheduler.complete(b));
        assert_eq!(scheduler.in_flight(), 0);

        // Unknown or repeated ids never re-signal the drain.
        assert!(!scheduler.complete(b));
        assert!(!scheduler.complete(999));
    }

    #[test]
    fn test_stop_all_clears_and_resets() {
        let (mut scheduler, state) = harness();
        scheduler.schedule_next(one_second_frame());
        scheduler.schedule_next(one_second_frame());
        state.lock().clock = 0.25;

        scheduler.stop_all();
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(scheduler.next_start(), 0.0);
        assert_eq!(state.lock().stopped, 1);

        // After a reset the next segment starts at the device clock.
        scheduler.schedule_next(one_second_frame());
        let plays = state.lock().plays.clone();
        assert_eq!(plays.last().unwrap().1, 0.25);
    }
}
