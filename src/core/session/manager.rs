//! Session orchestration.
//!
//! A [`SessionManager`] owns exactly one live conversation. All inbound
//! engine events, capture frames, playback completions, and tool outcomes
//! are funneled into a single spawned task and processed in order, so no
//! shared state is ever touched from two activities at once; only raw
//! device I/O runs on platform threads.
//!
//! Teardown order is fixed: stop accepting capture frames, close the engine
//! connection, stop the capture device, force-stop in-flight playback, then
//! release the playback sink. Partial transcripts are flushed before any
//! resource is released, so in-progress speech survives every exit path.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::audio::capture::{CaptureSource, FrameSink};
use crate::core::audio::codec;
use crate::core::audio::playback::{PlaybackScheduler, SegmentId};
use crate::core::audio::AudioFrame;
use crate::core::engine::client::EngineClient;
use crate::core::engine::messages::ClientEvent;
use crate::core::engine::{EngineEvent, GRACEFUL_CLOSE_CODE, PLAYBACK_SAMPLE_RATE};

use super::state::{transition, Effect, SessionState, StateEvent};
use super::tools::{ToolCallRecord, ToolCallRouter, ToolExecutor, ToolResult};
use super::transcript::{ConversationEntry, TranscriptAccumulator};
#[cfg(feature = "devices")]
use super::SessionResult;

/// Capacity of the signal channel feeding the session loop. Capture frames
/// arrive a few times per second; a full queue drops the frame.
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Inputs multiplexed by the session event loop.
enum SessionSignal {
    /// One captured audio frame, uploaded fire-and-forget
    Frame(AudioFrame),
    /// Stop request; acknowledged once teardown has finished
    Stop(oneshot::Sender<()>),
}

/// Everything a session loop needs besides its signal channel.
///
/// Built from real devices and a live [`EngineClient`] by
/// [`SessionManager::start`], or from bare channels and a test sink by
/// integration tests.
pub struct SessionParts {
    /// Inbound engine events, in stream order
    pub engine_rx: mpsc::Receiver<EngineEvent>,
    /// Outbound engine events
    pub engine_tx: mpsc::Sender<ClientEvent>,
    /// The connection itself, when the session owns one
    pub engine: Option<EngineClient>,
    /// Playback scheduler over the output sink
    pub playback: PlaybackScheduler,
    /// Completion ids reported by the output sink
    pub playback_done_rx: mpsc::UnboundedReceiver<SegmentId>,
    /// The capture device, when the session owns one
    pub capture: Option<Box<dyn CaptureSource>>,
    /// External tool executor
    pub executor: Arc<dyn ToolExecutor>,
}

/// Handle to one live conversation session.
///
/// The presentation layer reads state and log snapshots through this handle;
/// everything else happens inside the session task.
pub struct SessionManager {
    session_id: Uuid,
    state: Arc<RwLock<SessionState>>,
    cause: Arc<RwLock<Option<String>>>,
    conversation: Arc<RwLock<Vec<ConversationEntry>>>,
    tool_calls: Arc<RwLock<Vec<ToolCallRecord>>>,
    signals_tx: mpsc::Sender<SessionSignal>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Acquire the capture device, open the engine connection, acquire the
    /// playback device, and start the session loop.
    ///
    /// Any device or connection failure releases whatever was already
    /// acquired and is fatal to the start; no session is left behind.
    #[cfg(feature = "devices")]
    pub async fn start(
        config: crate::core::engine::EngineConfig,
        executor: Arc<dyn ToolExecutor>,
    ) -> SessionResult<Self> {
        use crate::core::audio::{DeviceSink, MicCapture};
        use crate::core::engine::{CAPTURE_FRAME_SAMPLES, CAPTURE_SAMPLE_RATE};

        let (signals_tx, signals_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        let frame_tx = signals_tx.clone();
        let sink: FrameSink = Arc::new(move |frame| {
            // A full queue drops the frame rather than stalling capture.
            let _ = frame_tx.try_send(SessionSignal::Frame(frame));
        });
        let mut capture = MicCapture::start(CAPTURE_SAMPLE_RATE, CAPTURE_FRAME_SAMPLES, sink)?;

        let (client, engine_rx) = match EngineClient::connect(&config).await {
            Ok(pair) => pair,
            Err(e) => {
                capture.stop();
                return Err(e.into());
            }
        };

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let device_sink = match DeviceSink::open(done_tx) {
            Ok(sink) => sink,
            Err(e) => {
                capture.stop();
                let mut client = client;
                client.close().await;
                return Err(e.into());
            }
        };

        let engine_tx = client.sender();
        Ok(Self::spawn(
            SessionParts {
                engine_rx,
                engine_tx,
                engine: Some(client),
                playback: PlaybackScheduler::new(Box::new(device_sink)),
                playback_done_rx: done_rx,
                capture: Some(Box::new(capture)),
                executor,
            },
            signals_tx,
            signals_rx,
        ))
    }

    /// Start a session over pre-built parts. Used by tests and by callers
    /// that manage their own devices.
    pub fn start_with(parts: SessionParts) -> Self {
        let (signals_tx, signals_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        Self::spawn(parts, signals_tx, signals_rx)
    }

    fn spawn(
        parts: SessionParts,
        signals_tx: mpsc::Sender<SessionSignal>,
        signals_rx: mpsc::Receiver<SessionSignal>,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let state = Arc::new(RwLock::new(SessionState::Idle));
        let cause = Arc::new(RwLock::new(None));
        let conversation: Arc<RwLock<Vec<ConversationEntry>>> = Arc::new(RwLock::new(Vec::new()));
        let tool_calls: Arc<RwLock<Vec<ToolCallRecord>>> = Arc::new(RwLock::new(Vec::new()));

        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        let session_loop = SessionLoop {
            state: Arc::clone(&state),
            cause: Arc::clone(&cause),
            conversation: Arc::clone(&conversation),
            tool_calls: Arc::clone(&tool_calls),
            accumulator: TranscriptAccumulator::new(Arc::clone(&conversation)),
            router: ToolCallRouter::new(parts.executor, Arc::clone(&tool_calls), outcomes_tx),
            playback: Some(parts.playback),
            playback_done_rx: parts.playback_done_rx,
            engine: parts.engine,
            engine_tx: parts.engine_tx,
            engine_rx: parts.engine_rx,
            capture: parts.capture,
            signals_rx,
            outcomes_rx,
            accepting_frames: true,
        };

        let span = tracing::info_span!("session", id = %session_id);
        let task = tokio::spawn(session_loop.run().instrument(span));

        Self {
            session_id,
            state,
            cause,
            conversation,
            tool_calls,
            signals_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Identifier of this session, for log correlation.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// A sink that feeds capture frames into this session. Frames are
    /// dropped, never queued, once the session is gone or busy.
    pub fn frame_sink(&self) -> FrameSink {
        let tx = self.signals_tx.clone();
        Arc::new(move |frame| {
            let _ = tx.try_send(SessionSignal::Frame(frame));
        })
    }

    /// Stop the session, running full teardown. Safe to call repeatedly;
    /// a second stop is a no-op.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .signals_tx
            .send(SessionSignal::Stop(ack_tx))
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Human-readable cause of the most recent failure, if any.
    pub fn error_cause(&self) -> Option<String> {
        self.cause.read().clone()
    }

    /// Snapshot of the append-only conversation log.
    pub fn conversation(&self) -> Vec<ConversationEntry> {
        self.conversation.read().clone()
    }

    /// Snapshot of the tool-call log. Entries transition from pending to
    /// resolved in place.
    pub fn tool_calls(&self) -> Vec<ToolCallRecord> {
        self.tool_calls.read().clone()
    }
}

/// State owned by the session task. Everything here is mutated from one
/// place only: the `run` loop.
struct SessionLoop {
    state: Arc<RwLock<SessionState>>,
    cause: Arc<RwLock<Option<String>>>,
    conversation: Arc<RwLock<Vec<ConversationEntry>>>,
    tool_calls: Arc<RwLock<Vec<ToolCallRecord>>>,
    accumulator: TranscriptAccumulator,
    router: ToolCallRouter,
    playback: Option<PlaybackScheduler>,
    playback_done_rx: mpsc::UnboundedReceiver<SegmentId>,
    engine: Option<EngineClient>,
    engine_tx: mpsc::Sender<ClientEvent>,
    engine_rx: mpsc::Receiver<EngineEvent>,
    capture: Option<Box<dyn CaptureSource>>,
    signals_rx: mpsc::Receiver<SessionSignal>,
    outcomes_rx: mpsc::UnboundedReceiver<ToolResult>,
    accepting_frames: bool,
}

impl SessionLoop {
    async fn run(mut self) {
        self.apply(StateEvent::Started).await;

        loop {
            tokio::select! {
                maybe_signal = self.signals_rx.recv() => match maybe_signal {
                    Some(SessionSignal::Frame(frame)) => self.send_frame(frame),
                    Some(SessionSignal::Stop(ack)) => {
                        self.apply(StateEvent::StopRequested).await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        // The manager handle is gone; shut down cleanly.
                        self.apply(StateEvent::StopRequested).await;
                        break;
                    }
                },

                maybe_event = self.engine_rx.recv() => match maybe_event {
                    Some(event) => {
                        if self.handle_engine_event(event).await {
                            break;
                        }
                    }
                    None => {
                        self.fail("engine event stream ended unexpectedly".to_string()).await;
                        break;
                    }
                },

                Some(id) = self.playback_done_rx.recv() => {
                    let drained = self.playback.as_mut().is_some_and(|p| p.complete(id));
                    if drained {
                        self.apply(StateEvent::PlaybackDrained).await;
                    }
                },

                Some(result) = self.outcomes_rx.recv() => self.handle_tool_outcome(result),
            }
        }

        tracing::debug!("session event loop ended");
    }

    /// Process one inbound engine event. Returns true when the session is
    /// finished and the loop should exit.
    async fn handle_engine_event(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::UserTranscriptDelta(text) => {
                self.accumulator.append_user(&text);
                false
            }

            EngineEvent::ModelTranscriptDelta(text) => {
                self.accumulator.append_model(&text);
                self.apply(StateEvent::ModelSpeechDelta).await;
                false
            }

            EngineEvent::AudioChunk(data) => {
                self.schedule_audio(&data);
                false
            }

            EngineEvent::TurnComplete => {
                self.accumulator.finalize_turn();
                false
            }

            EngineEvent::ToolInvocations(batch) => {
                self.apply(StateEvent::ToolBatchReceived).await;
                for invocation in batch {
                    self.router.dispatch(invocation);
                }
                false
            }

            EngineEvent::TransportError(message) => {
                self.fail(message).await;
                true
            }

            EngineEvent::Closed { code, reason } => {
                if code == GRACEFUL_CLOSE_CODE {
                    tracing::info!("engine closed the session gracefully");
                    self.apply(StateEvent::StopRequested).await;
                } else {
                    let mut text = format!("connection closed abnormally (code {code})");
                    if !reason.is_empty() {
                        text.push_str(": ");
                        text.push_str(&reason);
                    }
                    self.fail(text).await;
                }
                true
            }
        }
    }

    /// Decode an inbound audio chunk and append it to the playback
    /// timeline. A malformed chunk is dropped; the session continues.
    fn schedule_audio(&mut self, data: &str) {
        let Some(playback) = self.playback.as_mut() else {
            return;
        };
        let decoded = codec::decode_wire(data)
            .and_then(|bytes| codec::decode_pcm16(&bytes, PLAYBACK_SAMPLE_RATE, 1));
        match decoded {
            Ok(frame) => {
                playback.schedule_next(frame);
            }
            Err(e) => {
                tracing::warn!("dropping undecodable audio chunk: {e}");
            }
        }
    }

    /// Upload one capture frame, fire-and-forget.
    fn send_frame(&mut self, frame: AudioFrame) {
        if !self.accepting_frames {
            return;
        }
        let event = ClientEvent::InputAudioAppend {
            audio: codec::encode_frame(&frame.samples),
        };
        if let Err(e) = self.engine_tx.try_send(event) {
            tracing::debug!("dropping capture frame: {e}");
        }
    }

    /// Attach a resolved tool outcome to its log record and answer the
    /// engine, correlated by the originating invocation id.
    fn handle_tool_outcome(&mut self, result: ToolResult) {
        let Some(name) = self.router.resolve(&result) else {
            tracing::warn!(id = %result.id, "tool result does not match a pending invocation");
            return;
        };
        let event = ClientEvent::ToolResponse {
            id: result.id,
            name,
            response: result.payload,
        };
        if let Err(e) = self.engine_tx.try_send(event) {
            tracing::warn!("failed to send tool response: {e}");
        }
    }

    /// Record the failure, enter `Error`, then recover to `Idle` through
    /// teardown.
    async fn fail(&mut self, cause: String) {
        let cause = if auth_shaped(&cause) {
            format!("{cause}; re-authentication may be required")
        } else {
            cause
        };
        tracing::error!(%cause, "session failed");
        self.apply(StateEvent::TransportFailed { cause }).await;
        self.apply(StateEvent::StopRequested).await;
    }

    /// Apply one state-machine event, running its effects before the
    /// transition completes.
    async fn apply(&mut self, event: StateEvent) {
        let current = *self.state.read();
        let step = transition(current, &event);

        for effect in step.effects {
            match effect {
                Effect::ResetLogs => {
                    self.conversation.write().clear();
                    self.tool_calls.write().clear();
                }
                Effect::ResetPlayback => {
                    if let Some(playback) = self.playback.as_mut() {
                        playback.stop_all();
                    }
                }
                Effect::RecordCause => {
                    if let StateEvent::TransportFailed { cause } = &event {
                        *self.cause.write() = Some(cause.clone());
                    }
                }
                Effect::Teardown => self.teardown().await,
            }
        }

        if step.next != current {
            tracing::info!(from = %current, to = %step.next, "session state transition");
        }
        *self.state.write() = step.next;
    }

    /// Release everything the session owns, in a fixed order, attempting
    /// every step even when an earlier one has already failed.
    async fn teardown(&mut self) {
        tracing::debug!("session teardown started");

        // In-progress speech is flushed before any resource is released.
        self.accumulator.flush_partial();

        self.accepting_frames = false;

        if let Some(mut engine) = self.engine.take() {
            engine.close().await;
        }

        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }

        // Force-stop in-flight segments, then drop the sink to release the
        // output device.
        if let Some(mut playback) = self.playback.take() {
            playback.stop_all();
        }

        tracing::debug!("session teardown finished");
    }
}

/// Whether a failure message looks like rejected or expired credentials.
fn auth_shaped(cause: &str) -> bool {
    let lower = cause.to_lowercase();
    cause.contains("401")
        || cause.contains("403")
        || cause.contains("1008")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("api key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_shaped_detection() {
        assert!(auth_shaped("HTTP error: 401 Unauthorized"));
        assert!(auth_shaped("connection closed abnormally (code 1008)"));
        assert!(auth_shaped("invalid API key"));
        assert!(!auth_shaped("connection closed abnormally (code 1006)"));
        assert!(!auth_shaped("network unreachable"));
    }
}
