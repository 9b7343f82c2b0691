//! Engine WebSocket client.
//!
//! Opens the duplex connection, sends the initial `setup` event, and spawns
//! a single connection task that pumps outbound events from a channel and
//! parses inbound events into [`EngineEvent`]s. Inbound events are delivered
//! in stream order; the session manager consumes them from one receiver so
//! processing stays serialized.
//!
//! There is no automatic reconnection: an abnormal close surfaces as
//! [`EngineEvent::Closed`] with its close code, and the caller decides
//! whether a new session may be started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use super::config::EngineConfig;
use super::messages::{ClientEvent, ServerEvent, SessionSetup};
use super::{ConnectionError, EngineEvent, EngineResult, ToolInvocation};

/// Channel capacity for outbound WebSocket events.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for inbound engine events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Close code reported when the peer sent no close frame at all.
const NO_CLOSE_FRAME_CODE: u16 = 1006;

/// A live engine connection.
///
/// Outbound sends go through a bounded channel so callers can fire and
/// forget with `try_send`; a full channel drops the event rather than
/// blocking the producer.
pub struct EngineClient {
    outbound_tx: mpsc::Sender<ClientEvent>,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl EngineClient {
    /// Open the connection described by `config` and send the initial
    /// `setup` event.
    ///
    /// Returns the client plus the inbound event receiver. The receiver
    /// yields events in stream order and always ends with either
    /// [`EngineEvent::Closed`] or [`EngineEvent::TransportError`].
    pub async fn connect(
        config: &EngineConfig,
    ) -> EngineResult<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let url = build_ws_url(config);
        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidConfiguration(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| ConnectionError::InvalidConfiguration(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| match connect_failure_is_auth(&e) {
                true => ConnectionError::Authentication(format!(
                    "engine rejected credentials: {e}; re-authentication may be required"
                )),
                false => ConnectionError::Failed(e.to_string()),
            })?;

        tracing::info!(endpoint = %config.endpoint, "connected to engine");

        let (mut ws_sink, mut ws_source) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientEvent>(OUTBOUND_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<EngineEvent>(EVENT_CHANNEL_CAPACITY);

        let connected = Arc::new(AtomicBool::new(true));
        let conn_flag = Arc::clone(&connected);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = outbound_rx.recv() => {
                        let Some(event) = maybe_event else {
                            // All senders dropped; close the stream politely.
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break;
                        };
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!("failed to serialize client event: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("failed to send engine event: {e}");
                            let _ = events_tx.send(EngineEvent::TransportError(e.to_string())).await;
                            break;
                        }
                    }

                    maybe_msg = ws_source.next() => {
                        match maybe_msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        if let Some(mapped) = map_server_event(event) {
                                            if events_tx.send(mapped).await.is_err() {
                                                break;
                                            }
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("failed to parse server event: {e} - {text}");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("failed to send pong: {e}");
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let (code, reason) = match frame {
                                    Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                                    None => (NO_CLOSE_FRAME_CODE, String::new()),
                                };
                                tracing::info!(code, %reason, "engine closed the connection");
                                let _ = events_tx.send(EngineEvent::Closed { code, reason }).await;
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!("websocket error: {e}");
                                let _ = events_tx.send(EngineEvent::TransportError(e.to_string())).await;
                                break;
                            }
                            None => {
                                let _ = events_tx.send(EngineEvent::Closed {
                                    code: NO_CLOSE_FRAME_CODE,
                                    reason: "connection dropped".to_string(),
                                }).await;
                                break;
                            }
                            _ => {}
                        }
                    }
                }
            }

            conn_flag.store(false, Ordering::SeqCst);
            tracing::debug!("engine connection task ended");
        });

        let client = Self {
            outbound_tx,
            connected,
            task: Some(task),
        };

        let setup = ClientEvent::Setup {
            session: build_session_setup(config),
        };
        client
            .outbound_tx
            .send(setup)
            .await
            .map_err(|e| ConnectionError::WebSocket(e.to_string()))?;

        Ok((client, events_rx))
    }

    /// A cloneable handle for sending events to the engine.
    pub fn sender(&self) -> mpsc::Sender<ClientEvent> {
        self.outbound_tx.clone()
    }

    /// Whether the connection task is still running.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Tear the connection down. Idempotent and best-effort.
    pub async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("engine connection closed");
    }
}

/// Build the connection URL, carrying the model as a query parameter.
fn build_ws_url(config: &EngineConfig) -> String {
    if config.model.is_empty() {
        config.endpoint.clone()
    } else {
        format!("{}?model={}", config.endpoint, config.model)
    }
}

/// Build the initial session setup from the connection config.
fn build_session_setup(config: &EngineConfig) -> SessionSetup {
    SessionSetup {
        response_modality: "audio".to_string(),
        voice: config.voice.clone(),
        system_instruction: config.instructions.clone(),
        tools: config.tools.clone(),
        input_transcription: config.transcribe_input,
        output_transcription: config.transcribe_output,
    }
}

/// Whether a handshake failure looks like rejected credentials.
fn connect_failure_is_auth(error: &tokio_tungstenite::tungstenite::Error) -> bool {
    let text = error.to_string();
    text.contains("401") || text.contains("403") || text.to_lowercase().contains("unauthorized")
}

/// Map a parsed wire event to the session-facing event, dropping events the
/// session has no use for.
fn map_server_event(event: ServerEvent) -> Option<EngineEvent> {
    match event {
        ServerEvent::InputTranscriptDelta { text } => Some(EngineEvent::UserTranscriptDelta(text)),
        ServerEvent::OutputTranscriptDelta { text } => Some(EngineEvent::ModelTranscriptDelta(text)),
        ServerEvent::AudioDelta { data } => Some(EngineEvent::AudioChunk(data)),
        ServerEvent::TurnComplete => Some(EngineEvent::TurnComplete),
        ServerEvent::ToolCall { invocations } => Some(EngineEvent::ToolInvocations(
            invocations
                .into_iter()
                .map(|inv| ToolInvocation {
                    id: inv.id,
                    name: inv.name,
                    arguments: inv.arguments,
                })
                .collect(),
        )),
        ServerEvent::Error { message } => Some(EngineEvent::TransportError(message)),
        ServerEvent::Unknown => {
            tracing::trace!("ignoring unrecognized server event");
            None
        }
    }
}
