//! Engine connection: a duplex WebSocket stream of audio and text events.
//!
//! The engine is an external collaborator. This module owns the transport
//! only: it serializes outbound [`messages::ClientEvent`]s, parses inbound
//! [`messages::ServerEvent`]s, and funnels them to the session as
//! [`EngineEvent`]s in stream order. Conversation state lives in the session
//! manager, never here.

pub mod client;
pub mod config;
pub mod messages;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::EngineClient;
pub use config::{
    EngineConfig, ToolDeclaration, CAPTURE_FRAME_SAMPLES, CAPTURE_SAMPLE_RATE, GRACEFUL_CLOSE_CODE,
    PLAYBACK_SAMPLE_RATE,
};
pub use messages::{ClientEvent, ServerEvent, SessionSetup};

/// Errors raised while opening or driving the engine connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection could not be established
    #[error("connection failed: {0}")]
    Failed(String),

    /// The engine rejected the credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The WebSocket transport failed
    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, ConnectionError>;

/// A tool invocation produced by the engine.
///
/// The `id` is opaque and must be echoed unchanged on the matching result;
/// the engine correlates by id, never by order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Opaque correlation id
    pub id: String,
    /// Tool name
    pub name: String,
    /// Argument map
    pub arguments: serde_json::Value,
}

/// Inbound engine events, delivered to the session in stream order.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Partial user-speech transcript text
    UserTranscriptDelta(String),

    /// Partial model-speech transcript text
    ModelTranscriptDelta(String),

    /// Base64-encoded synthesized audio chunk; decoding is the session's
    /// concern so a malformed chunk never kills the transport
    AudioChunk(String),

    /// The current exchange is finalized
    TurnComplete,

    /// Batch of tool invocations the engine is waiting on
    ToolInvocations(Vec<ToolInvocation>),

    /// Transport-level failure
    TransportError(String),

    /// The connection closed; code `1000` is the only graceful code
    Closed {
        /// WebSocket close code
        code: u16,
        /// Close reason, possibly empty
        reason: String,
    },
}
