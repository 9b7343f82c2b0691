//! Session layer: lifecycle state machine, transcript reconciliation, tool
//! routing, and the manager that orchestrates them against the engine's
//! event stream.

pub mod manager;
pub mod state;
pub mod tools;
pub mod transcript;

use thiserror::Error;

use crate::core::audio::{DecodeError, DeviceError};
use crate::core::engine::ConnectionError;

pub use manager::{SessionManager, SessionParts};
pub use state::{transition, Effect, SessionState, StateEvent, Step};
pub use tools::{ExecutorError, ToolCallRecord, ToolCallRouter, ToolExecutor, ToolResult};
pub use transcript::{ConversationEntry, ConversationRole, TranscriptAccumulator};

/// Session-level error taxonomy.
///
/// Device and connection errors terminate the session; decode and executor
/// errors are contained where they occur and never surface here.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A capture or playback device was unavailable or denied
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The engine connection failed to open or dropped abnormally
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A malformed inbound audio payload
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A tool executor failure
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
