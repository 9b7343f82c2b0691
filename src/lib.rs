//! Live bidirectional voice session core.
//!
//! `voicebridge` manages one live conversation against a remote
//! conversational engine: it streams microphone audio out over a duplex
//! WebSocket, schedules the streamed synthesized reply for gapless
//! playback, reconciles incremental transcripts into a turn-based
//! conversation log, and routes tool invocations to an external executor
//! with id-based correlation.
//!
//! The engine, the tool catalog's business logic, and all presentation are
//! external collaborators. The presentation layer consumes read-only
//! snapshots of the conversation log, the tool-call log, and the session
//! state.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voicebridge::{EngineConfig, SessionManager, ToolDeclaration};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = EngineConfig::new("wss://engine.example/v1/live", api_key);
//!     config.voice = Some("aria".to_string());
//!     config.instructions = Some(SYSTEM_INSTRUCTION.to_string());
//!     config.tools = tool_catalog();
//!
//!     let session = SessionManager::start(config, Arc::new(MyExecutor)).await?;
//!
//!     // ... render session.conversation() / session.tool_calls() ...
//!
//!     session.stop().await;
//!     Ok(())
//! }
//! ```

pub mod core;

// Re-export commonly used items for convenience
pub use core::audio::{AudioFrame, DecodeError, DeviceError, PlaybackScheduler, PlaybackSink};
pub use core::engine::{
    ConnectionError, EngineClient, EngineConfig, EngineEvent, ToolDeclaration, ToolInvocation,
};
pub use core::session::{
    ConversationEntry, ConversationRole, ExecutorError, SessionError, SessionManager,
    SessionParts, SessionResult, SessionState, ToolCallRecord, ToolExecutor,
};
