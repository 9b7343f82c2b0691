pub mod audio;
pub mod engine;
pub mod session;

// Re-export commonly used types for convenience
pub use audio::{
    AudioFrame, CaptureSource, DecodeError, DeviceError, FrameSink, PlaybackScheduler,
    PlaybackSink, SegmentId,
};

pub use engine::{
    ClientEvent, ConnectionError, EngineClient, EngineConfig, EngineEvent, EngineResult,
    ServerEvent, SessionSetup, ToolDeclaration, ToolInvocation, CAPTURE_FRAME_SAMPLES,
    CAPTURE_SAMPLE_RATE, GRACEFUL_CLOSE_CODE, PLAYBACK_SAMPLE_RATE,
};

pub use session::{
    ConversationEntry, ConversationRole, ExecutorError, SessionError, SessionManager,
    SessionParts, SessionResult, SessionState, ToolCallRecord, ToolExecutor,
    TranscriptAccumulator,
};

#[cfg(feature = "devices")]
pub use audio::{DeviceSink, MicCapture};
