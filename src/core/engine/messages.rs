//! Engine WebSocket message types.
//!
//! All events are JSON-encoded and `type`-tagged.
//!
//! Client events (sent to the engine):
//! - `setup` - Open the session with audio mode, voice, instructions, tools
//! - `input_audio.append` - Append one captured audio frame
//! - `tool.response` - Return a tool result, correlated by invocation id
//!
//! Server events (received from the engine):
//! - `input_transcript.delta` - Partial user-speech transcript
//! - `output_transcript.delta` - Partial model-speech transcript
//! - `audio.delta` - Base64-encoded synthesized audio chunk
//! - `turn.complete` - The current exchange is finalized
//! - `tool.call` - Batch of tool invocations the engine is waiting on
//! - `error` - Engine-reported failure

use serde::{Deserialize, Serialize};

use super::config::ToolDeclaration;

// =============================================================================
// Setup
// =============================================================================

/// Session configuration carried by the `setup` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSetup {
    /// Response modality; always "audio" for a voice session
    pub response_modality: String,

    /// Voice identifier for synthesized audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Tool catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,

    /// Request incremental transcription of user speech
    pub input_transcription: bool,

    /// Request incremental transcription of model speech
    pub output_transcription: bool,
}

// =============================================================================
// Client Events (sent to the engine)
// =============================================================================

/// Events sent to the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Open the session
    #[serde(rename = "setup")]
    Setup {
        /// Session configuration
        session: SessionSetup,
    },

    /// Append one captured audio frame
    #[serde(rename = "input_audio.append")]
    InputAudioAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
    },

    /// Return a tool result to the engine
    #[serde(rename = "tool.response")]
    ToolResponse {
        /// Invocation id, echoed unchanged
        id: String,
        /// Tool name
        name: String,
        /// Result payload
        response: serde_json::Value,
    },
}

// =============================================================================
// Server Events (received from the engine)
// =============================================================================

/// One tool invocation within a `tool.call` batch.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolInvocationWire {
    /// Opaque invocation id used for correlation
    pub id: String,
    /// Tool name
    pub name: String,
    /// Argument map
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Events received from the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Partial user-speech transcript
    #[serde(rename = "input_transcript.delta")]
    InputTranscriptDelta {
        /// Transcript delta, appended in arrival order
        text: String,
    },

    /// Partial model-speech transcript
    #[serde(rename = "output_transcript.delta")]
    OutputTranscriptDelta {
        /// Transcript delta, appended in arrival order
        text: String,
    },

    /// Synthesized audio chunk
    #[serde(rename = "audio.delta")]
    AudioDelta {
        /// Base64-encoded PCM16 audio
        data: String,
    },

    /// The current exchange is finalized
    #[serde(rename = "turn.complete")]
    TurnComplete,

    /// Batch of tool invocations
    #[serde(rename = "tool.call")]
    ToolCall {
        /// Invocations, each dispatched independently
        invocations: Vec<ToolInvocationWire>,
    },

    /// Engine-reported failure
    #[serde(rename = "error")]
    Error {
        /// Failure description
        message: String,
    },

    /// Unrecognized event type, ignored for forward compatibility
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_names() {
        let event = ClientEvent::InputAudioAppend {
            audio: "AAAA".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "input_audio.append");
        assert_eq!(json["audio"], "AAAA");

        let event = ClientEvent::ToolResponse {
            id: "call-1".to_string(),
            name: "get_schedule".to_string(),
            response: serde_json::json!({"ok": true}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool.response");
        assert_eq!(json["id"], "call-1");
        assert_eq!(json["response"]["ok"], true);
    }

    #[test]
    fn test_setup_omits_empty_fields() {
        let event = ClientEvent::Setup {
            session: SessionSetup {
                response_modality: "audio".to_string(),
                voice: None,
                system_instruction: None,
                tools: Vec::new(),
                input_transcription: true,
                output_transcription: true,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "setup");
        assert!(json["session"].get("voice").is_none());
        assert!(json["session"].get("tools").is_none());
    }

    #[test]
    fn test_parse_transcript_deltas() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"input_transcript.delta","text":"hello "}"#).unwrap();
        assert!(matches!(
            event,
            ServerEvent::InputTranscriptDelta { ref text } if text == "hello "
        ));

        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"output_transcript.delta","text":"hi"}"#).unwrap();
        assert!(matches!(event, ServerEvent::OutputTranscriptDelta { .. }));
    }

    #[test]
    fn test_parse_turn_complete() {
        let event: ServerEvent = serde_json::from_str(r#"{"type":"turn.complete"}"#).unwrap();
        assert!(matches!(event, ServerEvent::TurnComplete));
    }

    #[test]
    fn test_parse_tool_call_batch() {
        let raw = r#"{
            "type": "tool.call",
            "invocations": [
                {"id": "a", "name": "get_claim", "arguments": {"claimId": "CL-1001"}},
                {"id": "b", "name": "list_tasks"}
            ]
        }"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::ToolCall { invocations } => {
                assert_eq!(invocations.len(), 2);
                assert_eq!(invocations[0].id, "a");
                assert_eq!(invocations[0].arguments["claimId"], "CL-1001");
                assert_eq!(invocations[1].id, "b");
                assert!(invocations[1].arguments.is_null());
            }
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_tolerated() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"usage.report","tokens":12}"#).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }
}
