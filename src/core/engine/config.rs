//! Engine connection configuration.
//!
//! The engine consumes PCM16 microphone audio at 16 kHz and replies with
//! PCM16 audio at 24 kHz; the two rates are independent and never mixed.

use serde::{Deserialize, Serialize};

use super::{ConnectionError, EngineResult};

/// Sample rate the engine expects for captured audio, in Hz.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Samples per captured frame.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;

/// Sample rate of synthesized response audio, in Hz.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// The only WebSocket close code treated as a graceful shutdown.
pub const GRACEFUL_CLOSE_CODE: u16 = 1000;

/// Declaration of one invokable tool, announced to the engine at setup.
///
/// This is the flat per-action catalog shape; a consolidated per-domain
/// catalog with an `action` discriminator is an equally valid external
/// configuration and needs no support from this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for the argument map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDeclaration {
    /// Convenience constructor for a declaration with a parameter schema.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters: Some(parameters),
        }
    }
}

/// Configuration for opening an engine connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// WebSocket endpoint (`ws://` or `wss://`)
    pub endpoint: String,

    /// API key sent as a bearer token
    pub api_key: String,

    /// Model identifier, appended to the endpoint as a query parameter
    #[serde(default)]
    pub model: String,

    /// Voice identifier for synthesized audio
    #[serde(default)]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,

    /// Tool catalog announced at setup
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,

    /// Request incremental transcription of user speech
    #[serde(default = "default_true")]
    pub transcribe_input: bool,

    /// Request incremental transcription of model speech
    #[serde(default = "default_true")]
    pub transcribe_output: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: String::new(),
            voice: None,
            instructions: None,
            tools: Vec::new(),
            transcribe_input: true,
            transcribe_output: true,
        }
    }
}

impl EngineConfig {
    /// Create a configuration for the given endpoint and key.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Validate the endpoint URL and credentials.
    pub fn validate(&self) -> EngineResult<()> {
        if self.api_key.is_empty() {
            return Err(ConnectionError::Authentication(
                "API key is required".to_string(),
            ));
        }
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| ConnectionError::InvalidConfiguration(format!("bad endpoint: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(ConnectionError::InvalidConfiguration(format!(
                "unsupported endpoint scheme: {other}"
            ))),
        }
    }
}
