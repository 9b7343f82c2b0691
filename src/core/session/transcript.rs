//! Turn-based transcript reconciliation.
//!
//! The engine streams partial transcripts for both directions; this module
//! grows them in arrival order and flips them into finalized, append-only
//! conversation entries at a turn boundary or on teardown.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Speaker of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    /// The human speaking into the microphone
    User,
    /// The engine's synthesized reply
    Model,
}

impl fmt::Display for ConversationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationRole::User => write!(f, "user"),
            ConversationRole::Model => write!(f, "model"),
        }
    }
}

/// One finalized exchange entry. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Who spoke
    pub role: ConversationRole,
    /// What was said, trimmed
    pub text: String,
}

/// Accumulates partial transcripts and finalizes them into the shared
/// conversation log.
///
/// Deltas arrive strictly in order per the engine's stream discipline, so
/// accumulation is plain concatenation.
pub struct TranscriptAccumulator {
    user_partial: String,
    model_partial: String,
    log: Arc<RwLock<Vec<ConversationEntry>>>,
}

impl TranscriptAccumulator {
    /// Create an accumulator writing into `log`.
    pub fn new(log: Arc<RwLock<Vec<ConversationEntry>>>) -> Self {
        Self {
            user_partial: String::new(),
            model_partial: String::new(),
            log,
        }
    }

    /// Append a user-speech transcript delta.
    pub fn append_user(&mut self, delta: &str) {
        self.user_partial.push_str(delta);
    }

    /// Append a model-speech transcript delta.
    pub fn append_model(&mut self, delta: &str) {
        self.model_partial.push_str(delta);
    }

    /// Finalize the current turn: each non-empty buffer becomes one log
    /// entry (user first, then model), then both buffers reset.
    pub fn finalize_turn(&mut self) {
        let user = std::mem::take(&mut self.user_partial);
        let model = std::mem::take(&mut self.model_partial);

        let user = user.trim();
        let model = model.trim();
        if user.is_empty() && model.is_empty() {
            return;
        }

        let mut log = self.log.write();
        if !user.is_empty() {
            log.push(ConversationEntry {
                role: ConversationRole::User,
                text: user.to_string(),
            });
        }
        if !model.is_empty() {
            log.push(ConversationEntry {
                role: ConversationRole::Model,
                text: model.to_string(),
            });
        }
    }

    /// Finalize from a teardown path (stop, error, abnormal close) so
    /// in-progress speech is never silently discarded.
    pub fn flush_partial(&mut self) {
        if !self.user_partial.is_empty() || !self.model_partial.is_empty() {
            tracing::debug!("flushing partial transcripts at teardown");
        }
        self.finalize_turn();
    }
}
