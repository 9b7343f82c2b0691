//! Session lifecycle state machine.
//!
//! One pure transition function drives the whole lifecycle so it can be
//! tested without any device or network. State reflects audio activity;
//! turn finalization is handled by the transcript accumulator and is
//! deliberately not a state event.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    /// No live session; initial and terminal
    #[default]
    Idle,
    /// Capturing user speech
    Listening,
    /// The engine is waiting on tool results
    Thinking,
    /// Response audio is playing
    Speaking,
    /// Terminal failure; recovers to `Idle` via teardown
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::Listening => write!(f, "LISTENING"),
            SessionState::Thinking => write!(f, "THINKING"),
            SessionState::Speaking => write!(f, "SPEAKING"),
            SessionState::Error => write!(f, "ERROR"),
        }
    }
}

/// Events that can move the state machine.
#[derive(Debug, Clone)]
pub enum StateEvent {
    /// Devices acquired and the engine connection opened
    Started,
    /// First (or any further) model-speech transcript delta of a turn
    ModelSpeechDelta,
    /// The in-flight playback set became empty
    PlaybackDrained,
    /// A tool-invocation batch arrived
    ToolBatchReceived,
    /// Transport failure or abnormal connection close
    TransportFailed {
        /// Human-readable cause surfaced to the caller
        cause: String,
    },
    /// Explicit stop request, or automatic recovery after `Error`
    StopRequested,
}

/// Side effects the caller must run while applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Clear the conversation log and the tool-call log
    ResetLogs,
    /// Reset the playback start pointer
    ResetPlayback,
    /// Capture the failure cause for the caller
    RecordCause,
    /// Flush partial transcripts and release all owned resources
    Teardown,
}

/// Result of applying an event to a state.
#[derive(Debug)]
pub struct Step {
    /// State after the transition
    pub next: SessionState,
    /// Effects to run before the transition completes
    pub effects: &'static [Effect],
}

impl Step {
    const fn stay(state: SessionState) -> Self {
        Step {
            next: state,
            effects: &[],
        }
    }
}

/// Apply `event` to `current`, yielding the next state and its effects.
///
/// Unexpected combinations stay in place with no effects; an event arriving
/// for a session that is already down must be a no-op.
pub fn transition(current: SessionState, event: &StateEvent) -> Step {
    use SessionState::*;

    match (current, event) {
        (Idle, StateEvent::Started) => Step {
            next: Listening,
            effects: &[Effect::ResetLogs, Effect::ResetPlayback],
        },

        (Listening | Thinking | Speaking, StateEvent::ModelSpeechDelta) => Step {
            next: Speaking,
            effects: &[],
        },

        (Speaking, StateEvent::PlaybackDrained) => Step {
            next: Listening,
            effects: &[],
        },

        (Listening | Thinking | Speaking, StateEvent::ToolBatchReceived) => Step {
            next: Thinking,
            effects: &[],
        },

        (Listening | Thinking | Speaking, StateEvent::TransportFailed { .. }) => Step {
            next: Error,
            effects: &[Effect::RecordCause],
        },

        // Stopping an idle session is a no-op so repeated stops never run
        // teardown or flush twice.
        (Idle, StateEvent::StopRequested) => Step::stay(Idle),

        (Listening | Thinking | Speaking | Error, StateEvent::StopRequested) => Step {
            next: Idle,
            effects: &[Effect::Teardown],
        },

        (state, _) => Step::stay(state),
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    fn failed() -> StateEvent {
        StateEvent::TransportFailed {
            cause: "connection dropped".to_string(),
        }
    }

    #[test]
    fn test_start_enters_listening_with_resets() {
        let step = transition(Idle, &StateEvent::Started);
        assert_eq!(step.next, Listening);
        assert!(step.effects.contains(&Effect::ResetLogs));
        assert!(step.effects.contains(&Effect::ResetPlayback));
    }

    #[test]
    fn test_model_delta_enters_speaking() {
        assert_eq!(
            transition(Listening, &StateEvent::ModelSpeechDelta).next,
            Speaking
        );
        // After a tool round-trip the model speaks again.
        assert_eq!(
            transition(Thinking, &StateEvent::ModelSpeechDelta).next,
            Speaking
        );
        assert_eq!(
            transition(Speaking, &StateEvent::ModelSpeechDelta).next,
            Speaking
        );
    }

    #[test]
    fn test_drained_returns_to_listening() {
        assert_eq!(
            transition(Speaking, &StateEvent::PlaybackDrained).next,
            Listening
        );
        // Drain signals in other states change nothing.
        assert_eq!(
            transition(Listening, &StateEvent::PlaybackDrained).next,
            Listening
        );
    }

    #[test]
    fn test_tool_batch_enters_thinking_from_any_active_state() {
        for state in [Listening, Thinking, Speaking] {
            assert_eq!(
                transition(state, &StateEvent::ToolBatchReceived).next,
                Thinking
            );
        }
    }

    #[test]
    fn test_transport_failure_enters_error_then_idle() {
        for state in [Listening, Thinking, Speaking] {
            let step = transition(state, &failed());
            assert_eq!(step.next, Error);
            assert!(step.effects.contains(&Effect::RecordCause));
        }

        // Recovery after the error runs teardown on the way to Idle.
        let step = transition(Error, &StateEvent::StopRequested);
        assert_eq!(step.next, Idle);
        assert!(step.effects.contains(&Effect::Teardown));
    }

    #[test]
    fn test_stop_runs_teardown_once() {
        let step = transition(Listening, &StateEvent::StopRequested);
        assert_eq!(step.next, Idle);
        assert!(step.effects.contains(&Effect::Teardown));

        let again = transition(step.next, &StateEvent::StopRequested);
        assert_eq!(again.next, Idle);
        assert!(again.effects.is_empty());
    }

    #[test]
    fn test_events_ignored_when_down() {
        assert_eq!(transition(Idle, &StateEvent::ModelSpeechDelta).next, Idle);
        assert_eq!(transition(Idle, &failed()).next, Idle);
        assert_eq!(transition(Error, &StateEvent::ToolBatchReceived).next, Error);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(Idle.to_string(), "IDLE");
        assert_eq!(Speaking.to_string(), "SPEAKING");
    }
}
