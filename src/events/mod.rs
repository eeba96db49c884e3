//! Events module for translation run status
//!
//! Every run reports what happened to it on a broadcast channel; the IPC
//! server forwards these to subscribed clients and the log records them.

use serde::{Deserialize, Serialize};

/// Status events emitted by the orchestrator and the hotkey binder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A trigger was admitted and a run began
    RunStarted { run_id: u64 },

    /// The selection was replaced with the translation
    Replaced {
        run_id: u64,
        /// Wall time of the whole run
        duration_ms: u64,
        /// Length of the pasted translation in characters
        chars: usize,
    },

    /// The selection was empty or whitespace; nothing was sent
    NothingSelected { run_id: u64 },

    /// The copy keystroke or the selection read failed
    CaptureFailed { run_id: u64, reason: String },

    /// The remote call failed or timed out
    TranslationFailed { run_id: u64, reason: String },

    /// Writing the result or pasting it failed
    ReplaceFailed { run_id: u64, reason: String },

    /// A trigger arrived while another run was active and was ignored
    RunDropped,

    /// The global hotkey now listens for a different combination
    BindingChanged { hotkey: String },
}

impl RunEvent {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunEvent::CaptureFailed { .. }
                | RunEvent::TranslationFailed { .. }
                | RunEvent::ReplaceFailed { .. }
        )
    }
}

impl std::fmt::Display for RunEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunEvent::RunStarted { run_id } => write!(f, "RUN_STARTED #{}", run_id),
            RunEvent::Replaced {
                run_id,
                duration_ms,
                chars,
            } => write!(f, "REPLACED #{} ({} chars, {}ms)", run_id, chars, duration_ms),
            RunEvent::NothingSelected { run_id } => write!(f, "NOTHING_SELECTED #{}", run_id),
            RunEvent::CaptureFailed { run_id, reason } => {
                write!(f, "CAPTURE_FAILED #{}: {}", run_id, reason)
            }
            RunEvent::TranslationFailed { run_id, reason } => {
                write!(f, "TRANSLATION_FAILED #{}: {}", run_id, reason)
            }
            RunEvent::ReplaceFailed { run_id, reason } => {
                write!(f, "REPLACE_FAILED #{}: {}", run_id, reason)
            }
            RunEvent::RunDropped => write!(f, "RUN_DROPPED"),
            RunEvent::BindingChanged { hotkey } => write!(f, "BINDING_CHANGED ({})", hotkey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RunEvent::Replaced {
            run_id: 3,
            duration_ms: 1500,
            chars: 5,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"replaced\""));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"binding_changed","hotkey":"alt+z"}"#;
        let event: RunEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            RunEvent::BindingChanged {
                hotkey: "alt+z".to_string()
            }
        );
    }

    #[test]
    fn test_failure_classification() {
        assert!(RunEvent::TranslationFailed {
            run_id: 1,
            reason: "timeout".into()
        }
        .is_failure());
        assert!(!RunEvent::NothingSelected { run_id: 1 }.is_failure());
        assert_eq!(RunEvent::RunDropped.to_string(), "RUN_DROPPED");
    }
}
