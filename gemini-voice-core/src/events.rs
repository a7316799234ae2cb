//! Events broadcast by a running session.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `UtteranceEvent` | `SessionController::subscribe_transcripts` |
//! | `TurnEvent` | `SessionController::subscribe_turns` |
//! | `SessionStatusEvent` | `SessionController::subscribe_status` |

use serde::{Deserialize, Serialize};

use crate::engine::state::SessionState;
use crate::transcript::Role;

/// A finished utterance for one speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnEventKind {
    /// The service finished its response turn.
    Complete,
    /// The service cut its response short (the user spoke over it).
    Interrupted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEvent {
    pub seq: u64,
    pub kind: TurnEventKind,
}

/// Emitted on every session state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionState,
    /// Optional human-readable detail (e.g. the fatal error).
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utterance_event_serializes_with_lowercase_role() {
        let event = UtteranceEvent {
            seq: 3,
            role: Role::Assistant,
            text: "Hi.".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["text"], "Hi.");
    }

    #[test]
    fn status_event_uses_camel_case_state() {
        let event = SessionStatusEvent {
            status: SessionState::AwaitingSetupAck,
            detail: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "awaitingSetupAck");
        assert!(json["detail"].is_null());
    }
}
