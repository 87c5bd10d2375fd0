//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::contact::EmergencyContact;
use crate::controller::{ControllerStatus, GateState, ListeningError, TriggerUpdate};
use crate::cycle::CycleState;
use crate::events::StateEvent;
use crate::lexicon::TriggerWord;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to state event notifications
    Subscribe,

    /// Switch the voice trigger feature
    SetFeature { enabled: bool },

    /// Switch listening
    SetListening { enabled: bool },

    /// Replace the emergency contact snapshot
    SelectContact { contact: EmergencyContact },

    /// The UI navigated away from the voice trigger screen
    FocusLost,

    /// Add a trigger word
    AddTrigger { word: String },

    /// Remove a trigger word
    RemoveTrigger { word: String },
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// Gate state after a toggle
    Gate {
        feature_enabled: bool,
        listening: bool,
    },

    /// Lexicon after an edit
    Triggers {
        words: Vec<TriggerWord>,
        changed: bool,
    },

    /// Request accepted with nothing to report
    Ok,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<GateState> for Response {
    fn from(gate: GateState) -> Self {
        Response::Gate {
            feature_enabled: gate.feature_enabled(),
            listening: gate.listening(),
        }
    }
}

impl From<TriggerUpdate> for Response {
    fn from(update: TriggerUpdate) -> Self {
        Response::Triggers {
            words: update.words,
            changed: update.changed,
        }
    }
}

impl From<ListeningError> for Response {
    fn from(e: ListeningError) -> Self {
        Response::error(e.code(), e.to_string())
    }
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// State event occurred
    Event { event: StateEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub feature_enabled: bool,

    pub listening: bool,

    /// Current analysis cycle phase
    pub cycle: CycleState,

    pub contact: Option<EmergencyContact>,

    pub trigger_words: Vec<TriggerWord>,

    /// Whether an alert is being sent
    pub escalating: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl From<ControllerStatus> for DaemonStatus {
    fn from(status: ControllerStatus) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            feature_enabled: status.feature_enabled,
            listening: status.listening,
            cycle: status.cycle,
            contact: status.contact,
            trigger_words: status.trigger_words,
            escalating: status.escalating,
            uptime_secs: status.uptime_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetListening { enabled: true };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_listening"));
        assert!(json.contains("true"));
    }

    #[test]
    fn test_select_contact_deserialization() {
        let json = r#"{"type":"select_contact","contact":{"id":"1","name":"Alice","phone":"555"}}"#;
        match serde_json::from_str::<Request>(json).unwrap() {
            Request::SelectContact { contact } => assert_eq!(contact.name(), "Alice"),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_listening_error_response() {
        let resp = Response::from(ListeningError::MissingContact);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("missing_contact"));
    }

    #[test]
    fn test_status_serialization() {
        let status = DaemonStatus::from(ControllerStatus {
            feature_enabled: true,
            listening: false,
            cycle: CycleState::Idle,
            contact: None,
            trigger_words: vec![TriggerWord::parse("help").unwrap()],
            escalating: false,
            uptime_secs: 3,
        });
        let json = serde_json::to_string(&Response::Status(status)).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""cycle":"idle""#));
        assert!(json.contains(r#""trigger_words":["help"]"#));
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::Event {
            event: StateEvent::EscalationStarted,
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("escalation_started"));
    }
}
