//! Wire envelope shared by every request, response, and event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event emitted when the instrumented application registers with
/// the relay server after a successful login.
pub const APP_CONNECTED: &str = "appConnected";

/// Event carrying a crash/termination report from the application.
pub const APP_WILL_TERMINATE_WITH_ERROR: &str = "AppWillTerminateWithError";

/// Event signalling the application stopped responding to actions.
pub const APP_NONRESPONSIVE_DETECTED: &str = "AppNonresponsiveDetected";

/// Server-originated event for message-ID bookkeeping; clients never
/// assign IDs below zero themselves.
pub const APP_WILL_TERMINATE_WITH_ERROR_ID: i64 = -10000;

/// See [`APP_NONRESPONSIVE_DETECTED`].
pub const APP_NONRESPONSIVE_DETECTED_ID: i64 = -10001;

/// A single request, response, or event frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// The action/event/response type name.
    #[serde(rename = "type")]
    pub kind: String,

    /// The payload, an arbitrary JSON object.
    #[serde(default)]
    pub params: Value,

    /// Correlation identifier. Absent on some server-originated
    /// events; those are routed by `kind` alone.
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
}

impl MessageEnvelope {
    /// Build a request envelope with the given type and params; the
    /// message ID is filled in by the socket layer at send time.
    pub fn request(kind: impl Into<String>, params: Value) -> Self {
        Self {
            kind: kind.into(),
            params,
            message_id: None,
        }
    }

    /// `true` when this envelope's type marks it as a server error
    /// response rather than a normal response.
    pub fn is_error(&self) -> bool {
        self.kind == "error"
    }

    /// Parse the embedded wire error out of an `error`-typed envelope.
    pub fn wire_error(&self) -> Option<WireError> {
        if !self.is_error() {
            return None;
        }
        serde_json::from_value(self.params.get("error")?.clone()).ok()
    }
}

/// The structured error payload embedded in `{ type: "error", params:
/// { error: ... } }` envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    /// Human-readable error message.
    pub message: String,

    /// Optional error class/name reported by the application.
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_json() {
        let env = MessageEnvelope {
            kind: "login".into(),
            params: json!({ "sessionId": "abc" }),
            message_id: Some(0),
        };
        let raw = serde_json::to_string(&env).unwrap();
        let parsed: MessageEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.kind, "login");
        assert_eq!(parsed.message_id, Some(0));
    }

    #[test]
    fn missing_message_id_parses_as_event() {
        let raw = r#"{"type":"appConnected","params":{}}"#;
        let parsed: MessageEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message_id, None);
    }

    #[test]
    fn extracts_wire_error() {
        let raw = r#"{"type":"error","params":{"error":{"message":"boom"}}}"#;
        let parsed: MessageEnvelope = serde_json::from_str(raw).unwrap();
        assert!(parsed.is_error());
        let err = parsed.wire_error().unwrap();
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn non_error_has_no_wire_error() {
        let raw = r#"{"type":"ready","params":{}}"#;
        let parsed: MessageEnvelope = serde_json::from_str(raw).unwrap();
        assert!(parsed.wire_error().is_none());
    }
}
