//! Action Registry (component B): the closed catalogue of known
//! actions, each paired with its expected response type.

use serde_json::{json, Value};

use crate::message::MessageEnvelope;

/// Request-type name constants, one per canonical action.
pub mod kind {
    /// Login handshake request.
    pub const LOGIN: &str = "login";
    /// Readiness query.
    pub const IS_READY: &str = "isReady";
    /// Triggers a React Native bundle reload.
    pub const RELOAD_REACT_NATIVE: &str = "reactNativeReload";
    /// Delivers a payload (deep link, push notification, …) to the app.
    pub const DELIVER_PAYLOAD: &str = "deliverPayload";
    /// Updates the app's synchronization settings.
    pub const SET_SYNC_SETTINGS: &str = "setSyncSettings";
    /// Simulates a shake gesture.
    pub const SHAKE_DEVICE: &str = "shakeDevice";
    /// Changes device orientation.
    pub const SET_ORIENTATION: &str = "setOrientation";
    /// Starts or stops instruments recording.
    pub const SET_RECORDING_STATE: &str = "setRecordingState";
    /// Requests a view hierarchy capture.
    pub const CAPTURE_VIEW_HIERARCHY: &str = "captureViewHierarchy";
    /// Waits for the app to move to the background.
    pub const WAIT_FOR_BACKGROUND: &str = "waitForBackground";
    /// Waits for the app to become active.
    pub const WAIT_FOR_ACTIVE: &str = "waitForActive";
    /// Terminal teardown request.
    pub const CLEANUP: &str = "cleanup";
    /// Liveness-probe query; never itself triggers a probe.
    pub const CURRENT_STATUS: &str = "currentStatus";
}

/// The set of response types an action will accept as success.
#[derive(Debug, Clone)]
pub enum ExpectedResponse {
    /// Exactly one response type name is acceptable.
    Exactly(&'static str),
    /// Any of several response type names are acceptable (used by
    /// `cleanup`, which accepts either `cleanupDone` or
    /// `appDisconnected`).
    AnyOf(&'static [&'static str]),
}

impl ExpectedResponse {
    /// Whether `candidate` satisfies this expectation.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            ExpectedResponse::Exactly(expected) => *expected == candidate,
            ExpectedResponse::AnyOf(expected) => expected.contains(&candidate),
        }
    }

    /// A human-readable rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            ExpectedResponse::Exactly(expected) => (*expected).to_string(),
            ExpectedResponse::AnyOf(expected) => expected.join(" | "),
        }
    }
}

/// An outbound request paired with the response type(s) that count
/// as success. The message ID is assigned later by the socket layer.
#[derive(Debug, Clone)]
pub struct Action {
    /// The envelope to send; `message_id` is unset until sent.
    pub envelope: MessageEnvelope,
    /// What counts as a successful reply.
    pub expected: ExpectedResponse,
}

impl Action {
    fn new(request_type: &'static str, params: Value, expected: ExpectedResponse) -> Self {
        Self {
            envelope: MessageEnvelope::request(request_type, params),
            expected,
        }
    }

    /// `true` if this action is the liveness-probe query itself,
    /// used by the client to avoid a probe scheduling a probe.
    pub fn is_current_status(&self) -> bool {
        self.envelope.kind == kind::CURRENT_STATUS
    }
}

/// `login { sessionId }` → `loginSuccess`.
pub fn login(session_id: &str) -> Action {
    Action::new(
        kind::LOGIN,
        json!({ "sessionId": session_id }),
        ExpectedResponse::Exactly("loginSuccess"),
    )
}

/// `isReady {}` → `ready`.
pub fn ready() -> Action {
    Action::new(kind::IS_READY, json!({}), ExpectedResponse::Exactly("ready"))
}

/// `reactNativeReload {}` → `ready`.
pub fn reload_react_native() -> Action {
    Action::new(
        kind::RELOAD_REACT_NATIVE,
        json!({}),
        ExpectedResponse::Exactly("ready"),
    )
}

/// `deliverPayload { .. }` → `deliverPayloadDone`.
pub fn deliver_payload(params: Value) -> Action {
    Action::new(
        kind::DELIVER_PAYLOAD,
        params,
        ExpectedResponse::Exactly("deliverPayloadDone"),
    )
}

/// `setSyncSettings { .. }` → `setSyncSettingsDone`.
pub fn set_sync_settings(params: Value) -> Action {
    Action::new(
        kind::SET_SYNC_SETTINGS,
        params,
        ExpectedResponse::Exactly("setSyncSettingsDone"),
    )
}

/// `shakeDevice {}` → `shakeDeviceDone`.
pub fn shake() -> Action {
    Action::new(
        kind::SHAKE_DEVICE,
        json!({}),
        ExpectedResponse::Exactly("shakeDeviceDone"),
    )
}

/// `setOrientation { orientation }` → `setOrientationDone`.
pub fn set_orientation(orientation: &str) -> Action {
    Action::new(
        kind::SET_ORIENTATION,
        json!({ "orientation": orientation }),
        ExpectedResponse::Exactly("setOrientationDone"),
    )
}

/// `setRecordingState { .. }` → `setRecordingStateDone`.
pub fn set_instruments_recording_state(params: Value) -> Action {
    Action::new(
        kind::SET_RECORDING_STATE,
        params,
        ExpectedResponse::Exactly("setRecordingStateDone"),
    )
}

/// `captureViewHierarchy { .. }` → `captureViewHierarchyDone`.
///
/// The `captureViewHierarchyError` special case (§4.B of the crate's
/// requirements) is handled by the client's response-finishing
/// routine, not here, since it depends on inspecting the response
/// params rather than the type name alone.
pub fn capture_view_hierarchy(params: Value) -> Action {
    Action::new(
        kind::CAPTURE_VIEW_HIERARCHY,
        params,
        ExpectedResponse::Exactly("captureViewHierarchyDone"),
    )
}

/// `waitForBackground {}` → `waitForBackgroundDone`.
pub fn wait_for_background() -> Action {
    Action::new(
        kind::WAIT_FOR_BACKGROUND,
        json!({}),
        ExpectedResponse::Exactly("waitForBackgroundDone"),
    )
}

/// `waitForActive {}` → `waitForActiveDone`.
pub fn wait_for_active() -> Action {
    Action::new(
        kind::WAIT_FOR_ACTIVE,
        json!({}),
        ExpectedResponse::Exactly("waitForActiveDone"),
    )
}

/// `cleanup { permanent }` → `cleanupDone` or `appDisconnected`.
pub fn cleanup(permanent: bool) -> Action {
    Action::new(
        kind::CLEANUP,
        json!({ "permanent": permanent }),
        ExpectedResponse::AnyOf(&["cleanupDone", "appDisconnected"]),
    )
}

/// `currentStatus {}` → `currentStatusResult`. Never itself arms a
/// liveness probe.
pub fn current_status() -> Action {
    Action::new(
        kind::CURRENT_STATUS,
        json!({}),
        ExpectedResponse::Exactly("currentStatusResult"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_matches_login_success() {
        let action = login("session-1");
        assert_eq!(action.envelope.kind, kind::LOGIN);
        assert!(action.expected.matches("loginSuccess"));
        assert!(!action.expected.matches("ready"));
    }

    #[test]
    fn cleanup_accepts_either_terminal_response() {
        let action = cleanup(true);
        assert!(action.expected.matches("cleanupDone"));
        assert!(action.expected.matches("appDisconnected"));
        assert!(!action.expected.matches("somethingElse"));
    }

    #[test]
    fn current_status_is_flagged() {
        assert!(current_status().is_current_status());
        assert!(!ready().is_current_status());
    }
}
