//! Unified error type for every layer of the RPC client.

use thiserror::Error;

/// All failure modes surfaced by this crate.
///
/// A single consolidated enum, not one error type per layer, matching
/// how this crate's ambient stack handles errors elsewhere.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The transport failed to open.
    #[error("failed to connect: {0}")]
    Connection(String),

    /// `send` was attempted while the socket was not open.
    #[error("socket is closed")]
    ClosedSocket,

    /// The transport reported an error while requests were in flight.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server responded with an explicit `error` envelope.
    #[error("server error: {0}")]
    Server(String),

    /// The response type did not match what the action expected.
    #[error("unexpected response: got {actual}, expected {expected}")]
    UnexpectedResponse {
        /// The response type actually received.
        actual: String,
        /// The response type the action declared as expected.
        expected: String,
    },

    /// A domain-specific failure embedded in an otherwise well-formed
    /// response (e.g. `captureViewHierarchyError`).
    #[error("{0}")]
    Domain(String),

    /// The instrumented application reported it is terminating with
    /// an error.
    #[error("application crashed: {0}")]
    AppCrash(String),

    /// The request's in-flight entry was dropped by
    /// `reset_in_flight_promises` before a response arrived.
    #[error("request {0} was abandoned")]
    Abandoned(i64),

    /// The oneshot channel carrying the response was dropped without
    /// a value (the socket layer panicked or was torn down).
    #[error("response channel closed for request {0}")]
    ChannelClosed(i64),

    /// The session configuration failed validation.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    /// Envelope (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Serialization(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type RpcResult<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_response_display() {
        let err = RpcError::UnexpectedResponse {
            actual: "foo".into(),
            expected: "bar".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("foo"));
        assert!(msg.contains("bar"));
    }

    #[test]
    fn serde_error_converts() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RpcError = parse_err.into();
        assert!(matches!(err, RpcError::Serialization(_)));
    }
}
