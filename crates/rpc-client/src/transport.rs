//! The injected transport boundary: a small event-driven pair of
//! traits standing in for the relay-server connection, which is out
//! of scope for this crate.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Failure modes the transport itself can report, independent of any
/// application-level error carried inside a frame.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport could not establish a connection.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// `send` was attempted while the transport was not open.
    #[error("transport is closed")]
    Closed,

    /// The transport reported an I/O-level failure after opening.
    #[error("transport failure: {0}")]
    Io(String),
}

/// Receives events from a [`MessageTransport`].
///
/// Mirrors the event-driven handler interface an async transport
/// calls back into: one frame at a time, plus error and close
/// notifications. `AsyncMessageSocket` is the only implementor in
/// this crate.
#[async_trait]
pub trait FrameListener: Send + Sync {
    /// A full frame was received from the peer.
    async fn on_frame(&self, raw: String);

    /// The transport encountered an error after having been opened.
    async fn on_error(&self, error: TransportError);

    /// The transport closed, gracefully or otherwise.
    async fn on_close(&self);
}

/// An event-driven, full-duplex, message-framed connection to the
/// relay server.
///
/// Implementations are supplied by the host test harness; this crate
/// only depends on this trait boundary, never on a concrete socket
/// library.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Open the connection. Resolves once the transport is ready to
    /// send and receive frames.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;

    /// Send one complete frame.
    async fn send(&self, raw: String) -> Result<(), TransportError>;

    /// Whether the transport currently considers itself open.
    fn is_open(&self) -> bool;

    /// Install the listener the transport will deliver events to.
    /// Called once before `open`.
    fn set_listener(&self, listener: Arc<dyn FrameListener>);
}
