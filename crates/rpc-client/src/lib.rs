//! Tester-side RPC client core for a mobile end-to-end test harness.
//!
//! Three collaborating pieces, smallest first:
//!
//! - [`socket`]: the async message socket. Assigns message IDs,
//!   tracks in-flight requests, and dispatches inbound frames either
//!   to the request they answer or to registered event listeners.
//! - [`actions`]: the action registry, the closed catalogue of known
//!   request types and the response type(s) each expects.
//! - [`client`]: the RPC client. Connection/login, action dispatch
//!   with response verification, the liveness-probe scheduler, and
//!   cleanup.
//!
//! [`transport::MessageTransport`] is the injected collaborator the
//! host test harness supplies; this crate depends only on that trait
//! boundary, never on a concrete socket implementation.

pub mod actions;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod socket;
pub mod transport;

pub use actions::{Action, ExpectedResponse};
pub use client::RpcClient;
pub use config::SessionConfig;
pub use error::{RpcError, RpcResult};
pub use message::MessageEnvelope;
pub use socket::{AsyncMessageSocket, EventListener};
pub use transport::{FrameListener, MessageTransport, TransportError};
