//! Session configuration contract.

use crate::error::{RpcError, RpcResult};

/// Immutable configuration for one tester session.
///
/// Constructed once and handed to [`crate::client::RpcClient::new`].
/// Validated at construction time, the way the teacher's transport
/// builders validate before building a client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    server: String,
    session_id: String,
    debug_synchronization_ms: u64,
}

impl SessionConfig {
    /// Build a session configuration, rejecting an empty `session_id`
    /// or `server`.
    ///
    /// `debug_synchronization_ms == 0` disables the liveness probe.
    pub fn new(
        server: impl Into<String>,
        session_id: impl Into<String>,
        debug_synchronization_ms: u64,
    ) -> RpcResult<Self> {
        let server = server.into();
        let session_id = session_id.into();
        if server.is_empty() {
            return Err(RpcError::InvalidConfig("server must not be empty".into()));
        }
        if session_id.is_empty() {
            return Err(RpcError::InvalidConfig(
                "session_id must not be empty".into(),
            ));
        }
        Ok(Self {
            server,
            session_id,
            debug_synchronization_ms,
        })
    }

    /// The relay server endpoint.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// The opaque tester/application session token.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Liveness-probe interval in milliseconds. `0` disables probing.
    pub fn debug_synchronization_ms(&self) -> u64 {
        self.debug_synchronization_ms
    }

    /// Whether the liveness probe is enabled for this session.
    pub fn probing_enabled(&self) -> bool {
        self.debug_synchronization_ms > 0
    }
}
