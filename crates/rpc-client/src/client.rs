//! RPC Client (component C): connection/login handshake, action
//! dispatch with response verification, the liveness-probe
//! scheduler, crash/nonresponsiveness event hooks, and cleanup.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::actions::{self, Action, ExpectedResponse};
use crate::config::SessionConfig;
use crate::error::{RpcError, RpcResult};
use crate::message::{self, MessageEnvelope};
use crate::socket::{AsyncMessageSocket, EventListener};
use crate::transport::MessageTransport;

struct ClientState {
    app_connected: bool,
    app_crashing: bool,
    pending_crash_error: Option<RpcError>,
    nonresponsiveness_listener: Option<Arc<dyn Fn(Value) + Send + Sync>>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            app_connected: false,
            app_crashing: false,
            pending_crash_error: None,
            nonresponsiveness_listener: None,
        }
    }
}

/// Orchestrates one tester↔application RPC session over an
/// [`AsyncMessageSocket`].
pub struct RpcClient<T: MessageTransport> {
    config: SessionConfig,
    socket: Arc<AsyncMessageSocket<T>>,
    state: Mutex<ClientState>,
    /// Whether a `currentStatus` probe is currently in flight, global
    /// across every armed action. A plain atomic rather than a field
    /// on `ClientState` so the drop guard in `run_probe` can clear it
    /// synchronously when the probe future is cancelled mid-flight.
    probe_in_flight: AtomicBool,
}

impl<T: MessageTransport + 'static> RpcClient<T> {
    /// Build a client over `transport`, not yet connected.
    pub fn new(config: SessionConfig, transport: Arc<T>) -> Arc<Self> {
        Arc::new(Self {
            config,
            socket: AsyncMessageSocket::new(transport),
            state: Mutex::new(ClientState::default()),
            probe_in_flight: AtomicBool::new(false),
        })
    }

    /// Open the socket, register event listeners, and perform the
    /// login handshake. The login exchange never arms the liveness
    /// probe (SPEC_FULL.md invariant 5).
    pub async fn connect(self: &Arc<Self>) -> RpcResult<()> {
        self.socket.open().await?;

        self.socket
            .set_event_callback(
                message::APP_CONNECTED,
                Arc::new(AppConnectedListener {
                    client: Arc::downgrade(self),
                }) as Arc<dyn EventListener>,
            )
            .await;
        self.socket
            .set_event_callback(
                message::APP_WILL_TERMINATE_WITH_ERROR,
                Arc::new(AppCrashListener {
                    client: Arc::downgrade(self),
                }) as Arc<dyn EventListener>,
            )
            .await;
        self.socket
            .set_event_callback(
                message::APP_NONRESPONSIVE_DETECTED,
                Arc::new(AppNonresponsiveListener {
                    client: Arc::downgrade(self),
                }) as Arc<dyn EventListener>,
            )
            .await;

        let login = actions::login(self.config.session_id());
        let envelope = self.socket.send(login.envelope).await?;
        self.finish_response(actions::kind::LOGIN, &login.expected, envelope)?;
        debug!(session_id = self.config.session_id(), "login accepted");
        Ok(())
    }

    /// `true` once the socket is open and the application has
    /// registered via an `appConnected` event.
    pub async fn is_connected(&self) -> bool {
        self.socket.is_open() && self.state.lock().await.app_connected
    }

    /// Send `action`, racing it against the liveness-probe scheduler
    /// (unless `action` is itself the probe, or probing is disabled
    /// by configuration).
    pub async fn send_action(&self, action: Action) -> RpcResult<Value> {
        if !self.is_connected().await {
            return Err(RpcError::ClosedSocket);
        }

        let is_probe = action.is_current_status();
        let request_type = action.envelope.kind.clone();
        let expected = action.expected.clone();
        let response_future = self.socket.send(action.envelope);

        let envelope = if is_probe || !self.config.probing_enabled() {
            response_future.await?
        } else {
            let interval = Duration::from_millis(self.config.debug_synchronization_ms());
            self.run_with_probe(response_future, interval).await?
        };

        self.finish_response(&request_type, &expected, envelope)
    }

    /// Races `response_future` against the liveness-probe timer,
    /// implementing the IDLE→ARMED→PROBING→ARMED/IDLE state machine
    /// of SPEC_FULL.md §4.C as a loop over `tokio::time::timeout`
    /// instead of a cancellable timer handle (see §4.C.1).
    async fn run_with_probe<F>(&self, response_future: F, interval: Duration) -> RpcResult<MessageEnvelope>
    where
        F: Future<Output = RpcResult<MessageEnvelope>>,
    {
        tokio::pin!(response_future);
        let mut probe_future: Option<Pin<Box<dyn Future<Output = RpcResult<MessageEnvelope>> + Send + '_>>> =
            None;
        let mut probing_enabled = true;

        loop {
            if !probing_enabled {
                return (&mut response_future).await;
            }

            if let Some(probe) = probe_future.as_mut() {
                tokio::select! {
                    biased;
                    result = &mut response_future => return result,
                    probe_result = probe => {
                        probe_future = None;
                        if let Err(err) = probe_result {
                            warn!(%err, "liveness probe failed; no longer probing this action");
                            probing_enabled = false;
                        }
                        // on success, fall through and re-arm a fresh sleep below
                    }
                }
                continue;
            }

            let sleep = tokio::time::sleep(interval);
            tokio::pin!(sleep);
            tokio::select! {
                biased;
                result = &mut response_future => return result,
                _ = &mut sleep => {
                    if self.try_start_probe() {
                        probe_future = Some(Box::pin(self.run_probe()));
                    }
                    // else: another action's probe already owns the
                    // single global slot; loop re-arms our own sleep
                    // and checks again later.
                }
            }
        }
    }

    fn try_start_probe(&self) -> bool {
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Sends the `currentStatus` probe, holding a guard that clears
    /// `probe_in_flight` on drop - including when this future is
    /// cancelled mid-`await` because the originating action resolved
    /// first. Without the guard, a cancelled probe would leave the
    /// flag set forever and permanently disable further probing.
    async fn run_probe(&self) -> RpcResult<MessageEnvelope> {
        let _guard = ProbeGuard {
            flag: &self.probe_in_flight,
        };
        self.socket.send(actions::current_status().envelope).await
    }

    fn finish_response(
        &self,
        request_type: &str,
        expected: &ExpectedResponse,
        envelope: MessageEnvelope,
    ) -> RpcResult<Value> {
        if envelope.is_error() {
            let message = envelope
                .wire_error()
                .map(|err| err.message)
                .unwrap_or_else(|| "server reported an error".to_string());
            return Err(RpcError::Server(message));
        }

        if request_type == actions::kind::CAPTURE_VIEW_HIERARCHY {
            if let Some(domain_err) = envelope
                .params
                .get("captureViewHierarchyError")
                .and_then(Value::as_str)
            {
                return Err(RpcError::Domain(domain_err.to_string()));
            }
        }

        if !expected.matches(&envelope.kind) {
            return Err(RpcError::UnexpectedResponse {
                actual: envelope.kind,
                expected: expected.describe(),
            });
        }

        Ok(envelope.params)
    }

    /// Wait for the application to report readiness.
    pub async fn wait_until_ready(&self) -> RpcResult<Value> {
        self.send_action(actions::ready()).await
    }

    /// Trigger a React Native bundle reload and wait for readiness.
    pub async fn reload_react_native(&self) -> RpcResult<Value> {
        self.send_action(actions::reload_react_native()).await
    }

    /// Deliver a payload (deep link, push notification, …).
    pub async fn deliver_payload(&self, params: Value) -> RpcResult<Value> {
        self.send_action(actions::deliver_payload(params)).await
    }

    /// Update the application's synchronization settings.
    pub async fn set_sync_settings(&self, params: Value) -> RpcResult<Value> {
        self.send_action(actions::set_sync_settings(params)).await
    }

    /// Simulate a shake gesture.
    pub async fn shake(&self) -> RpcResult<Value> {
        self.send_action(actions::shake()).await
    }

    /// Change device orientation.
    pub async fn set_orientation(&self, orientation: &str) -> RpcResult<Value> {
        self.send_action(actions::set_orientation(orientation)).await
    }

    /// Start or stop Instruments recording.
    pub async fn set_instruments_recording_state(&self, params: Value) -> RpcResult<Value> {
        self.send_action(actions::set_instruments_recording_state(params))
            .await
    }

    /// Capture the current view hierarchy. Fails with
    /// [`RpcError::Domain`] if the application reports a capture
    /// error rather than refusing the action outright.
    pub async fn capture_view_hierarchy(&self, params: Value) -> RpcResult<Value> {
        self.send_action(actions::capture_view_hierarchy(params)).await
    }

    /// Wait for the application to move to the background.
    pub async fn wait_for_background(&self) -> RpcResult<Value> {
        self.send_action(actions::wait_for_background()).await
    }

    /// Wait for the application to become active.
    pub async fn wait_for_active(&self) -> RpcResult<Value> {
        self.send_action(actions::wait_for_active()).await
    }

    /// Issue a liveness-probe query directly. Never itself arms a
    /// further probe.
    pub async fn current_status(&self) -> RpcResult<Value> {
        self.send_action(actions::current_status()).await
    }

    /// Register the callback invoked when the application is
    /// detected as nonresponsive.
    pub async fn set_nonresponsiveness_listener<F>(&self, callback: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.state.lock().await.nonresponsiveness_listener = Some(Arc::new(callback));
    }

    /// Inspect currently in-flight requests and, unless the only
    /// outstanding ones are liveness probes, log them and drop the
    /// in-flight table via [`AsyncMessageSocket::reset_in_flight_promises`].
    pub async fn dump_pending_requests(&self, test_name: Option<&str>) {
        let pending = self.socket.pending_request_types().await;
        if pending.is_empty() {
            return;
        }
        let only_probes = pending
            .iter()
            .all(|kind| kind == actions::kind::CURRENT_STATUS);
        if only_probes {
            return;
        }
        warn!(test_name = test_name.unwrap_or("<unknown>"), pending = ?pending, "dumping pending requests");
        self.socket.reset_in_flight_promises().await;
    }

    /// Return and clear any crash report captured from an
    /// `AppWillTerminateWithError` event.
    pub async fn get_pending_crash_and_reset(&self) -> Option<RpcError> {
        self.state.lock().await.pending_crash_error.take()
    }

    /// Tear down the session: if connected and not crashing, send
    /// `cleanup` and await its terminal response; then close the
    /// socket. A disconnected or crashing client skips the send.
    pub async fn cleanup(&self, permanent: bool) -> RpcResult<()> {
        let should_send = {
            let connected = self.is_connected().await;
            let crashing = self.state.lock().await.app_crashing;
            connected && !crashing
        };

        if should_send {
            let action = actions::cleanup(permanent);
            let envelope = self.socket.send(action.envelope).await?;
            self.finish_response(actions::kind::CLEANUP, &action.expected, envelope)?;
        }

        self.socket.close().await
    }
}

/// Clears the shared probe-in-flight flag when dropped, whether the
/// probe completed normally or was cancelled by the originating
/// action resolving first.
struct ProbeGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

struct AppConnectedListener<T: MessageTransport> {
    client: Weak<RpcClient<T>>,
}

#[async_trait]
impl<T: MessageTransport + 'static> EventListener for AppConnectedListener<T> {
    async fn on_event(&self, _envelope: MessageEnvelope) {
        if let Some(client) = self.client.upgrade() {
            client.state.lock().await.app_connected = true;
            debug!("application connected");
        }
    }
}

struct AppCrashListener<T: MessageTransport> {
    client: Weak<RpcClient<T>>,
}

#[async_trait]
impl<T: MessageTransport + 'static> EventListener for AppCrashListener<T> {
    async fn on_event(&self, envelope: MessageEnvelope) {
        if let Some(client) = self.client.upgrade() {
            let message = envelope
                .params
                .get("error")
                .and_then(|err| err.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("application crashed")
                .to_string();
            let mut state = client.state.lock().await;
            state.app_crashing = true;
            state.pending_crash_error = Some(RpcError::AppCrash(message));
        }
    }
}

struct AppNonresponsiveListener<T: MessageTransport> {
    client: Weak<RpcClient<T>>,
}

#[async_trait]
impl<T: MessageTransport + 'static> EventListener for AppNonresponsiveListener<T> {
    async fn on_event(&self, envelope: MessageEnvelope) {
        if let Some(client) = self.client.upgrade() {
            let listener = client.state.lock().await.nonresponsiveness_listener.clone();
            if let Some(listener) = listener {
                listener(envelope.params);
            }
        }
    }
}
