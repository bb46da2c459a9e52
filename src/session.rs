//! Session lifecycle.
//!
//! A [`Session`] drives one tunnel from an idle handle to a ready native
//! client and back:
//!
//! ```text
//! Idle → Resolving → ConnectingGateway → ProxyStarting → Ready → Closing → Closed
//!   │         │               │                 │
//!   └─────────┴───────────────┴─────────────────┴──→ Failed
//! ```
//!
//! Nothing touches the network until [`Session::connect`]. Every stage
//! that fails rolls back the stages before it, so a `Failed` session holds
//! no sockets and no listener. [`Session::close`] is valid in every state and
//! never fails.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::credential::{Backend, Credential, SessionOptions};
use crate::error::{BridgeError, BridgeResult};
use crate::gateway::{
    GatewayAddress, GatewayConnector, GatewayResolver, GatewaySocket, ResolveHints,
};
use crate::relay::{Relay, RelayConfig, RelayStats, RelayStatus};

// ============================================================================
// Session State
// ============================================================================

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no network activity yet.
    Idle,
    /// Asking the control plane for a gateway.
    Resolving,
    /// Opening and authenticating the gateway socket.
    ConnectingGateway,
    /// Binding the relay and connecting the native client.
    ProxyStarting,
    /// Native client is connected through the relay.
    Ready,
    /// Tearing down.
    Closing,
    /// Torn down. Terminal.
    Closed,
    /// A connect stage failed and was rolled back. Terminal until closed.
    Failed,
}

impl SessionState {
    /// `true` for states a `connect` can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Resolving => write!(f, "Resolving"),
            SessionState::ConnectingGateway => write!(f, "ConnectingGateway"),
            SessionState::ProxyStarting => write!(f, "ProxyStarting"),
            SessionState::Ready => write!(f, "Ready"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

// ============================================================================
// Native Driver
// ============================================================================

/// Backend-specific half of a session.
///
/// The core never looks inside [`NativeDriver::Client`]; it only creates it
/// against the relay's loopback address and hands it back for release.
#[async_trait]
pub trait NativeDriver: Send + Sync {
    /// The native database client handed to the caller.
    type Client: Send;

    fn backend(&self) -> Backend;

    /// Hints sent with the resolve call.
    fn resolve_hints(&self, options: &SessionOptions) -> ResolveHints {
        ResolveHints {
            backend: self.backend(),
            cluster_id: options.cluster_id,
            db_index: options.db_index,
        }
    }

    /// Build the native client against `local`, the relay address.
    ///
    /// Failures should be reported as `BridgeError::Connection`.
    async fn connect(&self, local: SocketAddr) -> BridgeResult<Self::Client>;

    /// Release the native client. Errors are logged by the session.
    async fn close(&self, client: Self::Client) -> BridgeResult<()> {
        drop(client);
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

/// One tunnel to one backend.
///
/// Owned exclusively by the caller; every operation takes `&mut self`.
pub struct Session<D: NativeDriver> {
    id: Uuid,
    credential: Credential,
    options: SessionOptions,
    driver: D,
    state: SessionState,
    gateway: Option<GatewaySocket>,
    relay: Option<Relay>,
    client: Option<D::Client>,
    relay_status: Option<Arc<RelayStatus>>,
    local_addr: Option<SocketAddr>,
}

impl<D: NativeDriver> Session<D> {
    /// Create an idle session. No I/O happens here.
    pub fn new(credential: impl Into<Credential>, options: SessionOptions, driver: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            credential: credential.into(),
            options,
            driver,
            state: SessionState::Idle,
            gateway: None,
            relay: None,
            client: None,
            relay_status: None,
            local_addr: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn backend(&self) -> Backend {
        self.driver.backend()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Relay address the native client was built against.
    ///
    /// Set once the relay is bound and kept after close, so callers can
    /// confirm the port was released.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Snapshot of the relay counters, once a relay has been started.
    pub fn relay_status(&self) -> Option<RelayStats> {
        self.relay_status.as_ref().map(|status| status.snapshot())
    }

    /// First forwarding failure recorded during this session, if any.
    pub fn relay_fault(&self) -> Option<BridgeError> {
        self.relay_status.as_ref().and_then(|status| status.fault())
    }

    /// The native client while the session is ready.
    pub fn client(&mut self) -> Option<&mut D::Client> {
        self.client.as_mut()
    }

    /// Bring the session to `Ready` and return the native client.
    ///
    /// From `Ready` this returns the existing client without any I/O.
    ///
    /// # Errors
    ///
    /// * `Auth` - empty credential, or the token was rejected
    /// * `GatewayResolution` / `Gateway` - the gateway could not be reached
    /// * `Proxy` - the relay could not be started
    /// * `Connection` - the native client could not connect to the relay
    /// * `State` - the session is closed, failed, or was interrupted
    pub async fn connect(&mut self) -> BridgeResult<&mut D::Client> {
        match self.state {
            SessionState::Ready => {
                return self
                    .client
                    .as_mut()
                    .ok_or_else(|| BridgeError::State("ready session has no client".to_string()));
            }
            SessionState::Idle => {}
            other if other.is_terminal() => {
                return Err(BridgeError::State(format!(
                    "cannot connect a session in state {}; start a new session",
                    other
                )));
            }
            other => {
                return Err(BridgeError::State(format!(
                    "cannot connect a session in state {}; an earlier connect was interrupted",
                    other
                )));
            }
        }

        if self.credential.is_empty() {
            self.state = SessionState::Failed;
            return Err(BridgeError::Auth("credential is empty".to_string()));
        }

        let backend = self.driver.backend();
        debug!(
            session_id = %self.id,
            backend = backend.label(),
            "Connecting session"
        );

        if let Err(e) = self.establish().await {
            warn!(
                session_id = %self.id,
                stage = %self.state,
                error = %e,
                "Session connect failed"
            );
            self.release().await;
            self.state = SessionState::Failed;
            return Err(e);
        }

        self.state = SessionState::Ready;
        info!(
            session_id = %self.id,
            backend = backend.label(),
            local_addr = ?self.local_addr,
            "Session ready"
        );

        self.client
            .as_mut()
            .ok_or_else(|| BridgeError::State("ready session has no client".to_string()))
    }

    async fn establish(&mut self) -> BridgeResult<()> {
        self.state = SessionState::Resolving;
        let address = match self.options.config.gateway_override.as_ref() {
            Some(target) => {
                debug!(session_id = %self.id, gateway = %target, "Using gateway override");
                GatewayAddress::new(target.host.clone(), target.port)
            }
            None => {
                let resolver = GatewayResolver::new(&self.options.config)?;
                let hints = self.driver.resolve_hints(&self.options);
                let address = resolver.resolve(&self.credential, &hints).await?;
                debug!(session_id = %self.id, gateway = %address, "Gateway resolved");
                address
            }
        };

        self.state = SessionState::ConnectingGateway;
        let connector = GatewayConnector::new(&self.options.config)?;
        let gateway = self
            .gateway
            .insert(connector.open(address, &self.credential).await?);
        debug!(
            session_id = %self.id,
            gateway = %gateway.gateway(),
            encrypted = gateway.is_encrypted(),
            "Gateway socket established"
        );

        self.state = SessionState::ProxyStarting;
        let relay = Relay::start(gateway, &RelayConfig::from(&self.options.config))?;
        let local = relay.local_addr();
        self.relay_status = Some(relay.status());
        self.local_addr = Some(local);
        self.relay = Some(relay);

        let client = self.driver.connect(local).await?;
        self.client = Some(client);
        Ok(())
    }

    /// Release native client, relay and gateway socket, in that order.
    async fn release(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = self.driver.close(client).await {
                warn!(session_id = %self.id, error = %e, "Failed to close native client");
            }
        }

        if let Some(mut relay) = self.relay.take() {
            relay.stop().await;
        }

        if let Some(gateway) = self.gateway.take() {
            gateway.close().await;
        }
    }

    /// Tear the session down. Valid in every state; repeated calls are
    /// no-ops.
    pub async fn close(&mut self) {
        match self.state {
            SessionState::Closed => return,
            SessionState::Idle | SessionState::Failed => {
                self.state = SessionState::Closed;
                debug!(session_id = %self.id, "Session closed before it was ready");
                return;
            }
            _ => {}
        }

        self.state = SessionState::Closing;
        self.release().await;

        if let Some(fault) = self.relay_fault() {
            warn!(session_id = %self.id, error = %fault, "Relay recorded a fault during the session");
        }

        self.state = SessionState::Closed;
        info!(session_id = %self.id, "Session closed");
    }

    /// Connect, run `f` with the native client, and close on every exit
    /// path.
    ///
    /// ```ignore
    /// let value = session
    ///     .scoped(|client| Box::pin(async move { do_work(client).await }))
    ///     .await?;
    /// ```
    pub async fn scoped<T, F>(mut self, f: F) -> BridgeResult<T>
    where
        F: for<'c> FnOnce(&'c mut D::Client) -> BoxFuture<'c, BridgeResult<T>>,
    {
        let result = match self.connect().await {
            Ok(client) => f(client).await,
            Err(e) => Err(e),
        };
        self.close().await;
        result
    }
}

impl<D: NativeDriver> Drop for Session<D> {
    fn drop(&mut self) {
        if self.relay.is_some() || self.gateway.is_some() {
            // Relay cancels its own tasks on drop; the gateway stream is
            // closed when the last handle goes.
            debug!(session_id = %self.id, state = %self.state, "Session dropped without close");
        }
    }
}

impl<D: NativeDriver> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("backend", &self.driver.backend())
            .field("state", &self.state)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
