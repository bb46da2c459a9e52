//! Loopback relay between a native driver and the gateway socket.
//!
//! The relay listens on an ephemeral `127.0.0.1` port. The first accepted
//! connection is paired with the gateway stream and forwarded in both
//! directions until either side ends; every later connection is reset.
//! Stopping the relay closes the listener, interrupts forwarding, and waits
//! for the background tasks to finish.

mod forward;
mod status;

pub use forward::Direction;
pub use status::{RelayStats, RelayStatus};

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::gateway::GatewaySocket;

/// Only one driver connection is ever served.
const LISTEN_BACKLOG: i32 = 1;

/// Pause after a failed accept so a persistent error does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Relay tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Per-direction forwarding buffer size in bytes.
    pub buffer_size: usize,
    /// How long `stop` waits for the background tasks before aborting them.
    pub stop_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for RelayConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            buffer_size: config.relay_buffer_size,
            stop_timeout: config.stop_timeout,
        }
    }
}

/// A running loopback relay.
///
/// Dropping a relay without calling [`Relay::stop`] still cancels its tasks,
/// but does not wait for them.
pub struct Relay {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
    status: Arc<RelayStatus>,
    stop_timeout: Duration,
}

impl Relay {
    /// Bind `127.0.0.1:0` and start accepting in the background.
    ///
    /// Must be called from within a Tokio runtime. The listener is ready to
    /// accept when this returns. Bind failures map to `Proxy`.
    pub fn start(gateway: &GatewaySocket, config: &RelayConfig) -> BridgeResult<Self> {
        if gateway.is_closed() {
            return Err(BridgeError::Proxy(
                "cannot start relay on a closed gateway socket".to_string(),
            ));
        }

        let listener = bind_loopback()
            .and_then(TcpListener::from_std)
            .map_err(|e| BridgeError::Proxy(format!("failed to bind relay listener: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::Proxy(format!("failed to read relay address: {}", e)))?;

        let shutdown = CancellationToken::new();
        let status = Arc::new(RelayStatus::new());

        let accept_task = tokio::spawn(accept_loop(
            listener,
            gateway.share(),
            shutdown.clone(),
            Arc::clone(&status),
            config.buffer_size,
        ));

        info!(
            relay = %local_addr,
            gateway = %gateway.gateway(),
            "Relay listening"
        );

        Ok(Self {
            local_addr,
            shutdown,
            accept_task: Some(accept_task),
            status,
            stop_timeout: config.stop_timeout,
        })
    }

    /// Loopback address the native driver should connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn status(&self) -> Arc<RelayStatus> {
        Arc::clone(&self.status)
    }

    pub fn is_running(&self) -> bool {
        self.accept_task.is_some()
    }

    /// Stop accepting, interrupt forwarding, and wait for the tasks.
    ///
    /// Calling it again is a no-op. Tasks still running after
    /// `stop_timeout` are aborted.
    pub async fn stop(&mut self) {
        let Some(mut task) = self.accept_task.take() else {
            return;
        };

        self.shutdown.cancel();

        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Relay task ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "Relay did not stop in time, aborting"
                );
                task.abort();
            }
        }

        debug!(relay = %self.local_addr, "Relay stopped");
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("stats", &self.status.snapshot())
            .finish()
    }
}

fn bind_loopback() -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::LOCALHOST, 0)).into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

async fn accept_loop(
    listener: TcpListener,
    gateway: GatewaySocket,
    shutdown: CancellationToken,
    status: Arc<RelayStatus>,
    buffer_size: usize,
) {
    let mut pair: Option<JoinHandle<()>> = None;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Relay accept failed");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => continue,
                }
            }
        };

        if pair.is_some() {
            debug!(%peer, "Relay already paired, rejecting connection");
            reject(stream, &status);
            continue;
        }

        let Some(upstream) = gateway.take() else {
            warn!(%peer, "Gateway socket no longer available, rejecting connection");
            reject(stream, &status);
            continue;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY on driver connection");
        }

        info!(%peer, gateway = %gateway.gateway(), "Driver connected to relay");

        pair = Some(tokio::spawn(forward::run_pair(
            stream,
            upstream,
            shutdown.child_token(),
            Arc::clone(&status),
            buffer_size,
        )));
    }

    drop(listener);

    if let Some(pair) = pair {
        if let Err(e) = pair.await {
            warn!(error = %e, "Relay pair task ended abnormally");
        }
    }
}

/// Reset a connection instead of closing it gracefully.
fn reject(stream: TcpStream, status: &RelayStatus) {
    if let Err(e) = SockRef::from(&stream).set_linger(Some(Duration::ZERO)) {
        debug!(error = %e, "Failed to set SO_LINGER on rejected connection");
    }
    drop(stream);
    status.connection_rejected();
}
