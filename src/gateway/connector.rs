//! Authenticated gateway socket establishment.
//!
//! `GatewayConnector::open` connects (bounded by `connect_timeout`), upgrades
//! to TLS when configured, and runs the handshake (bounded by
//! `handshake_timeout`). A socket that fails any step is dropped, and
//! therefore closed, before the error is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::handshake::{self, HandshakeError, HandshakeStatus};
use super::stream::GatewayStream;
use super::GatewayAddress;
use crate::config::BridgeConfig;
use crate::credential::Credential;
use crate::error::{BridgeError, BridgeResult};

// ============================================================================
// Gateway Socket
// ============================================================================

/// An established, authenticated connection to the gateway.
///
/// The stream lives in a slot shared with the session's relay. The relay
/// takes it exactly once, when the native driver connects; until then
/// [`GatewaySocket::close`] shuts it down directly. `close` is idempotent.
pub struct GatewaySocket {
    gateway: String,
    encrypted: bool,
    slot: Arc<Mutex<Option<GatewayStream>>>,
    closed: Arc<AtomicBool>,
}

impl GatewaySocket {
    pub(crate) fn new(gateway: String, stream: GatewayStream) -> Self {
        Self {
            gateway,
            encrypted: stream.is_encrypted(),
            slot: Arc::new(Mutex::new(Some(stream))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `host:port` of the gateway this socket is connected to.
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// `true` while the stream has not been handed to a relay or closed.
    pub fn is_attached(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Second handle onto the same slot, for the relay.
    pub(crate) fn share(&self) -> GatewaySocket {
        GatewaySocket {
            gateway: self.gateway.clone(),
            encrypted: self.encrypted,
            slot: Arc::clone(&self.slot),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Hand the stream over. Returns `None` once taken or closed.
    pub(crate) fn take(&self) -> Option<GatewayStream> {
        if self.is_closed() {
            return None;
        }
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Close the socket. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let stream = self.slot.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut stream) = stream {
            let _ = stream.shutdown().await;
        }

        debug!(gateway = %self.gateway, "Gateway socket closed");
    }
}

impl std::fmt::Debug for GatewaySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySocket")
            .field("gateway", &self.gateway)
            .field("encrypted", &self.encrypted)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens authenticated gateway sockets.
#[derive(Clone)]
pub struct GatewayConnector {
    connect_timeout: Duration,
    handshake_timeout: Duration,
    tls: Option<tokio_rustls::TlsConnector>,
}

impl GatewayConnector {
    /// Build a connector from the session configuration.
    ///
    /// # Errors
    ///
    /// Returns `Gateway` if the TLS client configuration cannot be built.
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        let tls = if config.gateway_tls {
            Some(build_tls_connector()?)
        } else {
            None
        };

        Ok(Self {
            connect_timeout: config.connect_timeout,
            handshake_timeout: config.handshake_timeout,
            tls,
        })
    }

    /// Connect to `address` and authenticate.
    ///
    /// The ticket from `address` is presented when present, otherwise the JWT.
    ///
    /// # Errors
    ///
    /// * `Gateway` - connect timeout, refusal, TLS failure, handshake I/O
    ///   failure or non-auth rejection
    /// * `Auth` - the gateway rejected the credential
    pub async fn open(
        &self,
        address: GatewayAddress,
        credential: &Credential,
    ) -> BridgeResult<GatewaySocket> {
        let authority = address.authority();

        let tcp = match timeout(
            self.connect_timeout,
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(BridgeError::Gateway(format!(
                    "could not connect to gateway at {}: {}",
                    authority, e
                )));
            }
            Err(_) => {
                return Err(BridgeError::Gateway(format!(
                    "timed out connecting to gateway at {} after {:?}",
                    authority, self.connect_timeout
                )));
            }
        };

        if let Err(e) = tcp.set_nodelay(true) {
            warn!(gateway = %authority, error = %e, "Failed to set TCP_NODELAY");
        }

        let mut stream = match &self.tls {
            Some(tls) => {
                let server_name = ServerName::try_from(address.host.clone()).map_err(|_| {
                    BridgeError::Gateway(format!("invalid gateway server name: {}", address.host))
                })?;
                let tls_stream = timeout(self.handshake_timeout, tls.connect(server_name, tcp))
                    .await
                    .map_err(|_| {
                        BridgeError::Gateway(format!("TLS handshake with {} timed out", authority))
                    })?
                    .map_err(|e| {
                        BridgeError::Gateway(format!("TLS handshake with {} failed: {}", authority, e))
                    })?;
                GatewayStream::Tls(Box::new(tls_stream))
            }
            None => GatewayStream::Plain(tcp),
        };

        let token = match &address.ticket {
            Some(ticket) => ticket.expose().as_bytes(),
            None => credential.expose().as_bytes(),
        };

        let verdict = timeout(self.handshake_timeout, handshake::perform(&mut stream, token)).await;

        let reply = match verdict {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                let _ = stream.shutdown().await;
                return Err(map_handshake_error(e, &authority));
            }
            Err(_) => {
                let _ = stream.shutdown().await;
                return Err(BridgeError::Gateway(format!(
                    "handshake with {} timed out after {:?}",
                    authority, self.handshake_timeout
                )));
            }
        };

        match reply.status {
            HandshakeStatus::Accepted => {}
            HandshakeStatus::AuthRejected => {
                let _ = stream.shutdown().await;
                return Err(BridgeError::Auth(format!(
                    "gateway rejected credential{}",
                    reason_suffix(&reply.reason)
                )));
            }
            HandshakeStatus::Refused => {
                let _ = stream.shutdown().await;
                return Err(BridgeError::Gateway(format!(
                    "gateway {} refused session{}",
                    authority,
                    reason_suffix(&reply.reason)
                )));
            }
        }

        debug!(
            gateway = %authority,
            peer = ?stream.peer_addr().ok(),
            tls = stream.tls_version().unwrap_or("none"),
            ticket = address.ticket.is_some(),
            "Gateway socket established"
        );

        Ok(GatewaySocket::new(authority, stream))
    }
}

fn map_handshake_error(err: HandshakeError, authority: &str) -> BridgeError {
    match err {
        HandshakeError::Io(e) => {
            BridgeError::Gateway(format!("handshake I/O failure with {}: {}", authority, e))
        }
        other => BridgeError::Gateway(format!("handshake with {} failed: {}", authority, other)),
    }
}

fn reason_suffix(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(": {}", reason)
    }
}

fn build_tls_connector() -> BridgeResult<tokio_rustls::TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = rustls::crypto::ring::default_provider();
    let config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| BridgeError::Gateway(format!("failed to set TLS protocol versions: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(tokio_rustls::TlsConnector::from(Arc::new(config)))
}
