//! Gateway resolution and the authenticated gateway socket.
//!
//! - `resolver` - control-plane call mapping a JWT to a gateway address
//! - `connector` - TCP/TLS connect plus the authentication handshake
//! - `handshake` - first-frame wire format
//! - `stream` - plain/TLS stream abstraction

pub mod connector;
pub mod handshake;
pub mod resolver;
pub mod stream;

use std::fmt;

pub use connector::{GatewayConnector, GatewaySocket};
pub use resolver::{GatewayResolver, ResolveHints};
pub use stream::GatewayStream;

/// Default gateway port when the control plane omits one.
pub const DEFAULT_GATEWAY_PORT: u16 = 3001;

/// Short-lived connection ticket issued by the control plane.
///
/// Redacted in `Debug`, like [`crate::Credential`].
#[derive(Clone, PartialEq, Eq)]
pub struct Ticket(String);

impl Ticket {
    pub fn new(ticket: impl Into<String>) -> Self {
        Self(ticket.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ticket([REDACTED])")
    }
}

/// A resolved gateway: where to connect and what to present.
///
/// Consumed by [`GatewayConnector::open`]; a ticket is good for one connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAddress {
    pub host: String,
    pub port: u16,
    pub ticket: Option<Ticket>,
}

impl GatewayAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ticket: None,
        }
    }

    pub fn with_ticket(mut self, ticket: Ticket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    /// `host:port` form for logs and connect calls.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for GatewayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}
