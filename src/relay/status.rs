//! Relay status shared between the forwarding tasks and the session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::BridgeError;

use super::forward::Direction;

/// Live counters and the first recorded fault of one relay.
///
/// Written by the background tasks, read by the session. Only atomics and a
/// single fault slot are shared; the forwarding buffers are not.
#[derive(Debug, Default)]
pub struct RelayStatus {
    bytes_to_gateway: AtomicU64,
    bytes_to_client: AtomicU64,
    driver_connected: AtomicBool,
    pair_active: AtomicBool,
    rejected_connections: AtomicU64,
    fault: Mutex<Option<String>>,
}

/// Point-in-time copy of [`RelayStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStats {
    pub bytes_to_gateway: u64,
    pub bytes_to_client: u64,
    pub driver_connected: bool,
    pub pair_active: bool,
    pub rejected_connections: u64,
}

impl RelayStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            bytes_to_gateway: self.bytes_to_gateway.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            driver_connected: self.driver_connected.load(Ordering::Acquire),
            pair_active: self.pair_active.load(Ordering::Acquire),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
        }
    }

    /// `true` while a driver connection is being forwarded.
    pub fn is_active(&self) -> bool {
        self.pair_active.load(Ordering::Acquire)
    }

    /// The first mid-stream failure, as a `Proxy` error.
    pub fn fault(&self) -> Option<BridgeError> {
        self.fault
            .lock()
            .ok()
            .and_then(|fault| fault.clone())
            .map(BridgeError::Proxy)
    }

    pub(crate) fn add_bytes(&self, direction: Direction, n: u64) {
        match direction {
            Direction::ClientToGateway => self.bytes_to_gateway.fetch_add(n, Ordering::Relaxed),
            Direction::GatewayToClient => self.bytes_to_client.fetch_add(n, Ordering::Relaxed),
        };
    }

    pub(crate) fn pair_started(&self) {
        self.driver_connected.store(true, Ordering::Release);
        self.pair_active.store(true, Ordering::Release);
    }

    pub(crate) fn pair_ended(&self) {
        self.pair_active.store(false, Ordering::Release);
    }

    pub(crate) fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Keep the first fault; later ones are consequences of it.
    pub(crate) fn record_fault(&self, message: String) {
        if let Ok(mut fault) = self.fault.lock() {
            if fault.is_none() {
                *fault = Some(message);
            }
        }
    }
}
