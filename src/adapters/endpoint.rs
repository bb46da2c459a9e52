//! Raw endpoint adapter.
//!
//! The "client" is just the relay address. Anything that speaks the backend
//! protocol can connect to it, which is what the `bridgebase tunnel` command
//! does.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::credential::{Backend, Credential, SessionOptions};
use crate::error::BridgeResult;
use crate::session::{NativeDriver, Session};

#[derive(Debug, Clone)]
pub struct EndpointDriver {
    backend: Backend,
}

impl EndpointDriver {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl NativeDriver for EndpointDriver {
    type Client = SocketAddr;

    fn backend(&self) -> Backend {
        self.backend.clone()
    }

    async fn connect(&self, local: SocketAddr) -> BridgeResult<SocketAddr> {
        Ok(local)
    }
}

/// Session whose client is the relay address itself.
pub fn endpoint(
    credential: impl Into<Credential>,
    backend: Backend,
    options: SessionOptions,
) -> Session<EndpointDriver> {
    Session::new(credential, options, EndpointDriver::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_is_relay_address() {
        let driver = EndpointDriver::new(Backend::Other("raw".to_string()));
        let local: SocketAddr = "127.0.0.1:45000".parse().unwrap();
        assert_eq!(driver.connect(local).await.unwrap(), local);
    }

    #[test]
    fn test_hints_follow_options() {
        let driver = EndpointDriver::new(Backend::Redis);
        let hints = driver.resolve_hints(&SessionOptions::default().db_index(4));
        assert_eq!(hints.backend, Backend::Redis);
        assert_eq!(hints.db_index, Some(4));
        assert_eq!(hints.cluster_id, None);
    }
}
