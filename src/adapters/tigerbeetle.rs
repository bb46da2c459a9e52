//! TigerBeetle adapter.
//!
//! The JWT only authenticates the gateway; TigerBeetle itself takes no
//! credentials. The client sees the relay as a single replica.

use std::net::SocketAddr;

use async_trait::async_trait;

use super::{ConnectFn, ConnectFuture, connection_error};
use crate::credential::{Backend, Credential, SessionOptions};
use crate::error::BridgeResult;
use crate::gateway::ResolveHints;
use crate::session::{NativeDriver, Session};

/// Where a TigerBeetle client should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TigerBeetleTarget {
    pub cluster_id: u128,
    pub replica_addresses: Vec<SocketAddr>,
}

impl TigerBeetleTarget {
    /// Comma-separated replica list, as TigerBeetle clients expect it.
    pub fn addresses(&self) -> String {
        self.replica_addresses
            .iter()
            .map(|addr| addr.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub struct TigerBeetleDriver<C> {
    cluster_id: u128,
    connect: ConnectFn<TigerBeetleTarget, C>,
}

#[async_trait]
impl<C: Send + 'static> NativeDriver for TigerBeetleDriver<C> {
    type Client = C;

    fn backend(&self) -> Backend {
        Backend::TigerBeetle
    }

    fn resolve_hints(&self, _options: &SessionOptions) -> ResolveHints {
        ResolveHints {
            backend: Backend::TigerBeetle,
            cluster_id: Some(self.cluster_id),
            db_index: None,
        }
    }

    async fn connect(&self, local: SocketAddr) -> BridgeResult<C> {
        let target = TigerBeetleTarget {
            cluster_id: self.cluster_id,
            replica_addresses: vec![local],
        };
        (self.connect)(target)
            .await
            .map_err(|e| connection_error("TigerBeetle", e))
    }
}

/// TigerBeetle session for `cluster_id`.
pub fn tigerbeetle<C, F>(
    credential: impl Into<Credential>,
    cluster_id: u128,
    options: SessionOptions,
    connect: F,
) -> Session<TigerBeetleDriver<C>>
where
    C: Send + 'static,
    F: Fn(TigerBeetleTarget) -> ConnectFuture<C> + Send + Sync + 'static,
{
    let driver = TigerBeetleDriver {
        cluster_id,
        connect: Box::new(connect),
    };
    Session::new(credential, options.cluster_id(cluster_id), driver)
}
