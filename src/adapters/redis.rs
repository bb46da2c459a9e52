//! Redis / Valkey adapter.

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;

use super::{ConnectFn, ConnectFuture, connection_error};
use crate::credential::{Backend, Credential, SessionOptions};
use crate::error::BridgeResult;
use crate::gateway::ResolveHints;
use crate::session::{NativeDriver, Session};

/// Where a Redis client should connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedisTarget {
    /// Relay address.
    pub addr: SocketAddr,
    /// Logical database index.
    pub db: i64,
}

impl RedisTarget {
    /// `redis://127.0.0.1:<port>/<db>`, accepted by common Redis clients.
    pub fn url(&self) -> String {
        format!("redis://{}/{}", self.addr, self.db)
    }
}

impl fmt::Display for RedisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

pub struct RedisDriver<C> {
    db: i64,
    connect: ConnectFn<RedisTarget, C>,
}

#[async_trait]
impl<C: Send + 'static> NativeDriver for RedisDriver<C> {
    type Client = C;

    fn backend(&self) -> Backend {
        Backend::Redis
    }

    fn resolve_hints(&self, _options: &SessionOptions) -> ResolveHints {
        ResolveHints {
            backend: Backend::Redis,
            cluster_id: None,
            db_index: Some(self.db),
        }
    }

    async fn connect(&self, local: SocketAddr) -> BridgeResult<C> {
        let target = RedisTarget {
            addr: local,
            db: self.db,
        };
        (self.connect)(target)
            .await
            .map_err(|e| connection_error("Redis", e))
    }
}

/// Redis/Valkey session. `connect` receives the target and returns the
/// connected native client; it is called once, from `Session::connect`.
pub fn redis<C, F>(
    credential: impl Into<Credential>,
    db: i64,
    options: SessionOptions,
    connect: F,
) -> Session<RedisDriver<C>>
where
    C: Send + 'static,
    F: Fn(RedisTarget) -> ConnectFuture<C> + Send + Sync + 'static,
{
    let driver = RedisDriver {
        db,
        connect: Box::new(connect),
    };
    Session::new(credential, options.db_index(db), driver)
}
