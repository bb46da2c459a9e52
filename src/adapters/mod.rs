//! Backend adapters.
//!
//! Each adapter is a factory returning a [`Session`](crate::Session) whose
//! driver builds the caller's native client against the relay. The crate does
//! not link any database client library: the caller passes the constructor,
//! which receives a backend-specific target describing where to connect.

pub mod endpoint;
pub mod redis;
pub mod tigerbeetle;

pub use endpoint::{EndpointDriver, endpoint};
pub use redis::{RedisDriver, RedisTarget, redis};
pub use tigerbeetle::{TigerBeetleDriver, TigerBeetleTarget, tigerbeetle};

use futures_util::future::BoxFuture;

use crate::error::BridgeError;

/// Future returned by a native client constructor.
pub type ConnectFuture<C> = BoxFuture<'static, crate::error::BridgeResult<C>>;

/// Constructor for a native client of type `C` from target `T`.
pub type ConnectFn<T, C> = Box<dyn Fn(T) -> ConnectFuture<C> + Send + Sync>;

/// Report a native connect failure as `Connection`, whatever the
/// constructor returned.
pub(crate) fn connection_error(label: &str, err: BridgeError) -> BridgeError {
    match err {
        BridgeError::Connection(_) => err,
        other => BridgeError::Connection(format!("{} connection failed: {}", label, other)),
    }
}
