//! BridgeBase - tunnel native database drivers through an authenticated
//! gateway.
//!
//! A [`Session`] resolves a gateway for a signed credential, opens an
//! authenticated socket to it, and binds a loopback relay. The native driver
//! connects to `127.0.0.1:<port>` and never learns a gateway is involved.
//!
//! ```ignore
//! use bridgebase::{Backend, SessionOptions, adapters};
//!
//! let mut session = adapters::endpoint(jwt, Backend::Redis, SessionOptions::default());
//! let local = *session.connect().await?;
//! // point any Redis client at `local`
//! session.close().await;
//! ```

pub mod adapters;
pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod relay;
pub mod session;

pub use config::{BridgeConfig, ConfigError, GatewayOverride};
pub use credential::{Backend, Credential, SessionOptions};
pub use error::{BridgeError, BridgeResult};
pub use relay::{Relay, RelayConfig, RelayStats, RelayStatus};
pub use session::{NativeDriver, Session, SessionState};
