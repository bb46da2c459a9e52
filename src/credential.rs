//! Credential carrier and per-session options.

use std::fmt;

use crate::config::{BridgeConfig, ConfigError, GatewayOverride, normalize_base_url};

/// Opaque bearer JWT.
///
/// The token is never decoded. `Debug` and `Display` redact it so it can't
/// leak into logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a pre-signed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the Authorization header and the handshake frame.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED; {} bytes])", self.0.len())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

/// Backend kind, sent to the control plane as the `db_type` hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Redis or Valkey
    Redis,
    /// TigerBeetle ledger
    TigerBeetle,
    /// Any other backend, passed through verbatim
    Other(String),
}

impl Backend {
    pub fn as_str(&self) -> &str {
        match self {
            Backend::Redis => "redis",
            Backend::TigerBeetle => "tigerbeetle",
            Backend::Other(kind) => kind,
        }
    }

    /// Human-friendly label for log lines.
    pub fn label(&self) -> &str {
        match self {
            Backend::Redis => "Redis",
            Backend::TigerBeetle => "TigerBeetle",
            Backend::Other(kind) => kind,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-specific options for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// TigerBeetle cluster id
    pub cluster_id: Option<u128>,
    /// Redis logical database index
    pub db_index: Option<i64>,
    /// Runtime configuration (control-plane URL, timeouts, TLS)
    pub config: BridgeConfig,
}

impl SessionOptions {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Override the control-plane URL for this session only.
    pub fn api_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.config.api_base_url = normalize_base_url(url)?;
        Ok(self)
    }

    pub fn cluster_id(mut self, cluster_id: u128) -> Self {
        self.cluster_id = Some(cluster_id);
        self
    }

    pub fn db_index(mut self, db: i64) -> Self {
        self.db_index = Some(db);
        self
    }

    pub fn gateway_tls(mut self, enabled: bool) -> Self {
        self.config.gateway_tls = enabled;
        self
    }

    /// Dial `host:port` directly instead of asking the control plane.
    pub fn gateway_override(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.gateway_override = Some(GatewayOverride::new(host, port));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_is_redacted() {
        let credential = Credential::new("eyJhbGciOiJIUzI1NiJ9.secret.sig");
        let debug = format!("{:?}", credential);
        let display = credential.to_string();

        assert!(!debug.contains("secret"));
        assert!(!display.contains("secret"));
        assert!(debug.contains("REDACTED"));
        assert_eq!(credential.expose(), "eyJhbGciOiJIUzI1NiJ9.secret.sig");
    }

    #[test]
    fn test_blank_credential_is_empty() {
        assert!(Credential::new("").is_empty());
        assert!(Credential::new("   ").is_empty());
        assert!(!Credential::new("t").is_empty());
    }

    #[test]
    fn test_backend_hint_strings() {
        assert_eq!(Backend::Redis.as_str(), "redis");
        assert_eq!(Backend::TigerBeetle.as_str(), "tigerbeetle");
        assert_eq!(Backend::Other("valkey".to_string()).as_str(), "valkey");
        assert_eq!(Backend::TigerBeetle.label(), "TigerBeetle");
    }

    #[test]
    fn test_options_builder() {
        let options = SessionOptions::default()
            .cluster_id(7)
            .db_index(3)
            .gateway_tls(false)
            .gateway_override("127.0.0.1", 4000)
            .api_base_url("http://localhost:9000/")
            .unwrap();

        assert_eq!(options.cluster_id, Some(7));
        assert_eq!(options.db_index, Some(3));
        assert!(!options.config.gateway_tls);
        assert_eq!(options.config.api_base_url, "http://localhost:9000");
        assert_eq!(
            options.config.gateway_override,
            Some(GatewayOverride::new("127.0.0.1", 4000))
        );
    }
}
