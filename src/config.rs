//! Centralized configuration for BridgeBase sessions.
//!
//! Every value has a compiled-in default and can be overridden through the
//! environment with [`BridgeConfig::from_env`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::gateway::DEFAULT_GATEWAY_PORT;

/// Default control-plane base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.bridgebase.dev";

/// Default relay read buffer (one chunk per read).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Control-plane URL could not be parsed or is not http(s).
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Duration value could not be parsed.
    #[error("invalid duration for {var}: '{value}': {message}")]
    InvalidDuration {
        var: String,
        value: String,
        message: String,
    },

    /// Any other malformed value.
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },
}

/// Fixed gateway target that bypasses the control plane.
///
/// Development only: the JWT is presented to the gateway as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOverride {
    pub host: String,
    pub port: u16,
}

impl GatewayOverride {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for GatewayOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Runtime configuration shared by every stage of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    // ─────────────────────────────────────────────────────────────────────────
    // Control plane
    // ─────────────────────────────────────────────────────────────────────────
    /// Base URL of the control-plane API
    pub api_base_url: String,

    /// Timeout for the resolve call (connect + response)
    pub resolve_timeout: Duration,

    // ─────────────────────────────────────────────────────────────────────────
    // Gateway
    // ─────────────────────────────────────────────────────────────────────────
    /// TCP connect timeout to the gateway
    pub connect_timeout: Duration,

    /// Timeout for the whole authentication handshake
    pub handshake_timeout: Duration,

    /// Wrap the gateway socket in TLS
    pub gateway_tls: bool,

    /// Skip the resolve call and dial this gateway directly
    pub gateway_override: Option<GatewayOverride>,

    // ─────────────────────────────────────────────────────────────────────────
    // Relay
    // ─────────────────────────────────────────────────────────────────────────
    /// Bytes read per chunk in each forwarding direction
    pub relay_buffer_size: usize,

    /// How long `stop()` waits for forwarding tasks before aborting them
    pub stop_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            resolve_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            gateway_tls: true,
            gateway_override: None,
            relay_buffer_size: DEFAULT_RELAY_BUFFER_SIZE,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Environment Variables
    ///
    /// - `BRIDGEBASE_API_URL` (default: `https://api.bridgebase.dev`)
    /// - `BRIDGEBASE_RESOLVE_TIMEOUT` (default: `10s`)
    /// - `BRIDGEBASE_CONNECT_TIMEOUT` (default: `10s`)
    /// - `BRIDGEBASE_HANDSHAKE_TIMEOUT` (default: `10s`)
    /// - `BRIDGEBASE_GATEWAY_TLS` (default: `true`)
    /// - `BRIDGEBASE_GATEWAY_HOST` (default: unset, resolve through the API)
    /// - `BRIDGEBASE_GATEWAY_PORT` (default: `3001`, needs `BRIDGEBASE_GATEWAY_HOST`)
    /// - `BRIDGEBASE_RELAY_BUFFER_SIZE` (default: `65536`)
    /// - `BRIDGEBASE_STOP_TIMEOUT` (default: `5s`)
    ///
    /// Durations use humantime syntax (`500ms`, `10s`, `1m`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`BridgeConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let api_base_url = match lookup("BRIDGEBASE_API_URL") {
            Some(url) => normalize_base_url(&url)?,
            None => default.api_base_url,
        };

        let relay_buffer_size = match lookup("BRIDGEBASE_RELAY_BUFFER_SIZE") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "BRIDGEBASE_RELAY_BUFFER_SIZE".to_string(),
                        value,
                    });
                }
            },
            None => default.relay_buffer_size,
        };

        let gateway_tls = match lookup("BRIDGEBASE_GATEWAY_TLS") {
            Some(value) => parse_bool("BRIDGEBASE_GATEWAY_TLS", &value)?,
            None => default.gateway_tls,
        };

        let gateway_override = parse_gateway_override(&lookup)?;

        Ok(Self {
            api_base_url,
            resolve_timeout: parse_duration_var(
                &lookup,
                "BRIDGEBASE_RESOLVE_TIMEOUT",
                default.resolve_timeout,
            )?,
            connect_timeout: parse_duration_var(
                &lookup,
                "BRIDGEBASE_CONNECT_TIMEOUT",
                default.connect_timeout,
            )?,
            handshake_timeout: parse_duration_var(
                &lookup,
                "BRIDGEBASE_HANDSHAKE_TIMEOUT",
                default.handshake_timeout,
            )?,
            gateway_tls,
            gateway_override,
            relay_buffer_size,
            stop_timeout: parse_duration_var(
                &lookup,
                "BRIDGEBASE_STOP_TIMEOUT",
                default.stop_timeout,
            )?,
        })
    }

    /// Replace the control-plane URL, validating it.
    pub fn with_api_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.api_base_url = normalize_base_url(url)?;
        Ok(self)
    }
}

/// Validate a control-plane base URL and strip trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    Ok(trimmed.to_string())
}

fn parse_duration_var<F>(lookup: &F, var: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => {
            humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
                var: var.to_string(),
                value: value.clone(),
                message: e.to_string(),
            })
        }
        None => Ok(default),
    }
}

fn parse_gateway_override<F>(lookup: &F) -> Result<Option<GatewayOverride>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup("BRIDGEBASE_GATEWAY_HOST").filter(|h| !h.trim().is_empty());
    let port = lookup("BRIDGEBASE_GATEWAY_PORT");

    let Some(host) = host else {
        return match port {
            Some(value) => Err(ConfigError::InvalidValue {
                var: "BRIDGEBASE_GATEWAY_PORT".to_string(),
                value,
            }),
            None => Ok(None),
        };
    };

    let port = match port {
        Some(value) => match value.trim().parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => {
                return Err(ConfigError::InvalidValue {
                    var: "BRIDGEBASE_GATEWAY_PORT".to_string(),
                    value,
                });
            }
        },
        None => DEFAULT_GATEWAY_PORT,
    };

    Ok(Some(GatewayOverride::new(host.trim(), port)))
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.gateway_tls);
        assert_eq!(config.relay_buffer_size, 65536);
    }

    #[test]
    fn test_env_overrides() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("BRIDGEBASE_API_URL", "http://127.0.0.1:8080/"),
            ("BRIDGEBASE_CONNECT_TIMEOUT", "250ms"),
            ("BRIDGEBASE_GATEWAY_TLS", "false"),
            ("BRIDGEBASE_RELAY_BUFFER_SIZE", "4096"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "http://127.0.0.1:8080");
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert!(!config.gateway_tls);
        assert_eq!(config.relay_buffer_size, 4096);
        assert_eq!(config.resolve_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let err = BridgeConfig::from_lookup(lookup_from(&[(
            "BRIDGEBASE_HANDSHAKE_TIMEOUT",
            "soon",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let err = BridgeConfig::from_lookup(lookup_from(&[(
            "BRIDGEBASE_RELAY_BUFFER_SIZE",
            "0",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_gateway_override() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("BRIDGEBASE_GATEWAY_HOST", "127.0.0.1"),
            ("BRIDGEBASE_GATEWAY_PORT", "4000"),
        ]))
        .unwrap();
        assert_eq!(
            config.gateway_override,
            Some(GatewayOverride::new("127.0.0.1", 4000))
        );

        let config =
            BridgeConfig::from_lookup(lookup_from(&[("BRIDGEBASE_GATEWAY_HOST", "gw.local")]))
                .unwrap();
        let target = config.gateway_override.unwrap();
        assert_eq!(target.port, DEFAULT_GATEWAY_PORT);
        assert_eq!(target.to_string(), "gw.local:3001");
    }

    #[test]
    fn test_gateway_override_rejects_bad_port() {
        for pairs in [
            &[("BRIDGEBASE_GATEWAY_PORT", "4000")][..],
            &[("BRIDGEBASE_GATEWAY_HOST", "gw"), ("BRIDGEBASE_GATEWAY_PORT", "0")][..],
            &[("BRIDGEBASE_GATEWAY_HOST", "gw"), ("BRIDGEBASE_GATEWAY_PORT", "http")][..],
        ] {
            let err = BridgeConfig::from_lookup(lookup_from(pairs)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{pairs:?}");
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_process_environment() {
        // SAFETY: serialized with every other test that touches the environment
        unsafe {
            std::env::set_var("BRIDGEBASE_STOP_TIMEOUT", "1500ms");
        }
        let config = BridgeConfig::from_env();
        unsafe {
            std::env::remove_var("BRIDGEBASE_STOP_TIMEOUT");
        }

        assert_eq!(config.unwrap().stop_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_base_url_validation() {
        assert_eq!(
            normalize_base_url("https://api.example.com///").unwrap(),
            "https://api.example.com"
        );
        assert!(normalize_base_url("ftp://api.example.com").is_err());
        assert!(normalize_base_url("not a url").is_err());
    }
}
