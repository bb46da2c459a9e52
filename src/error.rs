//! Error types for BridgeBase sessions.
//!
//! Every failure surfaced to a caller is a [`BridgeError`]. The variants map
//! one-to-one onto the stage that failed so callers can branch on "bad token"
//! versus "control plane unreachable" versus "relay broke mid-stream".
//!
//! Messages never carry the JWT or the gateway ticket.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while establishing or running a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The credential was rejected by the control plane or the gateway.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The control-plane resolve call failed for reasons other than auth.
    ///
    /// This is a specialization of [`BridgeError::Gateway`]; see
    /// [`BridgeError::is_gateway`].
    #[error("Gateway resolution failed: {0}")]
    GatewayResolution(String),

    /// Connecting to or handshaking with the gateway failed.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// The native driver could not connect to the local relay.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The local relay failed to bind, or a forwarding pair failed.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// The operation is not valid in the session's current state.
    #[error("Invalid session state: {0}")]
    State(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Returns `true` for the authentication kind.
    pub fn is_auth(&self) -> bool {
        matches!(self, BridgeError::Auth(_))
    }

    /// Returns `true` for gateway failures, including resolution failures.
    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            BridgeError::Gateway(_) | BridgeError::GatewayResolution(_)
        )
    }

    /// Returns `true` only for control-plane resolution failures.
    pub fn is_resolution(&self) -> bool {
        matches!(self, BridgeError::GatewayResolution(_))
    }

    /// Returns `true` for relay failures.
    pub fn is_proxy(&self) -> bool {
        matches!(self, BridgeError::Proxy(_))
    }

    /// Returns `true` for native-driver connection failures.
    pub fn is_connection(&self) -> bool {
        matches!(self, BridgeError::Connection(_))
    }

    /// Returns `true` for invalid-state failures.
    pub fn is_state(&self) -> bool {
        matches!(self, BridgeError::State(_))
    }
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        BridgeError::Config(err.to_string())
    }
}

/// Result type alias for session operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_specializes_gateway() {
        let err = BridgeError::GatewayResolution("HTTP 502".to_string());
        assert!(err.is_gateway());
        assert!(err.is_resolution());
        assert!(!err.is_auth());

        let err = BridgeError::Gateway("refused".to_string());
        assert!(err.is_gateway());
        assert!(!err.is_resolution());
    }

    #[test]
    fn test_auth_is_not_gateway() {
        let err = BridgeError::Auth("JWT rejected".to_string());
        assert!(err.is_auth());
        assert!(!err.is_gateway());
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            BridgeError::Proxy("bind failed".to_string()).to_string(),
            "Proxy error: bind failed"
        );
        assert_eq!(
            BridgeError::State("session closed".to_string()).to_string(),
            "Invalid session state: session closed"
        );
    }

    #[test]
    fn test_config_error_converts() {
        let err: BridgeError = ConfigError::InvalidUrl {
            url: "not a url".to_string(),
            message: "relative URL without a base".to_string(),
        }
        .into();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
