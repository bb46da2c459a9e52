//! Control-plane client that resolves a JWT to a gateway address.
//!
//! # Error Classification
//!
//! - HTTP 401/403, or a body `error` naming a bad token → `Auth`
//! - Unreachable, timed out, other non-2xx, malformed body → `GatewayResolution`
//!
//! # Security
//!
//! - The JWT travels only in the `Authorization` header
//! - No automatic retry and no caching: one call per `connect()`

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DEFAULT_GATEWAY_PORT, GatewayAddress, Ticket};
use crate::config::BridgeConfig;
use crate::credential::{Backend, Credential};
use crate::error::{BridgeError, BridgeResult};

/// Path of the resolve endpoint under the control-plane base URL.
pub const RESOLVE_PATH: &str = "/api/v1/gateway/resolve";

/// Body `error` values that mean the token itself was refused.
const AUTH_ERROR_CODES: &[&str] = &["invalid_token", "token_expired", "unauthorized"];

/// Adapter hints sent alongside the JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveHints {
    pub backend: Backend,
    pub cluster_id: Option<u128>,
    pub db_index: Option<i64>,
}

impl ResolveHints {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            cluster_id: None,
            db_index: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    db_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ResolveResponse {
    #[serde(default)]
    dns: Option<String>,
    #[serde(default)]
    gateway_host: Option<String>,
    #[serde(default)]
    port: Option<PortField>,
    #[serde(default)]
    gateway_port: Option<PortField>,
    #[serde(default)]
    ticket: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Port as sent by the control plane: a JSON number or a decimal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortField {
    Number(i64),
    Text(String),
}

impl PortField {
    fn to_port(&self) -> BridgeResult<u16> {
        let value = match self {
            PortField::Number(n) => *n,
            PortField::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                BridgeError::GatewayResolution(format!(
                    "malformed resolver response: port {:?} is not a number",
                    s
                ))
            })?,
        };
        match u16::try_from(value) {
            Ok(0) | Err(_) => Err(BridgeError::GatewayResolution(format!(
                "malformed resolver response: port {}",
                value
            ))),
            Ok(port) => Ok(port),
        }
    }
}

/// Control-plane resolver.
///
/// `Clone` is cheap; the underlying reqwest client pools connections.
#[derive(Clone)]
pub struct GatewayResolver {
    client: Client,
    base_url: String,
}

impl GatewayResolver {
    /// Build a resolver from the session configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayResolution` if the HTTP client cannot be built.
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(config.resolve_timeout)
            .connect_timeout(config.resolve_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                BridgeError::GatewayResolution(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve the gateway for `credential`.
    ///
    /// # Returns
    ///
    /// * `Ok(GatewayAddress)` - host, port and optional ticket
    /// * `Err(BridgeError::Auth)` - the control plane refused the token
    /// * `Err(BridgeError::GatewayResolution)` - anything else went wrong
    pub async fn resolve(
        &self,
        credential: &Credential,
        hints: &ResolveHints,
    ) -> BridgeResult<GatewayAddress> {
        let url = format!("{}{}", self.base_url, RESOLVE_PATH);

        debug!(url = %url, db_type = %hints.backend, "Resolving gateway");

        let body = ResolveRequest {
            db_type: hints.backend.as_str(),
            cluster_id: hints.cluster_id.map(|id| id.to_string()),
            db: hints.db_index,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "request timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "request failed"
                };
                warn!(url = %url, reason, "Control plane unreachable");
                BridgeError::GatewayResolution(format!(
                    "failed to reach gateway resolver: {}",
                    reason
                ))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            BridgeError::GatewayResolution(format!("failed to read resolver response: {}", e))
        })?;

        parse_resolve_response(status, &text)
    }
}

/// Classify a control-plane reply.
fn parse_resolve_response(status: StatusCode, body: &str) -> BridgeResult<GatewayAddress> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(BridgeError::Auth(format!(
            "JWT rejected by gateway resolver (HTTP {})",
            status.as_u16()
        )));
    }

    let parsed = serde_json::from_str::<ResolveResponse>(body);

    if let Ok(ResolveResponse {
        error: Some(code), ..
    }) = &parsed
    {
        return Err(classify_error_code(code, status));
    }

    if !status.is_success() {
        return Err(BridgeError::GatewayResolution(format!(
            "gateway resolver returned HTTP {}",
            status.as_u16()
        )));
    }

    let data = parsed.map_err(|e| {
        BridgeError::GatewayResolution(format!("malformed resolver response: {}", e))
    })?;

    // An empty `dns` falls through to `gateway_host`
    let host = data
        .dns
        .filter(|h| !h.trim().is_empty())
        .or(data.gateway_host.filter(|h| !h.trim().is_empty()))
        .ok_or_else(|| {
            BridgeError::GatewayResolution(
                "malformed resolver response: missing gateway host".to_string(),
            )
        })?;

    let port = match data.port.or(data.gateway_port) {
        Some(field) => field.to_port()?,
        None => DEFAULT_GATEWAY_PORT,
    };

    let mut address = GatewayAddress::new(host, port);
    if let Some(ticket) = data.ticket.filter(|t| !t.is_empty()) {
        address = address.with_ticket(Ticket::new(ticket));
    }

    debug!(gateway = %address, ticket = address.ticket.is_some(), "Resolved gateway");
    Ok(address)
}

fn classify_error_code(code: &str, status: StatusCode) -> BridgeError {
    if AUTH_ERROR_CODES
        .iter()
        .any(|auth| code.eq_ignore_ascii_case(auth))
    {
        BridgeError::Auth(format!("JWT rejected by gateway resolver ({})", code))
    } else {
        BridgeError::GatewayResolution(format!(
            "gateway resolver reported '{}' (HTTP {})",
            code,
            status.as_u16()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dns_field_preferred() {
        let address = parse_resolve_response(
            StatusCode::OK,
            r#"{"dns":"gw-1.bridgebase.dev","gateway_host":"10.0.0.1","port":9000}"#,
        )
        .unwrap();
        assert_eq!(address.host, "gw-1.bridgebase.dev");
        assert_eq!(address.port, 9000);
        assert!(address.ticket.is_none());
    }

    #[test]
    fn test_parse_gateway_host_and_default_port() {
        let address =
            parse_resolve_response(StatusCode::OK, r#"{"gateway_host":"10.0.0.5"}"#).unwrap();
        assert_eq!(address.host, "10.0.0.5");
        assert_eq!(address.port, DEFAULT_GATEWAY_PORT);
    }

    #[test]
    fn test_parse_gateway_port_and_ticket() {
        let address = parse_resolve_response(
            StatusCode::OK,
            r#"{"gateway_host":"10.0.0.5","gateway_port":9000,"ticket":"t-1"}"#,
        )
        .unwrap();
        assert_eq!(address.port, 9000);
        assert_eq!(address.ticket.unwrap().expose(), "t-1");
    }

    #[test]
    fn test_empty_dns_falls_back_to_gateway_host() {
        let address = parse_resolve_response(
            StatusCode::OK,
            r#"{"dns":"","gateway_host":"10.0.0.5","port":9000}"#,
        )
        .unwrap();
        assert_eq!(address.host, "10.0.0.5");
        assert_eq!(address.port, 9000);

        let address = parse_resolve_response(
            StatusCode::OK,
            r#"{"dns":null,"gateway_host":"10.0.0.6"}"#,
        )
        .unwrap();
        assert_eq!(address.host, "10.0.0.6");
    }

    #[test]
    fn test_string_port_accepted() {
        let address =
            parse_resolve_response(StatusCode::OK, r#"{"dns":"gw","port":"9000"}"#).unwrap();
        assert_eq!(address.host, "gw");
        assert_eq!(address.port, 9000);

        let address =
            parse_resolve_response(StatusCode::OK, r#"{"dns":"gw","gateway_port":" 4242 "}"#)
                .unwrap();
        assert_eq!(address.port, 4242);
    }

    #[test]
    fn test_unauthorized_is_auth() {
        let err = parse_resolve_response(StatusCode::UNAUTHORIZED, "").unwrap_err();
        assert!(err.is_auth());

        let err = parse_resolve_response(StatusCode::FORBIDDEN, "nope").unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_body_token_error_is_auth() {
        let err = parse_resolve_response(StatusCode::OK, r#"{"error":"token_expired"}"#)
            .unwrap_err();
        assert!(err.is_auth());

        let err = parse_resolve_response(StatusCode::BAD_REQUEST, r#"{"error":"invalid_token"}"#)
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_other_body_error_is_resolution() {
        let err = parse_resolve_response(StatusCode::OK, r#"{"error":"no_capacity"}"#)
            .unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn test_server_error_is_resolution() {
        let err = parse_resolve_response(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert!(err.is_resolution());
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_malformed_bodies() {
        for body in [
            "not json",
            "{}",
            r#"{"gateway_host":""}"#,
            r#"{"dns":"","gateway_host":" "}"#,
            r#"{"dns":"gw","port":0}"#,
            r#"{"dns":"gw","port":"0"}"#,
            r#"{"dns":"gw","port":"http"}"#,
            r#"{"dns":"gw","port":70000}"#,
            r#"{"dns":"gw","port":-1}"#,
            r#"{"dns":"gw","port":true}"#,
        ] {
            let err = parse_resolve_response(StatusCode::OK, body).unwrap_err();
            assert!(err.is_resolution(), "body {:?} gave {:?}", body, err);
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = ResolveRequest {
            db_type: "tigerbeetle",
            cluster_id: Some(u128::MAX.to_string()),
            db: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["db_type"], "tigerbeetle");
        assert_eq!(json["cluster_id"], u128::MAX.to_string());
        assert!(json.get("db").is_none());
    }
}
