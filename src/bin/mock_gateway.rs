//! Local stand-in for the BridgeBase control plane and gateway.
//!
//! Serves `POST /api/v1/gateway/resolve` and a plain-TCP gateway that checks
//! the handshake token and forwards accepted sessions to `--backend`.
//!
//! ```text
//! mock_gateway --backend 127.0.0.1:6379 --token dev-token
//! BRIDGEBASE_API_URL=http://127.0.0.1:8080 bridgebase tunnel --no-tls --token dev-token
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use bridgebase::gateway::handshake::{self, HandshakeReply, HandshakeStatus};
use bridgebase::gateway::resolver::RESOLVE_PATH;
use clap::Parser;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};

#[derive(Parser, Debug, Clone)]
#[command(about = "Fake BridgeBase control plane and gateway for local testing")]
struct Args {
    /// Control-plane listen address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    api_addr: SocketAddr,

    /// Gateway listen address.
    #[arg(long, default_value = "127.0.0.1:3001")]
    gateway_addr: SocketAddr,

    /// Backend every accepted session is forwarded to.
    #[arg(long)]
    backend: SocketAddr,

    /// Only JWT the control plane accepts.
    #[arg(long, default_value = "dev-token")]
    token: String,

    /// Issue this ticket instead of letting the client present the JWT.
    #[arg(long)]
    ticket: Option<String>,
}

struct Shared {
    args: Args,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let shared = Arc::new(Shared { args: args.clone() });

    let gateway = TcpListener::bind(args.gateway_addr).await.map_err(|e| {
        tracing::error!("Failed to bind gateway to {}: {}", args.gateway_addr, e);
        e
    })?;
    tracing::info!("Mock gateway listening on {}", args.gateway_addr);
    tokio::spawn(serve_gateway(gateway, Arc::clone(&shared)));

    let app = Router::new()
        .route(RESOLVE_PATH, post(resolve))
        .with_state(shared);

    let listener = TcpListener::bind(args.api_addr).await.map_err(|e| {
        tracing::error!("Failed to bind control plane to {}: {}", args.api_addr, e);
        e
    })?;
    tracing::info!("Mock control plane listening on {}", args.api_addr);

    axum::serve(listener, app).await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        e
    })?;

    Ok(())
}

async fn resolve(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if bearer != Some(shared.args.token.as_str()) {
        tracing::info!("Rejected resolve request: bad token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_token" })),
        );
    }

    tracing::info!(db_type = %body["db_type"], "Resolved gateway");

    let mut response = json!({
        "gateway_host": shared.args.gateway_addr.ip().to_string(),
        "gateway_port": shared.args.gateway_addr.port(),
    });
    if let Some(ticket) = shared.args.ticket.as_ref() {
        response["ticket"] = json!(ticket);
    }
    (StatusCode::OK, Json(response))
}

async fn serve_gateway(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Gateway accept failed: {}", e);
                continue;
            }
        };
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            if let Err(e) = handle_session(socket, &shared).await {
                tracing::warn!(%peer, "Gateway session ended with error: {}", e);
            }
        });
    }
}

async fn handle_session(
    mut socket: TcpStream,
    shared: &Shared,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let presented = handshake::read_hello(&mut socket).await?;
    let expected = shared
        .args
        .ticket
        .as_deref()
        .unwrap_or(shared.args.token.as_str());

    if presented != expected.as_bytes() {
        let reply = HandshakeReply::rejected(HandshakeStatus::AuthRejected, "invalid token");
        handshake::write_reply(&mut socket, &reply).await?;
        return Ok(());
    }

    let mut backend = match TcpStream::connect(shared.args.backend).await {
        Ok(stream) => stream,
        Err(e) => {
            let reply = HandshakeReply::rejected(HandshakeStatus::Refused, "backend unavailable");
            handshake::write_reply(&mut socket, &reply).await?;
            return Err(e.into());
        }
    };

    handshake::write_reply(&mut socket, &HandshakeReply::accepted()).await?;
    tracing::info!(backend = %shared.args.backend, "Session accepted");

    let (up, down) = tokio::io::copy_bidirectional(&mut socket, &mut backend).await?;
    tracing::info!(bytes_up = up, bytes_down = down, "Session closed");
    Ok(())
}
