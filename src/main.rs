//! BridgeBase CLI.
//!
//! `bridgebase tunnel` opens a session with the raw endpoint adapter and
//! keeps the loopback relay open until Ctrl-C, so any external client
//! (redis-cli, the TigerBeetle REPL) can use it.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bridgebase::gateway::DEFAULT_GATEWAY_PORT;
use bridgebase::{Backend, BridgeConfig, BridgeError, GatewayOverride, SessionOptions, adapters};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

/// How often the tunnel checks whether the gateway ended the session.
const WATCH_INTERVAL: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// CLI Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// BridgeBase: reach a database through an authenticated gateway.
#[derive(Parser)]
#[command(name = "bridgebase", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a tunnel and expose it on a loopback port.
    Tunnel(TunnelArgs),
}

#[derive(clap::Args, Debug)]
struct TunnelArgs {
    /// Signed JWT issued for the target database.
    #[arg(long, env = "BRIDGEBASE_TOKEN", hide_env_values = true)]
    token: String,

    /// Backend kind sent to the control plane.
    #[arg(long, value_enum, default_value_t = Kind::Raw)]
    kind: Kind,

    /// Control-plane base URL. Overrides BRIDGEBASE_API_URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Connect to the gateway over plain TCP.
    #[arg(long)]
    no_tls: bool,

    /// Development: dial this gateway host directly, skipping the resolve call.
    #[arg(long)]
    gateway_host: Option<String>,

    /// Port for --gateway-host.
    #[arg(long, requires = "gateway_host", default_value_t = DEFAULT_GATEWAY_PORT)]
    gateway_port: u16,

    /// TigerBeetle cluster id hint.
    #[arg(long)]
    cluster_id: Option<u128>,

    /// Redis database index hint.
    #[arg(long)]
    db: Option<i64>,

    /// Write the local relay port to this file once the tunnel is ready.
    #[arg(long)]
    port_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Redis,
    Tigerbeetle,
    Raw,
}

impl From<Kind> for Backend {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Redis => Backend::Redis,
            Kind::Tigerbeetle => Backend::TigerBeetle,
            Kind::Raw => Backend::Other("raw".to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let result = match cli.command {
        Commands::Tunnel(args) => run_tunnel(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "tunnel failed");
            eprintln!("bridgebase tunnel: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_tunnel(args: TunnelArgs) -> Result<(), BridgeError> {
    let mut config = BridgeConfig::from_env()?;
    if let Some(url) = args.api_url.as_deref() {
        config = config.with_api_base_url(url)?;
    }
    if args.no_tls {
        config.gateway_tls = false;
    }
    if let Some(host) = args.gateway_host {
        config.gateway_override = Some(GatewayOverride::new(host, args.gateway_port));
    }

    let mut options = SessionOptions::new(config);
    options.cluster_id = args.cluster_id;
    options.db_index = args.db;

    let mut session = adapters::endpoint(args.token, args.kind.into(), options);
    let local = *session.connect().await?;

    if let Some(path) = args.port_file.as_ref() {
        if let Err(e) = tokio::fs::write(path, local.port().to_string()).await {
            session.close().await;
            return Err(BridgeError::Config(format!(
                "failed to write port file {}: {}",
                path.display(),
                e
            )));
        }
    }

    println!("{local}");
    info!(session_id = %session.id(), local_addr = %local, "Tunnel open, press Ctrl-C to close");

    let mut watch = tokio::time::interval(WATCH_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("Closing tunnel");
                break;
            }
            _ = watch.tick() => {
                let ended = session
                    .relay_status()
                    .is_some_and(|stats| stats.driver_connected && !stats.pair_active);
                if ended {
                    info!("Gateway session ended");
                    break;
                }
            }
        }
    }

    session.close().await;

    if let Some(path) = args.port_file.as_ref() {
        let _ = tokio::fs::remove_file(path).await;
    }

    match session.relay_fault() {
        Some(fault) => Err(fault),
        None => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracing Init
// ─────────────────────────────────────────────────────────────────────────────

/// Respects `RUST_LOG`, defaulting to `info`. Logs go to stderr so stdout
/// carries only the relay address.
fn init_tracing(json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
