//! Bidirectional forwarding between the driver leg and the gateway leg.
//!
//! Each direction runs in its own task and only ever waits on its own read,
//! its own write, or the pair's cancellation token. Cancelling the token
//! interrupts both, and dropping the split halves closes both sockets.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::status::RelayStatus;
use crate::gateway::GatewayStream;

/// Forwarding direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToGateway,
    GatewayToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToGateway => f.write_str("client->gateway"),
            Direction::GatewayToClient => f.write_str("gateway->client"),
        }
    }
}

/// How one direction finished.
#[derive(Debug)]
pub(crate) enum PumpEnd {
    /// Reader hit EOF; the writer was shut down.
    Eof(u64),
    /// The pair was cancelled.
    Cancelled(u64),
    /// Read or write failed.
    Failed(io::Error),
}

/// Copy `reader` into `writer` until EOF, error, or cancellation.
///
/// A zero-length read is EOF and ends the loop. Every chunk is written in
/// full and flushed before the next read.
pub(crate) async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    buffer_size: usize,
    cancel: &CancellationToken,
    status: &RelayStatus,
) -> PumpEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpEnd::Cancelled(total),
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {}
                        _ = writer.shutdown() => {}
                    }
                    debug!(%direction, bytes = total, "EOF");
                    return PumpEnd::Eof(total);
                }
                Ok(n) => n,
                Err(e) => return PumpEnd::Failed(e),
            },
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpEnd::Cancelled(total),
            written = async {
                writer.write_all(&buf[..n]).await?;
                writer.flush().await
            } => written,
        };
        if let Err(e) = written {
            return PumpEnd::Failed(e);
        }

        trace!(%direction, bytes = n, "forwarded");
        total += n as u64;
        status.add_bytes(direction, n as u64);
    }
}

/// Forward between one accepted driver connection and the gateway stream
/// until the pair ends, then release both legs.
///
/// - client EOF half-closes the gateway leg; the gateway may keep answering
/// - gateway EOF ends the session: the client leg is shut down and the pair
///   cancelled
/// - any I/O error is recorded as the relay fault and cancels the pair
pub(crate) async fn run_pair(
    client: TcpStream,
    gateway: GatewayStream,
    cancel: CancellationToken,
    status: Arc<RelayStatus>,
    buffer_size: usize,
) {
    status.pair_started();

    let (client_read, client_write) = client.into_split();
    let (gateway_read, gateway_write) = tokio::io::split(gateway);

    let upstream = tokio::spawn(direction_task(
        client_read,
        gateway_write,
        Direction::ClientToGateway,
        buffer_size,
        cancel.clone(),
        Arc::clone(&status),
    ));

    let downstream = tokio::spawn(direction_task(
        gateway_read,
        client_write,
        Direction::GatewayToClient,
        buffer_size,
        cancel.clone(),
        Arc::clone(&status),
    ));

    let (up, down) = tokio::join!(upstream, downstream);
    if let Err(e) = up {
        warn!(error = %e, "client->gateway task did not complete");
    }
    if let Err(e) = down {
        warn!(error = %e, "gateway->client task did not complete");
    }

    // Both halves of both legs are dropped by now
    cancel.cancel();
    status.pair_ended();

    let stats = status.snapshot();
    debug!(
        bytes_to_gateway = stats.bytes_to_gateway,
        bytes_to_client = stats.bytes_to_client,
        "Relay pair closed"
    );
}

async fn direction_task<R, W>(
    reader: R,
    writer: W,
    direction: Direction,
    buffer_size: usize,
    cancel: CancellationToken,
    status: Arc<RelayStatus>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match pump(reader, writer, direction, buffer_size, &cancel, &status).await {
        PumpEnd::Eof(bytes) if direction == Direction::GatewayToClient => {
            debug!(bytes, "Gateway closed the session");
            cancel.cancel();
        }
        PumpEnd::Eof(bytes) => {
            debug!(bytes, "Client closed its write side");
        }
        PumpEnd::Cancelled(bytes) => {
            trace!(%direction, bytes, "cancelled");
        }
        PumpEnd::Failed(e) => {
            warn!(%direction, error = %e, "Relay forwarding failed");
            status.record_fault(format!("{} failed: {}", direction, e));
            cancel.cancel();
        }
    }
}
