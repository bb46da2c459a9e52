//! Gateway transport: plain TCP or client-side TLS.
//!
//! `GatewayStream` lets the handshake and the relay treat both transports
//! as one `AsyncRead + AsyncWrite` type.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Transport to the gateway.
///
/// The TLS variant is boxed; `TlsStream` is much larger than `TcpStream`.
pub enum GatewayStream {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted connection
    Tls(Box<TlsStream<TcpStream>>),
}

impl GatewayStream {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, GatewayStream::Tls(_))
    }

    /// Remote address of the underlying TCP socket.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp_ref().peer_addr()
    }

    /// Negotiated TLS version, `None` for plain TCP.
    pub fn tls_version(&self) -> Option<&'static str> {
        match self {
            GatewayStream::Plain(_) => None,
            GatewayStream::Tls(tls) => tls.get_ref().1.protocol_version().map(|v| match v {
                rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2",
                rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3",
                _ => "TLS (unknown version)",
            }),
        }
    }

    fn tcp_ref(&self) -> &TcpStream {
        match self {
            GatewayStream::Plain(stream) => stream,
            GatewayStream::Tls(tls) => tls.get_ref().0,
        }
    }
}

impl AsyncRead for GatewayStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            GatewayStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            GatewayStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for GatewayStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            GatewayStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            GatewayStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            GatewayStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            GatewayStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            GatewayStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            GatewayStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_stream_passthrough() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut stream = GatewayStream::Plain(TcpStream::connect(addr).await.unwrap());
        assert!(!stream.is_encrypted());
        assert!(stream.tls_version().is_none());
        assert_eq!(stream.peer_addr().unwrap(), addr);

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.await.unwrap();
    }
}
