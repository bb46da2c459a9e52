//! Gateway authentication handshake wire format.
//!
//! ```text
//! client → gateway   [u32 BE token_len][token bytes]
//! gateway → client   [u8 status][u16 BE reason_len][reason bytes, UTF-8]
//! ```
//!
//! Status `0x00` accepts the session; after the reply the socket carries
//! opaque backend bytes in both directions.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest token accepted in the hello frame.
pub const MAX_TOKEN_SIZE: usize = 8192;

/// Largest reason string accepted in a reply.
pub const MAX_REASON_SIZE: usize = 1024;

const STATUS_ACCEPTED: u8 = 0x00;
const STATUS_AUTH_REJECTED: u8 = 0x01;
const STATUS_REFUSED: u8 = 0x02;

const REPLY_HEADER_LEN: usize = 3;

/// Handshake errors.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("token is empty")]
    EmptyToken,

    #[error("token too large: {size} bytes (max {max})")]
    TokenTooLarge { size: usize, max: usize },

    #[error("unexpected handshake status 0x{0:02x}")]
    UnknownStatus(u8),

    #[error("handshake reason too long: {0} bytes")]
    ReasonTooLong(usize),

    #[error("handshake reason is not valid UTF-8")]
    InvalidReason,

    #[error("handshake I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Gateway verdict on a hello frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// Session authenticated, socket ready for relaying
    Accepted,
    /// Token invalid, expired or revoked
    AuthRejected,
    /// Refused for any other reason (capacity, backend down)
    Refused,
}

impl HandshakeStatus {
    fn from_byte(b: u8) -> Result<Self, HandshakeError> {
        match b {
            STATUS_ACCEPTED => Ok(Self::Accepted),
            STATUS_AUTH_REJECTED => Ok(Self::AuthRejected),
            STATUS_REFUSED => Ok(Self::Refused),
            other => Err(HandshakeError::UnknownStatus(other)),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Self::Accepted => STATUS_ACCEPTED,
            Self::AuthRejected => STATUS_AUTH_REJECTED,
            Self::Refused => STATUS_REFUSED,
        }
    }
}

/// Decoded gateway reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReply {
    pub status: HandshakeStatus,
    pub reason: String,
}

impl HandshakeReply {
    pub fn accepted() -> Self {
        Self {
            status: HandshakeStatus::Accepted,
            reason: String::new(),
        }
    }

    pub fn rejected(status: HandshakeStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// Build the hello frame for `token`.
pub fn encode_hello(token: &[u8]) -> Result<Bytes, HandshakeError> {
    if token.is_empty() {
        return Err(HandshakeError::EmptyToken);
    }
    if token.len() > MAX_TOKEN_SIZE {
        return Err(HandshakeError::TokenTooLarge {
            size: token.len(),
            max: MAX_TOKEN_SIZE,
        });
    }

    let mut frame = BytesMut::with_capacity(4 + token.len());
    frame.put_u32(token.len() as u32);
    frame.put_slice(token);
    Ok(frame.freeze())
}

/// Build a reply frame. Reasons are truncated to [`MAX_REASON_SIZE`] on a
/// character boundary.
pub fn encode_reply(reply: &HandshakeReply) -> Bytes {
    let mut end = reply.reason.len().min(MAX_REASON_SIZE);
    while !reply.reason.is_char_boundary(end) {
        end -= 1;
    }
    let reason = &reply.reason.as_bytes()[..end];

    let mut frame = BytesMut::with_capacity(REPLY_HEADER_LEN + reason.len());
    frame.put_u8(reply.status.as_byte());
    frame.put_u16(reason.len() as u16);
    frame.put_slice(reason);
    frame.freeze()
}

/// Decode a reply from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the reply and the
/// number of bytes it occupied.
pub fn decode_reply(buf: &[u8]) -> Result<Option<(HandshakeReply, usize)>, HandshakeError> {
    if buf.len() < REPLY_HEADER_LEN {
        return Ok(None);
    }

    let status = HandshakeStatus::from_byte(buf[0])?;
    let reason_len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
    if reason_len > MAX_REASON_SIZE {
        return Err(HandshakeError::ReasonTooLong(reason_len));
    }

    let total = REPLY_HEADER_LEN + reason_len;
    if buf.len() < total {
        return Ok(None);
    }

    let reason = std::str::from_utf8(&buf[REPLY_HEADER_LEN..total])
        .map_err(|_| HandshakeError::InvalidReason)?
        .to_string();

    Ok(Some((HandshakeReply { status, reason }, total)))
}

/// Send the hello frame and wait for the gateway's verdict.
///
/// Reads exactly the reply bytes, never past them, so backend bytes that
/// follow an accept stay in the socket for the relay.
pub async fn perform<S>(stream: &mut S, token: &[u8]) -> Result<HandshakeReply, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = encode_hello(token)?;
    stream.write_all(&hello).await?;
    stream.flush().await?;

    read_reply(stream).await
}

/// Read one reply frame.
///
/// The header is checked by [`decode_reply`] before any reason byte is read,
/// so an oversized length never allocates.
pub async fn read_reply<R>(reader: &mut R) -> Result<HandshakeReply, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = vec![0u8; REPLY_HEADER_LEN];
    reader.read_exact(&mut frame).await?;

    if let Some((reply, _)) = decode_reply(&frame)? {
        return Ok(reply);
    }

    let reason_len = u16::from_be_bytes([frame[1], frame[2]]) as usize;
    frame.resize(REPLY_HEADER_LEN + reason_len, 0);
    reader.read_exact(&mut frame[REPLY_HEADER_LEN..]).await?;

    match decode_reply(&frame)? {
        Some((reply, _)) => Ok(reply),
        None => Err(HandshakeError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "incomplete reply frame",
        ))),
    }
}

/// Gateway side: read one hello frame and return the presented token.
pub async fn read_hello<R>(reader: &mut R) -> Result<Vec<u8>, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len == 0 {
        return Err(HandshakeError::EmptyToken);
    }
    if len > MAX_TOKEN_SIZE {
        return Err(HandshakeError::TokenTooLarge {
            size: len,
            max: MAX_TOKEN_SIZE,
        });
    }

    let mut token = vec![0u8; len];
    reader.read_exact(&mut token).await?;
    Ok(token)
}

/// Gateway side: send a reply frame.
pub async fn write_reply<W>(writer: &mut W, reply: &HandshakeReply) -> Result<(), HandshakeError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_reply(reply)).await?;
    writer.flush().await?;
    Ok(())
}
