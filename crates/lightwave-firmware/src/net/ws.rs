//! Minimal RFC 6455 server side.
//!
//! Only unfragmented frames are accepted. Client frames must be masked;
//! server frames never are.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use embassy_net::tcp::TcpSocket;
use embedded_io_async::{Read as _, Write as _};
use sha1::{Digest, Sha1};

use super::http::headers::{ACCEPT_KEY_LEN, AcceptKey};

const HANDSHAKE_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const FIN: u8 = 0x80;
const MASKED: u8 = 0x80;

pub(crate) const CLOSE_NORMAL: u16 = 1000;
pub(crate) const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub(crate) const CLOSE_INVALID_DATA: u16 = 1007;
pub(crate) const CLOSE_TOO_BIG: u16 = 1009;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Opcode {
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            _ => return None,
        })
    }

    fn bits(self) -> u8 {
        match self {
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }
}

#[derive(Debug)]
pub(crate) enum WsError {
    Closed,
    /// Continuation, reserved opcode or unmasked client frame.
    Protocol,
    /// Payload larger than the frame buffer.
    TooBig,
}

impl WsError {
    pub(crate) fn close_code(&self) -> u16 {
        match self {
            WsError::Closed => CLOSE_NORMAL,
            WsError::Protocol => CLOSE_PROTOCOL_ERROR,
            WsError::TooBig => CLOSE_TOO_BIG,
        }
    }
}

impl From<embassy_net::tcp::Error> for WsError {
    fn from(_err: embassy_net::tcp::Error) -> Self {
        WsError::Closed
    }
}

/// One received frame, payload unmasked in the caller's buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub opcode: Opcode,
    pub len: usize,
}

/// `Sec-WebSocket-Accept` for a client key.
pub(crate) fn accept_key(client_key: &str) -> AcceptKey {
    let mut sha = Sha1::new();
    sha.update(client_key.trim().as_bytes());
    sha.update(HANDSHAKE_GUID);
    let digest = sha.finalize();

    let mut encoded = [0u8; ACCEPT_KEY_LEN];
    let mut accept = AcceptKey::new();
    if let Ok(len) = STANDARD.encode_slice(digest, &mut encoded)
        && let Ok(text) = core::str::from_utf8(&encoded[..len])
    {
        let _ = accept.push_str(text);
    }
    accept
}

pub(crate) async fn read_frame(socket: &mut TcpSocket<'_>, buf: &mut [u8]) -> Result<Frame, WsError> {
    let mut head = [0u8; 2];
    read_exact(socket, &mut head).await?;
    if head[0] & FIN == 0 || head[1] & MASKED == 0 {
        return Err(WsError::Protocol);
    }
    let opcode = Opcode::from_bits(head[0] & 0x0F).ok_or(WsError::Protocol)?;

    let len = match head[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            read_exact(socket, &mut ext).await?;
            u64::from(u16::from_be_bytes(ext))
        }
        127 => {
            let mut ext = [0u8; 8];
            read_exact(socket, &mut ext).await?;
            u64::from_be_bytes(ext)
        }
        short => u64::from(short),
    };
    let len = usize::try_from(len).map_err(|_| WsError::TooBig)?;
    if len > buf.len() {
        return Err(WsError::TooBig);
    }

    let mut mask = [0u8; 4];
    read_exact(socket, &mut mask).await?;
    let payload = &mut buf[..len];
    read_exact(socket, payload).await?;
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }

    Ok(Frame { opcode, len })
}

pub(crate) async fn write_frame(
    socket: &mut TcpSocket<'_>,
    opcode: Opcode,
    payload: &[u8],
) -> Result<(), WsError> {
    let mut head = [0u8; 4];
    head[0] = FIN | opcode.bits();
    let head_len = match u16::try_from(payload.len()) {
        Ok(len) if len < 126 => {
            #[allow(clippy::cast_possible_truncation)]
            {
                head[1] = len as u8;
            }
            2
        }
        Ok(len) => {
            head[1] = 126;
            head[2..4].copy_from_slice(&len.to_be_bytes());
            4
        }
        Err(_) => return Err(WsError::TooBig),
    };

    socket.write_all(&head[..head_len]).await?;
    socket.write_all(payload).await?;
    socket.flush().await?;
    Ok(())
}

pub(crate) async fn write_close(socket: &mut TcpSocket<'_>, code: u16) -> Result<(), WsError> {
    write_frame(socket, Opcode::Close, &code.to_be_bytes()).await
}

async fn read_exact(socket: &mut TcpSocket<'_>, buf: &mut [u8]) -> Result<(), WsError> {
    socket.read_exact(buf).await.map_err(|_| WsError::Closed)
}
