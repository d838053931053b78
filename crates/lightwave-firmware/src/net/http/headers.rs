use core::fmt;

use embassy_net::tcp::{Error as TcpError, TcpSocket};
use heapless::String;

pub(crate) type StatusCode = u16;

/// Length of a `Sec-WebSocket-Accept` value.
pub(crate) const ACCEPT_KEY_LEN: usize = 28;

pub(crate) type AcceptKey = String<ACCEPT_KEY_LEN>;

fn reason_phrase(code: StatusCode) -> &'static str {
    match code {
        101 => "Switching Protocols",
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        409 => "Conflict",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Body media type of a response.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ContentType {
    Json,
    TextPlain,
}

impl ContentType {
    fn mime(self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::TextPlain => "text/plain; charset=utf-8",
        }
    }
}

/// Status line and header block of a response.
pub(crate) struct ResponseHeaders {
    status: StatusCode,
    body: Option<(ContentType, usize)>,
    /// Set only on a `101` WebSocket handshake.
    accept: Option<AcceptKey>,
}

impl ResponseHeaders {
    pub(crate) const fn from_code(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            accept: None,
        }
    }

    pub(crate) const fn not_found() -> Self {
        Self::from_code(404)
    }

    pub(crate) const fn bad_request() -> Self {
        Self::from_code(400)
    }

    /// `101` reply completing a WebSocket handshake.
    pub(crate) fn websocket_upgrade(accept: AcceptKey) -> Self {
        Self {
            status: 101,
            body: None,
            accept: Some(accept),
        }
    }

    #[must_use]
    pub(crate) const fn with_body(mut self, content_type: ContentType, len: usize) -> Self {
        self.body = Some((content_type, len));
        self
    }
}

impl fmt::Display for ResponseHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status))?;
        if let Some((content_type, len)) = self.body {
            write!(f, "Content-Type: {}\r\n", content_type.mime())?;
            write!(f, "Content-Length: {}\r\n", len)?;
        }
        match &self.accept {
            Some(accept) => write!(
                f,
                "Upgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n",
                accept
            )?,
            None => f.write_str("Connection: close\r\n")?,
        }
        f.write_str("\r\n")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum HttpMethod {
    Get,
    Post,
    /// Any method no route answers to.
    Other,
}

impl HttpMethod {
    fn from_token(token: &str) -> Self {
        match token {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            _ => HttpMethod::Other,
        }
    }
}

/// Request line of `head`: method, path without its query, and the header
/// lines after it.
pub(super) fn parse_request_line(head: &str) -> Option<(HttpMethod, &str, &str)> {
    let (line, fields) = head.split_once("\r\n").unwrap_or((head, ""));
    let mut parts = line.split_ascii_whitespace();
    let method = HttpMethod::from_token(parts.next()?);
    let target = parts.next()?;
    let path = target.split_once('?').map_or(target, |(path, _)| path);
    Some((method, path, fields))
}

/// Bytes of the request head held in the receive buffer.
#[derive(Debug, Clone, Copy)]
pub(super) struct Heading {
    /// End of the blank line closing the head, or `len` if it never came.
    pub(super) end: usize,
    /// Bytes read so far; anything past `end` is body.
    pub(super) len: usize,
}

/// Read until the blank line after the headers or until `buf` is full.
///
/// `None` means the peer closed before sending anything.
pub(super) async fn read_heading(
    buf: &mut [u8],
    socket: &mut TcpSocket<'_>,
) -> Result<Option<Heading>, TcpError> {
    let mut len = 0;
    while len < buf.len() {
        let n = socket.read(&mut buf[len..]).await?;
        if n == 0 {
            break;
        }
        // Rescan the last three old bytes, the terminator may straddle reads.
        let from = len.saturating_sub(3);
        len += n;
        if let Some(pos) = buf[from..len].windows(4).position(|w| w == b"\r\n\r\n") {
            return Ok(Some(Heading {
                end: from + pos + 4,
                len,
            }));
        }
    }

    Ok((len > 0).then_some(Heading { end: len, len }))
}

/// Value of the header `name`, matched case-insensitively.
pub(super) fn find_header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then_some(value.trim())
    })
}

pub(super) fn find_content_length(headers: &str) -> Option<u32> {
    find_header(headers, "Content-Length")?.parse().ok()
}
