use core::fmt::Write as _;

use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embedded_io_async::{ErrorType, Read, Write as _};
use heapless::String;

use super::{
    Error, HttpResult,
    headers::{
        ContentType, HttpMethod, ResponseHeaders, StatusCode, find_content_length, find_header,
        parse_request_line, read_heading,
    },
};

const HEADER_BUFFER_SIZE: usize = 1024;
const RESPONSE_HEADER_SIZE: usize = 256;
const BODY_BUFFER_SIZE: usize = 512;

/// HTTP connection context
pub(crate) struct HttpConnection<'a> {
    /// Unique per accepted socket.
    pub id: u32,
    pub method: HttpMethod,
    pub path: String<64>,

    socket: TcpSocket<'a>,
    content_length: Option<u32>,
    header_buf: [u8; HEADER_BUFFER_SIZE],
    /// Start of the header lines following the request line.
    fields_start: usize,
    header_end: usize,
    header_len: usize,
    body_buf: [u8; BODY_BUFFER_SIZE],
}

impl<'a> HttpConnection<'a> {
    /// Read the request head from a freshly accepted socket.
    pub(crate) async fn from_socket(id: u32, mut socket: TcpSocket<'a>) -> Result<Self, Error> {
        let mut header_buf = [0u8; HEADER_BUFFER_SIZE];
        let heading = read_heading(&mut header_buf, &mut socket)
            .await?
            .ok_or(Error::Closed)?;
        let (header_end, header_len) = (heading.end, heading.len);

        // Only the head is text; bytes past it belong to the body.
        let header_str = core::str::from_utf8(&header_buf[..header_end]).map_err(|_| Error::Parse)?;
        let (method, raw_path, fields) = parse_request_line(header_str).ok_or(Error::Parse)?;
        let content_length = find_content_length(fields);
        let fields_start = header_end - fields.len();

        let mut path = String::new();
        let _ = path.push_str(raw_path);
        Ok(Self {
            id,
            method,
            path,
            socket,
            content_length,
            header_buf,
            fields_start,
            header_end,
            header_len,
            body_buf: [0; BODY_BUFFER_SIZE],
        })
    }

    pub(crate) fn route(&self) -> (HttpMethod, &'_ str) {
        (self.method, self.path.as_str())
    }

    /// Header lines following the request line.
    pub(crate) fn headers(&self) -> &str {
        core::str::from_utf8(&self.header_buf[self.fields_start..self.header_end]).unwrap_or("")
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        find_header(self.headers(), name)
    }

    /// Header block and a reader over the request body, for streamed uploads.
    pub(crate) fn upload_parts(&mut self) -> (&str, BodyReader<'_, 'a>) {
        let head = core::str::from_utf8(&self.header_buf[self.fields_start..self.header_end])
            .unwrap_or("");
        let body = BodyReader {
            pending: &self.header_buf[self.header_end..self.header_len],
            socket: &mut self.socket,
        };
        (head, body)
    }

    /// Read a small request body. A missing body reads as empty.
    pub(crate) async fn read_body(&mut self) -> Result<&str, Error> {
        let expected = self.content_length.unwrap_or(0) as usize;
        if expected > self.body_buf.len() {
            return Err(Error::TooLarge);
        }

        let pending = &self.header_buf[self.header_end..self.header_len];
        let mut received = pending.len().min(expected);
        self.body_buf[..received].copy_from_slice(&pending[..received]);

        while received < expected {
            let n = self.socket.read(&mut self.body_buf[received..expected]).await?;
            if n == 0 {
                return Err(Error::Closed);
            }
            received += n;
        }

        core::str::from_utf8(&self.body_buf[..expected]).map_err(|_| Error::Parse)
    }

    pub(crate) async fn write_headers(&mut self, headers: &ResponseHeaders) -> HttpResult {
        let mut buf = String::<RESPONSE_HEADER_SIZE>::new();
        write!(buf, "{}", headers)?;
        self.write_all(buf.as_bytes()).await
    }

    /// Write a complete response with a body.
    pub(crate) async fn respond(
        &mut self,
        status: StatusCode,
        content_type: ContentType,
        body: &[u8],
    ) -> HttpResult {
        let headers = ResponseHeaders::from_code(status).with_body(content_type, body.len());
        self.write_headers(&headers).await?;
        self.write_all(body).await
    }

    /// Hand the socket over to another protocol after an upgrade.
    pub(crate) fn into_socket(self) -> TcpSocket<'a> {
        self.socket
    }

    /// Close the write side once the response is out.
    pub(crate) async fn finish(mut self) -> HttpResult {
        self.socket.close();
        self.socket.flush().await?;
        Ok(())
    }

    async fn write_all(&mut self, buf: &[u8]) -> HttpResult {
        self.socket.write_all(buf).await?;
        self.socket.flush().await?;
        Ok(())
    }
}

/// Request body: bytes read along with the head, then the socket.
pub(crate) struct BodyReader<'b, 'a> {
    pending: &'b [u8],
    socket: &'b mut TcpSocket<'a>,
}

impl ErrorType for BodyReader<'_, '_> {
    type Error = TcpError;
}

impl Read for BodyReader<'_, '_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TcpError> {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending = &self.pending[n..];
            return Ok(n);
        }
        self.socket.read(buf).await
    }
}
