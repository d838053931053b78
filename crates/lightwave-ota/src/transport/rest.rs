//! Streamed HTTP image upload.
//!
//! The body is pulled from the socket in buffer-sized pieces and each piece
//! goes to the session as one chunk. The service mutex is taken per piece, so
//! a WebSocket client keeps being served between reads.

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_io_async::Read;
use heapless::{String, Vec};
use serde::Serialize;

use crate::codec::{BeginRequest, Checksum, EncodeError, StatusInfo, VersionString};
use crate::error::OtaError;
use crate::ports::Partition;
use crate::session::{Completion, Owner, SessionControl};
use crate::token::TokenValue;

use super::multipart::{self, MAX_TRAILER_LEN, MultipartError};
use super::{ErrorMessage, format_message};

pub const UPDATE_PATH: &str = "/api/v1/firmware/update";
pub const FILESYSTEM_PATH: &str = "/api/v1/firmware/filesystem";
pub const VERSION_PATH: &str = "/api/v1/firmware/version";
pub const LEGACY_UPDATE_PATH: &str = "/update";

pub const TOKEN_HEADER: &str = "X-OTA-Token";
pub const MD5_HEADER: &str = "X-OTA-MD5";
pub const VERSION_HEADER: &str = "X-OTA-Version";
pub const FORCE_HEADER: &str = "X-OTA-Force";

/// Legacy plain-text response body.
pub type LegacyResponse = String<160>;

/// Upload-related request headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadHeaders<'a> {
    pub token: Option<&'a str>,
    pub md5: Option<&'a str>,
    pub version: Option<&'a str>,
    pub force: Option<&'a str>,
    pub content_length: Option<u32>,
    pub content_type: Option<&'a str>,
}

impl<'a> UploadHeaders<'a> {
    /// Collect the upload headers from the header block following the
    /// request line. Names are matched case-insensitively.
    pub fn parse(head: &'a str) -> Self {
        let mut headers = Self::default();
        for line in head.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case(TOKEN_HEADER) {
                headers.token = Some(value);
            } else if name.eq_ignore_ascii_case(MD5_HEADER) {
                headers.md5 = Some(value);
            } else if name.eq_ignore_ascii_case(VERSION_HEADER) {
                headers.version = Some(value);
            } else if name.eq_ignore_ascii_case(FORCE_HEADER) {
                headers.force = Some(value);
            } else if name.eq_ignore_ascii_case("Content-Length") {
                headers.content_length = value.parse().ok();
            } else if name.eq_ignore_ascii_case("Content-Type") {
                headers.content_type = Some(value);
            }
        }
        headers
    }

    /// An absent `X-OTA-Force` means forced. When present, only `true` or
    /// `1` force the install.
    pub fn force(&self) -> bool {
        self.force
            .map(str::trim)
            .is_none_or(|value| value == "1" || value.eq_ignore_ascii_case("true"))
    }

    pub fn boundary(&self) -> Option<&'a str> {
        self.content_type.and_then(multipart::boundary)
    }

    /// Session request for an image of `size` bytes.
    pub fn begin_request(&self, partition: Partition, size: u32) -> Result<BeginRequest, OtaError> {
        let mut request = BeginRequest::new(size);
        request.target = partition;
        request.force = self.force();

        if let Some(md5) = self.md5.filter(|value| !value.is_empty()) {
            request.md5 = Some(Checksum::from_hex(md5).ok_or(OtaError::Malformed("X-OTA-MD5"))?);
        }
        if let Some(token) = self.token {
            let mut value = TokenValue::new();
            value
                .push_str(token)
                .map_err(|()| OtaError::Malformed("X-OTA-Token"))?;
            request.token = Some(value);
        }
        if let Some(version) = self.version.filter(|value| !value.is_empty()) {
            let mut value = VersionString::new();
            value
                .push_str(version)
                .map_err(|()| OtaError::Malformed("X-OTA-Version"))?;
            request.version = Some(value);
        }
        Ok(request)
    }
}

/// Receive one image from `body` and run it through a session.
///
/// `buf` is the receive buffer; it must hold the multipart preamble. Any
/// failure after `begin` leaves no session behind.
pub async fn receive_upload<M, C, R>(
    service: &Mutex<M, C>,
    connection: u32,
    partition: Partition,
    headers: &UploadHeaders<'_>,
    body: &mut R,
    buf: &mut [u8],
) -> Result<Completion, OtaError>
where
    M: RawMutex,
    C: SessionControl,
    R: Read,
{
    let owner = Owner::rest(connection);
    let content_length = headers
        .content_length
        .ok_or(OtaError::Malformed("Content-Length"))?;

    let boundary = headers.boundary();
    let (size, filled, payload_start) = match boundary {
        Some(boundary) => {
            let (filled, start) = read_preamble(body, buf, boundary).await?;
            let size = multipart::payload_len(content_length, start, boundary)
                .map_err(|err| OtaError::Malformed(err.as_str()))?;
            (size, filled, start)
        }
        None => (content_length, 0, 0),
    };

    let request = headers.begin_request(partition, size)?;
    service.lock().await.begin(owner, &request)?;

    let result = stream_body(service, owner, size, boundary, body, buf, filled, payload_start).await;
    match result {
        Ok(()) => service.lock().await.verify(owner, None),
        Err(err) => {
            let mut control = service.lock().await;
            if err == OtaError::Disconnected {
                let _ = control.disconnect(owner);
            } else {
                let _ = control.abort(owner);
            }
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments, clippy::cast_possible_truncation)]
async fn stream_body<M, C, R>(
    service: &Mutex<M, C>,
    owner: Owner,
    size: u32,
    boundary: Option<&str>,
    body: &mut R,
    buf: &mut [u8],
    filled: usize,
    payload_start: usize,
) -> Result<(), OtaError>
where
    M: RawMutex,
    C: SessionControl,
    R: Read,
{
    let mut trailer = Vec::<u8, MAX_TRAILER_LEN>::new();
    let mut offset: u32 = 0;

    // Bytes read together with the preamble.
    if filled > payload_start {
        let buffered = &buf[payload_start..filled];
        let take = buffered.len().min(size as usize);
        if take > 0 {
            service
                .lock()
                .await
                .write_chunk(owner, offset, &buffered[..take])?;
            offset += take as u32;
        }
        collect_trailer(&mut trailer, &buffered[take..])?;
    }

    while offset < size {
        let want = buf.len().min((size - offset) as usize);
        let n = body
            .read(&mut buf[..want])
            .await
            .map_err(|_| OtaError::Disconnected)?;
        if n == 0 {
            return Err(OtaError::Disconnected);
        }
        service
            .lock()
            .await
            .write_chunk(owner, offset, &buf[..n])?;
        offset += n as u32;
    }

    let Some(boundary) = boundary else {
        return Ok(());
    };
    let expected = multipart::trailer_len(boundary);
    while trailer.len() < expected {
        let want = (expected - trailer.len()).min(buf.len());
        let n = body
            .read(&mut buf[..want])
            .await
            .map_err(|_| OtaError::Disconnected)?;
        if n == 0 {
            return Err(OtaError::Disconnected);
        }
        collect_trailer(&mut trailer, &buf[..n])?;
    }
    if multipart::is_trailer(&trailer, boundary) {
        Ok(())
    } else {
        Err(OtaError::Malformed(MultipartError::Trailer.as_str()))
    }
}

fn collect_trailer(trailer: &mut Vec<u8, MAX_TRAILER_LEN>, bytes: &[u8]) -> Result<(), OtaError> {
    trailer
        .extend_from_slice(bytes)
        .map_err(|()| OtaError::Malformed(MultipartError::Trailer.as_str()))
}

/// Read until the part headers end. Returns the bytes in `buf` and the
/// offset of the first file byte.
async fn read_preamble<R: Read>(
    body: &mut R,
    buf: &mut [u8],
    boundary: &str,
) -> Result<(usize, usize), OtaError> {
    let mut filled = 0;
    loop {
        match multipart::preamble_end(&buf[..filled], boundary) {
            Ok(Some(start)) => return Ok((filled, start)),
            Ok(None) => {}
            Err(err) => return Err(OtaError::Malformed(err.as_str())),
        }
        if filled == buf.len() {
            return Err(OtaError::Malformed(MultipartError::PreambleTooLong.as_str()));
        }
        let n = body
            .read(&mut buf[filled..])
            .await
            .map_err(|_| OtaError::Disconnected)?;
        if n == 0 {
            return Err(OtaError::Disconnected);
        }
        filled += n;
    }
}

#[derive(Serialize)]
struct Success<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct Failure<'a> {
    success: bool,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateData<'a> {
    message: &'a str,
    rebooting: bool,
    bytes_written: u32,
    duration_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionData<'a> {
    version: &'a str,
    version_number: u32,
    sketch_size: u32,
    free_space: u32,
    ota_available: bool,
    max_ota_size: u32,
}

fn success_message(partition: Partition) -> &'static str {
    match partition {
        Partition::Firmware => "Firmware update complete",
        Partition::Filesystem => "Filesystem update complete",
    }
}

pub(crate) fn write_envelope<T: Serialize>(data: T, out: &mut [u8]) -> Result<usize, EncodeError> {
    serde_json_core::to_slice(&Success { success: true, data }, out)
        .map_err(|_| EncodeError::BufferFull)
}

pub(crate) fn write_error_envelope(
    code: &str,
    message: &str,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    let failure = Failure {
        success: false,
        error: ErrorBody { code, message },
    };
    serde_json_core::to_slice(&failure, out).map_err(|_| EncodeError::BufferFull)
}

/// `{"success":true,"data":{...}}` for a finished upload.
pub fn render_success(
    partition: Partition,
    completion: &Completion,
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    write_envelope(
        UpdateData {
            message: success_message(partition),
            rebooting: completion.rebooting,
            bytes_written: completion.bytes_written,
            duration_ms: completion.duration_ms,
        },
        out,
    )
}

/// `{"success":false,"error":{...}}`; pair with `err.kind().http_status()`.
pub fn render_error(err: &OtaError, out: &mut [u8]) -> Result<usize, EncodeError> {
    let message: ErrorMessage = format_message(err);
    write_error_envelope(err.code(), &message, out)
}

/// Body of `GET /api/v1/firmware/version`.
pub fn render_version(info: &StatusInfo<'_>, out: &mut [u8]) -> Result<usize, EncodeError> {
    write_envelope(
        VersionData {
            version: info.version,
            version_number: info.version_number,
            sketch_size: info.sketch_size,
            free_space: info.free_space,
            ota_available: info.ota_available,
            max_ota_size: info.max_ota_size,
        },
        out,
    )
}

/// Plain-text body of the legacy `/update` route.
pub fn render_legacy(result: &Result<Completion, OtaError>) -> LegacyResponse {
    let mut text = LegacyResponse::new();
    let _ = match result {
        Ok(completion) => write!(
            text,
            "OK - Firmware updated ({} bytes), rebooting...",
            completion.bytes_written
        ),
        Err(err) => write!(text, "ERROR: {}", err),
    };
    text
}
