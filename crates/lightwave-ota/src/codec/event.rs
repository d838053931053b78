use serde::{Deserialize, Serialize};

use super::fields::KeySet;
use super::{DecodeError, kind};

const STATUS_KEYS: &[&str] = &[
    "type",
    "requestId",
    "version",
    "versionNumber",
    "sketchSize",
    "freeSpace",
    "otaAvailable",
    "maxOtaSize",
];
const READY_KEYS: &[&str] = &["type", "requestId", "totalSize", "ready"];
const PROGRESS_KEYS: &[&str] = &["type", "requestId", "offset", "total", "percent"];
const COMPLETE_KEYS: &[&str] = &["type", "requestId", "complete", "rebooting"];
const ERROR_KEYS: &[&str] = &["type", "requestId", "error"];
const ABORTED_KEYS: &[&str] = &["type", "requestId", "aborted"];

/// Reply to `ota.check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInfo<'a> {
    pub version: &'a str,
    pub version_number: u32,
    pub sketch_size: u32,
    pub free_space: u32,
    pub ota_available: bool,
    pub max_ota_size: u32,
}

/// Outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    Status(StatusInfo<'a>),
    Ready { total_size: u32 },
    Progress { offset: u32, total: u32, percent: u8 },
    Complete { rebooting: bool },
    Error { code: &'a str, message: &'a str },
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Output buffer too small for the event.
    BufferFull,
}

#[derive(Serialize, Deserialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

/// Flat wire shape shared by every event; absent fields are omitted.
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireEvent<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(default, borrow, skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,

    #[serde(default, borrow, skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sketch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    free_space: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ota_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_ota_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ready: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    percent: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rebooting: Option<bool>,

    #[serde(default, borrow, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody<'a>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    aborted: Option<bool>,
}

impl<'a> WireEvent<'a> {
    fn from_event(event: &Event<'a>, request_id: Option<&'a str>) -> Self {
        let mut wire = WireEvent {
            request_id,
            ..WireEvent::default()
        };
        match *event {
            Event::Status(info) => {
                wire.kind = kind::STATUS;
                wire.version = Some(info.version);
                wire.version_number = Some(info.version_number);
                wire.sketch_size = Some(info.sketch_size);
                wire.free_space = Some(info.free_space);
                wire.ota_available = Some(info.ota_available);
                wire.max_ota_size = Some(info.max_ota_size);
            }
            Event::Ready { total_size } => {
                wire.kind = kind::READY;
                wire.total_size = Some(total_size);
                wire.ready = Some(true);
            }
            Event::Progress {
                offset,
                total,
                percent,
            } => {
                wire.kind = kind::PROGRESS;
                wire.offset = Some(offset);
                wire.total = Some(total);
                wire.percent = Some(percent);
            }
            Event::Complete { rebooting } => {
                wire.kind = kind::COMPLETE;
                wire.complete = Some(true);
                wire.rebooting = Some(rebooting);
            }
            Event::Error { code, message } => {
                wire.kind = kind::ERROR;
                wire.error = Some(ErrorBody { code, message });
            }
            Event::Aborted => {
                wire.kind = kind::ABORTED;
                wire.aborted = Some(true);
            }
        }
        wire
    }

    fn into_event(self) -> Result<Event<'a>, DecodeError> {
        let event = match self.kind {
            kind::STATUS => Event::Status(StatusInfo {
                version: self.version.ok_or(DecodeError::Field("version"))?,
                version_number: self
                    .version_number
                    .ok_or(DecodeError::Field("versionNumber"))?,
                sketch_size: self.sketch_size.ok_or(DecodeError::Field("sketchSize"))?,
                free_space: self.free_space.ok_or(DecodeError::Field("freeSpace"))?,
                ota_available: self
                    .ota_available
                    .ok_or(DecodeError::Field("otaAvailable"))?,
                max_ota_size: self.max_ota_size.ok_or(DecodeError::Field("maxOtaSize"))?,
            }),
            kind::READY => Event::Ready {
                total_size: self.total_size.ok_or(DecodeError::Field("totalSize"))?,
            },
            kind::PROGRESS => Event::Progress {
                offset: self.offset.ok_or(DecodeError::Field("offset"))?,
                total: self.total.ok_or(DecodeError::Field("total"))?,
                percent: self.percent.ok_or(DecodeError::Field("percent"))?,
            },
            kind::COMPLETE => Event::Complete {
                rebooting: self.rebooting.ok_or(DecodeError::Field("rebooting"))?,
            },
            kind::ERROR => {
                let body = self.error.ok_or(DecodeError::Field("error"))?;
                Event::Error {
                    code: body.code,
                    message: body.message,
                }
            }
            kind::ABORTED => Event::Aborted,
            other if other.starts_with(kind::PREFIX) => return Err(DecodeError::UnknownType),
            _ => return Err(DecodeError::NotOta),
        };
        Ok(event)
    }
}

impl Event<'_> {
    pub const fn kind(&self) -> &'static str {
        match self {
            Event::Status(_) => kind::STATUS,
            Event::Ready { .. } => kind::READY,
            Event::Progress { .. } => kind::PROGRESS,
            Event::Complete { .. } => kind::COMPLETE,
            Event::Error { .. } => kind::ERROR,
            Event::Aborted => kind::ABORTED,
        }
    }

    fn allowed_keys(&self) -> &'static [&'static str] {
        match self {
            Event::Status(_) => STATUS_KEYS,
            Event::Ready { .. } => READY_KEYS,
            Event::Progress { .. } => PROGRESS_KEYS,
            Event::Complete { .. } => COMPLETE_KEYS,
            Event::Error { .. } => ERROR_KEYS,
            Event::Aborted => ABORTED_KEYS,
        }
    }
}

/// Serialize `event` into `buf`, returning the number of bytes written.
pub fn encode(event: &Event<'_>, request_id: Option<&str>, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let wire = WireEvent::from_event(event, request_id);
    serde_json_core::to_slice(&wire, buf).map_err(|_| EncodeError::BufferFull)
}

pub fn encode_status(
    info: &StatusInfo<'_>,
    request_id: Option<&str>,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    encode(&Event::Status(*info), request_id, buf)
}

pub fn encode_ready(
    total_size: u32,
    request_id: Option<&str>,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    encode(&Event::Ready { total_size }, request_id, buf)
}

pub fn encode_progress(
    offset: u32,
    total: u32,
    percent: u8,
    request_id: Option<&str>,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    encode(
        &Event::Progress {
            offset,
            total,
            percent,
        },
        request_id,
        buf,
    )
}

pub fn encode_complete(
    rebooting: bool,
    request_id: Option<&str>,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    encode(&Event::Complete { rebooting }, request_id, buf)
}

pub fn encode_error(
    code: &str,
    message: &str,
    request_id: Option<&str>,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    encode(&Event::Error { code, message }, request_id, buf)
}

pub fn encode_aborted(request_id: Option<&str>, buf: &mut [u8]) -> Result<usize, EncodeError> {
    encode(&Event::Aborted, request_id, buf)
}

/// Decode an outbound event, as a client would. Returns the event and its
/// `requestId`.
pub fn decode_event(text: &str) -> Result<(Event<'_>, Option<&str>), DecodeError> {
    let keys = KeySet::parse(text)?;
    let (wire, _) =
        serde_json_core::from_str::<WireEvent<'_>>(text).map_err(|_| DecodeError::InvalidJson)?;
    let request_id = wire.request_id;
    let event = wire.into_event()?;
    if !keys.only(event.allowed_keys()) {
        return Err(DecodeError::UnknownKeys);
    }
    Ok((event, request_id))
}
