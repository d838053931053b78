use heapless::String;

use super::fields::{FieldName, KeySet, key, optional_string, pick};
use super::{CHECKSUM_HEX_LEN, Checksum, DecodeError, kind};
use crate::ports::Partition;
use crate::token::TokenValue;

pub const MAX_REQUEST_ID_LEN: usize = 48;
pub const MAX_VERSION_LEN: usize = 32;

pub type RequestId = String<MAX_REQUEST_ID_LEN>;
pub type VersionString = String<MAX_VERSION_LEN>;

const CHECK_KEYS: &[&str] = &["type", "requestId"];
const BEGIN_KEYS: &[&str] = &[
    "type",
    "size",
    "md5",
    "token",
    "version",
    "force",
    "target",
    "requestId",
];
const CHUNK_KEYS: &[&str] = &["type", "offset", "data", "requestId"];
const ABORT_KEYS: &[&str] = &["type", "requestId"];
const VERIFY_KEYS: &[&str] = &["type", "md5", "requestId"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginRequest {
    pub size: u32,
    pub md5: Option<Checksum>,
    pub token: Option<TokenValue>,
    pub version: Option<VersionString>,
    /// Allow same-version and downgrade installs. Defaults to `true`.
    pub force: bool,
    pub target: Partition,
    pub request_id: Option<RequestId>,
}

impl BeginRequest {
    /// Firmware upload of `size` bytes with every optional field defaulted.
    pub fn new(size: u32) -> Self {
        Self {
            size,
            md5: None,
            token: None,
            version: None,
            force: true,
            target: Partition::Firmware,
            request_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest<'a> {
    pub offset: u32,
    /// Base64 payload as it appears in the message. JSON escapes are left
    /// in; the dispatcher resolves `\/` while decoding.
    pub data: &'a str,
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortRequest {
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub md5: Option<Checksum>,
    pub request_id: Option<RequestId>,
}

/// Inbound command, one variant per message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Check(CheckRequest),
    Begin(BeginRequest),
    Chunk(ChunkRequest<'a>),
    Abort(AbortRequest),
    Verify(VerifyRequest),
}

impl Command<'_> {
    pub fn request_id(&self) -> Option<&str> {
        let id = match self {
            Command::Check(req) => &req.request_id,
            Command::Begin(req) => &req.request_id,
            Command::Chunk(req) => &req.request_id,
            Command::Abort(req) => &req.request_id,
            Command::Verify(req) => &req.request_id,
        };
        id.as_ref().map(|id| id.as_str())
    }
}

/// Decode any inbound OTA command, dispatching on `type`.
pub fn decode_command(text: &str) -> Result<Command<'_>, DecodeError> {
    let message_type = message_type(text)?;
    match message_type {
        kind::CHECK => decode_check(text).map(Command::Check),
        kind::BEGIN => decode_begin(text).map(Command::Begin),
        kind::CHUNK => decode_chunk(text).map(Command::Chunk),
        kind::ABORT => decode_abort(text).map(Command::Abort),
        kind::VERIFY => decode_verify(text).map(Command::Verify),
        other if other.starts_with(kind::PREFIX) => Err(DecodeError::UnknownType),
        _ => Err(DecodeError::NotOta),
    }
}

pub fn decode_check(text: &str) -> Result<CheckRequest, DecodeError> {
    expect_kind(text, kind::CHECK, CHECK_KEYS)?;
    Ok(CheckRequest {
        request_id: optional_string::<key::RequestId, MAX_REQUEST_ID_LEN>(text)?,
    })
}

pub fn decode_begin(text: &str) -> Result<BeginRequest, DecodeError> {
    expect_kind(text, kind::BEGIN, BEGIN_KEYS)?;

    let size = required::<u32, key::Size>(text)?;
    let md5 = checksum::<key::Md5>(text)?;
    let token = optional_string::<key::Token, { crate::token::MAX_TOKEN_LEN }>(text)?;
    let version = optional_string::<key::Version, MAX_VERSION_LEN>(text)?;
    let force = pick::<Option<bool>, key::Force>(text)?
        .flatten()
        .unwrap_or(true);
    let target = match pick::<Option<&str>, key::Target>(text)?.flatten() {
        None => Partition::Firmware,
        Some(value) => Partition::parse(value).ok_or(DecodeError::InvalidTarget)?,
    };

    Ok(BeginRequest {
        size,
        md5,
        token,
        version,
        force,
        target,
        request_id: optional_string::<key::RequestId, MAX_REQUEST_ID_LEN>(text)?,
    })
}

pub fn decode_chunk(text: &str) -> Result<ChunkRequest<'_>, DecodeError> {
    expect_kind(text, kind::CHUNK, CHUNK_KEYS)?;
    Ok(ChunkRequest {
        offset: required::<u32, key::Offset>(text)?,
        data: required::<&str, key::Data>(text)?,
        request_id: optional_string::<key::RequestId, MAX_REQUEST_ID_LEN>(text)?,
    })
}

pub fn decode_abort(text: &str) -> Result<AbortRequest, DecodeError> {
    expect_kind(text, kind::ABORT, ABORT_KEYS)?;
    Ok(AbortRequest {
        request_id: optional_string::<key::RequestId, MAX_REQUEST_ID_LEN>(text)?,
    })
}

pub fn decode_verify(text: &str) -> Result<VerifyRequest, DecodeError> {
    expect_kind(text, kind::VERIFY, VERIFY_KEYS)?;
    Ok(VerifyRequest {
        md5: checksum::<key::Md5>(text)?,
        request_id: optional_string::<key::RequestId, MAX_REQUEST_ID_LEN>(text)?,
    })
}

/// Best-effort `requestId` of a message that failed to decode.
pub fn request_id(text: &str) -> Option<RequestId> {
    optional_string::<key::RequestId, MAX_REQUEST_ID_LEN>(text)
        .ok()
        .flatten()
}

fn message_type(text: &str) -> Result<&str, DecodeError> {
    KeySet::parse(text)?;
    pick::<&str, key::Type>(text)?.ok_or(DecodeError::Field(key::Type::NAME))
}

/// Check the discriminator, then the allow-list, before any field is read.
fn expect_kind(text: &str, expected: &str, allowed: &[&str]) -> Result<(), DecodeError> {
    let keys = KeySet::parse(text)?;
    let message_type =
        pick::<&str, key::Type>(text)?.ok_or(DecodeError::Field(key::Type::NAME))?;
    if message_type != expected {
        return Err(DecodeError::UnexpectedType);
    }
    if !keys.only(allowed) {
        return Err(DecodeError::UnknownKeys);
    }
    Ok(())
}

fn required<'a, T: serde::Deserialize<'a>, F: FieldName>(text: &'a str) -> Result<T, DecodeError> {
    pick::<T, F>(text)?.ok_or(DecodeError::Field(F::NAME))
}

fn checksum<F: FieldName>(text: &str) -> Result<Option<Checksum>, DecodeError> {
    match optional_string::<F, CHECKSUM_HEX_LEN>(text)? {
        None => Ok(None),
        Some(value) => Checksum::from_hex(&value)
            .map(Some)
            .ok_or(DecodeError::Field(F::NAME)),
    }
}
