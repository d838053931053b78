//! JSON codec for the WebSocket OTA protocol.
//!
//! Every message is one JSON object with a `type` discriminator. Inbound
//! commands are decoded in two steps: the set of present keys is checked
//! against the command's allow-list, then each field is extracted on its own
//! so a bad value is reported by name. Nothing here touches session, token
//! or flash state.

mod command;
mod event;
mod fields;

use core::fmt;

pub use command::{
    AbortRequest, BeginRequest, CheckRequest, ChunkRequest, Command, MAX_REQUEST_ID_LEN,
    MAX_VERSION_LEN, RequestId, VerifyRequest, VersionString, decode_abort, decode_begin,
    decode_check, decode_chunk, decode_command, decode_verify, request_id,
};
pub use event::{
    EncodeError, Event, StatusInfo, decode_event, encode, encode_aborted, encode_complete,
    encode_error, encode_progress, encode_ready, encode_status,
};
pub(crate) use fields::unescape;

/// Message type names.
pub mod kind {
    pub const CHECK: &str = "ota.check";
    pub const BEGIN: &str = "ota.begin";
    pub const CHUNK: &str = "ota.chunk";
    pub const ABORT: &str = "ota.abort";
    pub const VERIFY: &str = "ota.verify";

    pub const STATUS: &str = "ota.status";
    pub const READY: &str = "ota.ready";
    pub const PROGRESS: &str = "ota.progress";
    pub const COMPLETE: &str = "ota.complete";
    pub const ERROR: &str = "ota.error";
    pub const ABORTED: &str = "ota.aborted";

    pub(crate) const PREFIX: &str = "ota.";
}

/// Why a message was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not a JSON object.
    InvalidJson,
    /// `type` lies outside the `ota.` namespace.
    NotOta,
    /// `ota.` prefixed type that no command uses.
    UnknownType,
    /// Decoder called with a message of another kind.
    UnexpectedType,
    /// A key outside the allow-list is present.
    UnknownKeys,
    /// Required field absent, or a field has the wrong type or shape.
    Field(&'static str),
    /// `target` is not `firmware` or `filesystem`.
    InvalidTarget,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidJson => f.write_str("invalid JSON"),
            DecodeError::NotOta => f.write_str("not an OTA message"),
            DecodeError::UnknownType => f.write_str("unknown OTA command"),
            DecodeError::UnexpectedType => f.write_str("unexpected message type"),
            DecodeError::UnknownKeys => f.write_str("unknown keys"),
            DecodeError::Field(name) => write!(f, "{}: missing or invalid", name),
            DecodeError::InvalidTarget => {
                f.write_str("target: must be \"firmware\" or \"filesystem\"")
            }
        }
    }
}

pub const CHECKSUM_LEN: usize = 16;
pub const CHECKSUM_HEX_LEN: usize = CHECKSUM_LEN * 2;

/// MD5 digest of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    pub const fn new(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse exactly 32 hex characters.
    pub fn from_hex(value: &str) -> Option<Self> {
        if value.len() != CHECKSUM_HEX_LEN {
            return None;
        }
        let mut bytes = [0u8; CHECKSUM_LEN];
        hex::decode_to_slice(value, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }
}
