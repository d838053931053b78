use core::fmt;

use crate::ports::FlashError;

/// Error classes shared by both transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request or out-of-order command. Nothing changed.
    Protocol,
    /// Token mismatch.
    Auth,
    /// Image does not fit the target.
    Capacity,
    /// Another session owns the lock.
    SessionBusy,
    /// Offset overrun or checksum mismatch. The partial image was discarded.
    Integrity,
    /// Owning connection went away.
    Disconnect,
    /// Flash primitive failed mid-session.
    Storage,
}

impl ErrorKind {
    /// Wire code carried in error responses.
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::Protocol => "PROTOCOL_ERROR",
            ErrorKind::Auth => "UNAUTHORIZED",
            ErrorKind::Capacity => "INSUFFICIENT_SPACE",
            ErrorKind::SessionBusy => "SESSION_BUSY",
            ErrorKind::Integrity => "INTEGRITY_ERROR",
            ErrorKind::Disconnect => "DISCONNECTED",
            ErrorKind::Storage => "FLASH_ERROR",
        }
    }

    /// HTTP status used by the REST transport.
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorKind::Protocol => 400,
            ErrorKind::Auth => 401,
            ErrorKind::SessionBusy => 409,
            ErrorKind::Capacity => 413,
            ErrorKind::Integrity | ErrorKind::Disconnect | ErrorKind::Storage => 500,
        }
    }
}

/// Session-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaError {
    /// The lock is held by another transport or connection.
    Busy,
    /// A completed update is waiting for its restart.
    RestartPending,
    Unauthorized,
    /// Request framing or headers could not be understood.
    Malformed(&'static str),
    InvalidSize,
    VersionRejected { current: u32, incoming: u32 },
    TooLarge { size: u32, available: u32 },
    Allocation(FlashError),
    NoSession,
    NotOwner,
    EmptyChunk,
    ChunkTooLarge,
    InvalidChunkData,
    OffsetMismatch { expected: u32, received: u32 },
    Overrun { offset: u32, len: u32, total: u32 },
    Incomplete { received: u32, total: u32 },
    ChecksumRequired,
    ChecksumMismatch,
    Flash(FlashError),
    Disconnected,
    Aborted,
}

impl OtaError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            OtaError::Busy | OtaError::RestartPending => ErrorKind::SessionBusy,
            OtaError::Unauthorized => ErrorKind::Auth,
            OtaError::TooLarge { .. } | OtaError::Allocation(_) => ErrorKind::Capacity,
            OtaError::Overrun { .. } | OtaError::ChecksumMismatch => ErrorKind::Integrity,
            OtaError::Flash(_) => ErrorKind::Storage,
            OtaError::Disconnected => ErrorKind::Disconnect,
            OtaError::Malformed(_)
            | OtaError::InvalidSize
            | OtaError::VersionRejected { .. }
            | OtaError::NoSession
            | OtaError::NotOwner
            | OtaError::EmptyChunk
            | OtaError::ChunkTooLarge
            | OtaError::InvalidChunkData
            | OtaError::OffsetMismatch { .. }
            | OtaError::Incomplete { .. }
            | OtaError::ChecksumRequired
            | OtaError::Aborted => ErrorKind::Protocol,
        }
    }

    pub const fn code(&self) -> &'static str {
        self.kind().code()
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaError::Busy => f.write_str("Another OTA session is already active"),
            OtaError::RestartPending => f.write_str("Update complete, restart pending"),
            OtaError::Unauthorized => f.write_str("Invalid OTA token"),
            OtaError::Malformed(what) => write!(f, "Invalid request: {}", what),
            OtaError::InvalidSize => f.write_str("Image size must be greater than zero"),
            OtaError::VersionRejected { current, incoming } => write!(
                f,
                "Version {} is not newer than running {}, set force to override",
                incoming, current
            ),
            OtaError::TooLarge { size, available } => write!(
                f,
                "Image too large: {} bytes, {} available",
                size, available
            ),
            OtaError::Allocation(err) => write!(f, "Cannot prepare target: {}", err.as_str()),
            OtaError::NoSession => f.write_str("No active OTA session"),
            OtaError::NotOwner => f.write_str("OTA session owned by another client"),
            OtaError::EmptyChunk => f.write_str("Empty chunk"),
            OtaError::ChunkTooLarge => f.write_str("Chunk exceeds maximum size"),
            OtaError::InvalidChunkData => f.write_str("Invalid base64 data"),
            OtaError::OffsetMismatch { expected, received } => write!(
                f,
                "Offset mismatch: expected {}, got {}",
                expected, received
            ),
            OtaError::Overrun { offset, len, total } => write!(
                f,
                "Chunk {}+{} overruns declared size {}",
                offset, len, total
            ),
            OtaError::Incomplete { received, total } => write!(
                f,
                "Incomplete transfer: {} of {} bytes",
                received, total
            ),
            OtaError::ChecksumRequired => f.write_str("MD5 checksum required"),
            OtaError::ChecksumMismatch => f.write_str("MD5 checksum mismatch"),
            OtaError::Flash(err) => f.write_str(err.as_str()),
            OtaError::Disconnected => f.write_str("Client disconnected"),
            OtaError::Aborted => f.write_str("Update aborted"),
        }
    }
}
