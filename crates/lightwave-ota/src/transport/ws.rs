//! WebSocket command dispatch.
//!
//! Every OTA text frame produces exactly one reply frame. Frames whose `type`
//! lies outside the `ota.` namespace are left for other routers.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::codec::{
    self, Command, DecodeError, EncodeError, encode_aborted, encode_complete, encode_error,
    encode_progress, encode_ready, encode_status,
};
use crate::error::{ErrorKind, OtaError};
use crate::session::{Owner, SessionControl};

use super::{ErrorMessage, format_message};

/// Sent in place of a reply that does not fit the output buffer.
const REPLY_TOO_LARGE: &str = "Reply too large";

/// Decodes OTA frames for one WebSocket endpoint.
///
/// `N` bounds the decoded chunk size and sizes the scratch buffer base64
/// payloads are decoded into.
pub struct WsOtaHandler<const N: usize> {
    scratch: [u8; N],
    max_chunk: usize,
}

impl<const N: usize> WsOtaHandler<N> {
    pub const fn new(max_chunk: usize) -> Self {
        Self {
            scratch: [0; N],
            max_chunk: if max_chunk < N { max_chunk } else { N },
        }
    }

    /// Handle one text frame from `connection`.
    ///
    /// Returns `Ok(None)` when the frame is not an OTA command, otherwise the
    /// length of the reply written to `out`. A reply too large for `out` is
    /// replaced by a short protocol error; `Err` means even that did not fit.
    pub fn handle<C: SessionControl>(
        &mut self,
        control: &mut C,
        connection: u32,
        text: &str,
        out: &mut [u8],
    ) -> Result<Option<usize>, EncodeError> {
        let written = match codec::decode_command(text) {
            Ok(command) => self.dispatch(control, Owner::websocket(connection), &command, out),
            Err(DecodeError::NotOta) => return Ok(None),
            Err(err) => {
                #[cfg(feature = "log")]
                log::warn!("ota: ws#{} rejected frame: {}", connection, err);
                let request_id = codec::request_id(text);
                let message: ErrorMessage = format_message(&err);
                encode_error(
                    ErrorKind::Protocol.code(),
                    &message,
                    request_id.as_deref(),
                    out,
                )
            }
        };

        written
            .or_else(|_err| {
                #[cfg(feature = "log")]
                log::warn!("ota: ws#{} reply dropped: {:?}", connection, _err);
                encode_error(ErrorKind::Protocol.code(), REPLY_TOO_LARGE, None, out)
            })
            .map(Some)
    }

    fn dispatch<C: SessionControl>(
        &mut self,
        control: &mut C,
        owner: Owner,
        command: &Command<'_>,
        out: &mut [u8],
    ) -> Result<usize, EncodeError> {
        let request_id = command.request_id();
        match command {
            Command::Check(_) => encode_status(&control.status(), request_id, out),
            Command::Begin(request) => match control.begin(owner, request) {
                Ok(ready) => encode_ready(ready.total_size, request_id, out),
                Err(err) => reply_error(&err, request_id, out),
            },
            Command::Chunk(chunk) => {
                let result = self
                    .decode_payload(chunk.data)
                    .and_then(|data| control.write_chunk(owner, chunk.offset, data));
                match result {
                    Ok(progress) => encode_progress(
                        progress.offset,
                        progress.total,
                        progress.percent,
                        request_id,
                        out,
                    ),
                    Err(err) => reply_error(&err, request_id, out),
                }
            }
            Command::Abort(_) => match control.abort(owner) {
                Ok(()) => encode_aborted(request_id, out),
                Err(err) => reply_error(&err, request_id, out),
            },
            Command::Verify(request) => match control.verify(owner, request.md5.as_ref()) {
                Ok(completion) => encode_complete(completion.rebooting, request_id, out),
                Err(err) => reply_error(&err, request_id, out),
            },
        }
    }

    /// Drop the session owned by a closed connection.
    pub fn on_disconnect<C: SessionControl>(&mut self, control: &mut C, connection: u32) -> bool {
        let dropped = control.disconnect(Owner::websocket(connection));
        #[cfg(feature = "log")]
        if dropped {
            log::warn!("ota: ws#{} disconnected mid-session, update aborted", connection);
        }
        dropped
    }

    fn decode_payload(&mut self, data: &str) -> Result<&[u8], OtaError> {
        if data.is_empty() {
            return Err(OtaError::EmptyChunk);
        }
        let len = if data.contains('\\') {
            self.decode_escaped(data)?
        } else {
            STANDARD
                .decode_slice(data, &mut self.scratch)
                .map_err(slice_error)?
        };
        if len > self.max_chunk {
            return Err(OtaError::ChunkTooLarge);
        }
        Ok(&self.scratch[..len])
    }

    /// Decode base64 that still carries JSON escapes. Only `\/` can occur
    /// in the alphabet, so anything else is invalid data.
    fn decode_escaped(&mut self, data: &str) -> Result<usize, OtaError> {
        let mut quad = [0u8; 4];
        let mut filled = 0;
        let mut written = 0;
        let mut padded = false;
        let mut bytes = data.bytes();
        while let Some(byte) = bytes.next() {
            let byte = match byte {
                b'\\' if bytes.next() == Some(b'/') => b'/',
                b'\\' => return Err(OtaError::InvalidChunkData),
                byte => byte,
            };
            quad[filled] = byte;
            filled += 1;
            if filled < quad.len() {
                continue;
            }
            if padded {
                return Err(OtaError::InvalidChunkData);
            }
            let n = STANDARD
                .decode_slice(quad, &mut self.scratch[written..])
                .map_err(slice_error)?;
            padded = n < 3;
            written += n;
            filled = 0;
        }
        if filled != 0 {
            return Err(OtaError::InvalidChunkData);
        }
        Ok(written)
    }
}

fn slice_error(err: base64::DecodeSliceError) -> OtaError {
    match err {
        base64::DecodeSliceError::OutputSliceTooSmall => OtaError::ChunkTooLarge,
        base64::DecodeSliceError::DecodeError(_) => OtaError::InvalidChunkData,
    }
}

fn reply_error(err: &OtaError, request_id: Option<&str>, out: &mut [u8]) -> Result<usize, EncodeError> {
    let message: ErrorMessage = format_message(err);
    encode_error(err.code(), &message, request_id, out)
}
