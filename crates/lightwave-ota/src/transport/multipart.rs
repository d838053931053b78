//! `multipart/form-data` framing for single-file uploads.
//!
//! The body is `--{boundary}\r\n`, the part headers, a blank line, the file
//! bytes and the closing delimiter `\r\n--{boundary}--\r\n`. Only the framing
//! is checked; part headers are skipped.

/// Longest boundary allowed by RFC 2046.
pub const MAX_BOUNDARY_LEN: usize = 70;
/// Longest closing delimiter.
pub const MAX_TRAILER_LEN: usize = MAX_BOUNDARY_LEN + 8;

const HEADERS_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartError {
    /// Body does not start with the boundary line.
    Preamble,
    /// Part headers do not fit the receive buffer.
    PreambleTooLong,
    /// Body is shorter than its own framing.
    Truncated,
    /// Closing delimiter missing or wrong.
    Trailer,
}

impl MultipartError {
    pub const fn as_str(self) -> &'static str {
        match self {
            MultipartError::Preamble => "multipart preamble",
            MultipartError::PreambleTooLong => "multipart part headers too long",
            MultipartError::Truncated => "multipart body truncated",
            MultipartError::Trailer => "multipart closing boundary",
        }
    }
}

/// Boundary parameter of a `multipart/form-data` content type.
pub fn boundary(content_type: &str) -> Option<&str> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .split(';')
        .find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"'))
        })
        .filter(|boundary| !boundary.is_empty() && boundary.len() <= MAX_BOUNDARY_LEN)
}

/// Length of `\r\n--{boundary}--\r\n`.
pub const fn trailer_len(boundary: &str) -> usize {
    boundary.len() + 8
}

/// Offset of the first file byte in `buf`, or `Ok(None)` while the part
/// headers are still incomplete.
pub fn preamble_end(buf: &[u8], boundary: &str) -> Result<Option<usize>, MultipartError> {
    let opening = [b"--".as_slice(), boundary.as_bytes(), b"\r\n"];
    let mut pos = 0;
    for piece in opening {
        let available = buf.len().saturating_sub(pos).min(piece.len());
        if buf[pos..pos + available] != piece[..available] {
            return Err(MultipartError::Preamble);
        }
        if available < piece.len() {
            return Ok(None);
        }
        pos += piece.len();
    }

    // The blank line may follow the boundary line directly, when the part
    // carries no headers at all.
    let search_from = pos - 2;
    Ok(buf[search_from..]
        .windows(HEADERS_END.len())
        .position(|window| window == HEADERS_END)
        .map(|at| search_from + at + HEADERS_END.len()))
}

/// Whether `bytes` is exactly the closing delimiter for `boundary`.
pub fn is_trailer(bytes: &[u8], boundary: &str) -> bool {
    bytes.len() == trailer_len(boundary)
        && bytes.starts_with(b"\r\n--")
        && bytes.ends_with(b"--\r\n")
        && &bytes[4..4 + boundary.len()] == boundary.as_bytes()
}

/// File size for a body of `content_length` bytes whose preamble is
/// `preamble_len` bytes long.
pub fn payload_len(
    content_length: u32,
    preamble_len: usize,
    boundary: &str,
) -> Result<u32, MultipartError> {
    let framing = u32::try_from(preamble_len + trailer_len(boundary))
        .map_err(|_| MultipartError::Truncated)?;
    content_length
        .checked_sub(framing)
        .ok_or(MultipartError::Truncated)
}
