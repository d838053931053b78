//! Glue between the network transports and the session service.
//!
//! - `ws` - WebSocket command dispatch
//! - `rest` - streamed HTTP image upload and its responses
//! - `multipart` - `multipart/form-data` framing for the upload body
//! - `admin` - token administration routes

use core::fmt::{Display, Write as _};

use heapless::String;

pub mod admin;
pub mod multipart;
pub mod rest;
pub mod ws;

pub use admin::{AdminError, TokenAction};
pub use rest::{UploadHeaders, receive_upload};
pub use ws::WsOtaHandler;

pub(crate) const MAX_MESSAGE_LEN: usize = 128;

pub(crate) type ErrorMessage = String<MAX_MESSAGE_LEN>;

/// Render an error for a response body. Overlong text is cut short.
pub(crate) fn format_message(err: &impl Display) -> ErrorMessage {
    let mut message = ErrorMessage::new();
    let _ = write!(message, "{}", err);
    message
}
