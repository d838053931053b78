//! Token administration routes.
//!
//! `GET` and `POST /api/v1/device/ota-token` are guarded by the admin key
//! sent in `X-API-Key`. A build without an admin key leaves them open.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{EncodeError, unescape};
use crate::ports::{EntropySource, KeyValueStore};
use crate::token::{Token, TokenStore, TokenValue, constant_time_eq, is_valid_token};

use super::rest::{write_envelope, write_error_envelope};
use super::{ErrorMessage, format_message};

pub const TOKEN_PATH: &str = "/api/v1/device/ota-token";
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenAction {
    Regenerate,
    Set(TokenValue),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminError {
    Unauthorized,
    /// Body is not a valid action object.
    InvalidBody,
    InvalidAction,
    InvalidToken,
    /// The key-value store rejected the change.
    Persist,
}

impl AdminError {
    pub const fn code(self) -> &'static str {
        match self {
            AdminError::Unauthorized => "UNAUTHORIZED",
            AdminError::InvalidBody | AdminError::InvalidAction | AdminError::InvalidToken => {
                "INVALID_VALUE"
            }
            AdminError::Persist => "STORAGE_ERROR",
        }
    }

    pub const fn http_status(self) -> u16 {
        match self {
            AdminError::Unauthorized => 401,
            AdminError::InvalidBody | AdminError::InvalidAction | AdminError::InvalidToken => 400,
            AdminError::Persist => 500,
        }
    }
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdminError::Unauthorized => "Invalid or missing API key",
            AdminError::InvalidBody => "Invalid JSON body",
            AdminError::InvalidAction => "action must be regenerate, set or clear",
            AdminError::InvalidToken => {
                "token must be 1-64 printable ASCII characters without spaces"
            }
            AdminError::Persist => "Failed to persist OTA token",
        })
    }
}

/// Check the presented admin key. An empty or absent configured key means
/// the routes are open.
pub fn authorize(configured: Option<&str>, presented: Option<&str>) -> Result<(), AdminError> {
    match configured.filter(|key| !key.is_empty()) {
        None => Ok(()),
        Some(key) if presented.is_some_and(|presented| constant_time_eq(key, presented)) => Ok(()),
        Some(_) => Err(AdminError::Unauthorized),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionBody<'a> {
    action: &'a str,
    #[serde(default, borrow)]
    token: Option<&'a str>,
}

/// Decode the `POST` body. An empty body asks for a regeneration.
pub fn decode_action(body: &str) -> Result<TokenAction, AdminError> {
    if body.trim().is_empty() {
        return Ok(TokenAction::Regenerate);
    }
    let (parsed, _) = serde_json_core::from_str::<ActionBody<'_>>(body)
        .map_err(|_| AdminError::InvalidBody)?;
    match (parsed.action, parsed.token) {
        ("regenerate", _) => Ok(TokenAction::Regenerate),
        ("clear", _) => Ok(TokenAction::Clear),
        ("set", Some(token)) => unescape::<{ crate::token::MAX_TOKEN_LEN }>(body, token)
            .filter(|token| is_valid_token(token))
            .map(TokenAction::Set)
            .ok_or(AdminError::InvalidToken),
        ("set", None) => Err(AdminError::InvalidToken),
        _ => Err(AdminError::InvalidAction),
    }
}

/// Run `action` against the store.
pub fn apply<S: KeyValueStore, R: EntropySource>(
    store: &mut TokenStore<S, R>,
    action: TokenAction,
) -> Result<(), AdminError> {
    let done = match action {
        TokenAction::Regenerate => store.regenerate_token(),
        TokenAction::Set(token) => store.set_token(&token),
        TokenAction::Clear => store.clear(),
    };
    if done { Ok(()) } else { Err(AdminError::Persist) }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenData<'a> {
    token: &'a str,
    source: &'a str,
    token_length: usize,
}

/// `{"success":true,"data":{"token","source","tokenLength"}}`
pub fn render_token(token: &Token, out: &mut [u8]) -> Result<usize, EncodeError> {
    write_envelope(
        TokenData {
            token: token.as_str(),
            source: token.origin().as_str(),
            token_length: token.len(),
        },
        out,
    )
}

pub fn render_admin_error(err: AdminError, out: &mut [u8]) -> Result<usize, EncodeError> {
    let message: ErrorMessage = format_message(&err);
    write_error_envelope(err.code(), &message, out)
}
