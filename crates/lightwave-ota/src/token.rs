//! Per-device OTA token.
//!
//! The token is a 128-bit random value rendered as 32 lowercase hex
//! characters and kept under `ota`/`token` in the key-value store. When the
//! store cannot be used the compile-time fallback is served instead. Token
//! values never reach the log.

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embassy_time::Instant;
use heapless::String;
use subtle::ConstantTimeEq;

use crate::config::DEFAULT_FALLBACK_TOKEN;
use crate::ports::{EntropySource, KeyValueStore, StoreError};

pub const TOKEN_NAMESPACE: &str = "ota";
pub const TOKEN_KEY: &str = "token";

/// Entropy drawn per generated token.
pub const TOKEN_BYTES: usize = 16;
pub const GENERATED_TOKEN_LEN: usize = TOKEN_BYTES * 2;
pub const MAX_TOKEN_LEN: usize = 64;

pub type TokenValue = String<MAX_TOKEN_LEN>;

/// Token store shared between the network tasks.
pub type SharedTokenStore<S, R> = Mutex<CriticalSectionRawMutex, RefCell<TokenStore<S, R>>>;

/// Where the active token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Persisted,
    Fallback,
}

impl TokenOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            TokenOrigin::Persisted => "persisted",
            TokenOrigin::Fallback => "compile_time",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: TokenValue,
    origin: TokenOrigin,
    generated_at: Option<Instant>,
}

impl Token {
    fn new(value: &str, origin: TokenOrigin, generated_at: Option<Instant>) -> Option<Self> {
        let mut stored = TokenValue::new();
        stored.push_str(value).ok()?;
        Some(Self {
            value: stored,
            origin,
            generated_at,
        })
    }

    pub fn as_str(&self) -> &str {
        self.value.as_str()
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn origin(&self) -> TokenOrigin {
        self.origin
    }

    /// Creation time of a token generated during this boot.
    pub fn generated_at(&self) -> Option<Instant> {
        self.generated_at
    }

    /// Constant-time comparison against a presented value.
    pub fn matches(&self, presented: &str) -> bool {
        constant_time_eq(self.as_str(), presented)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("len", &self.value.len())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Compare two secrets without an early exit on the first differing byte.
pub fn constant_time_eq(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Non-empty, bounded, printable ASCII without whitespace.
pub fn is_valid_token(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_TOKEN_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

/// Anything that can check a presented OTA token.
pub trait TokenProvider {
    fn verify(&self, presented: &str) -> bool;
}

/// Persists and serves the device OTA token.
pub struct TokenStore<S, R> {
    store: S,
    entropy: R,
    fallback: &'static str,
    current: Token,
}

enum Stored {
    Found(Token),
    Missing,
    Unavailable,
}

impl<S: KeyValueStore, R: EntropySource> TokenStore<S, R> {
    /// Create a store serving `fallback` until [`TokenStore::init`] runs.
    pub fn new(store: S, entropy: R, fallback: &'static str) -> Self {
        let fallback = if is_valid_token(fallback) {
            fallback
        } else {
            DEFAULT_FALLBACK_TOKEN
        };
        Self {
            store,
            entropy,
            fallback,
            current: fallback_token(fallback),
        }
    }

    /// Load the persisted token, generating and persisting one when absent.
    ///
    /// Returns `false` when the store was unusable and the fallback is served.
    pub fn init(&mut self) -> bool {
        match self.load() {
            Stored::Found(token) => {
                #[cfg(feature = "log")]
                log::info!("ota: token loaded from store");
                self.current = token;
                true
            }
            Stored::Unavailable => {
                #[cfg(feature = "log")]
                log::warn!("ota: token store unavailable, using compile-time token");
                self.current = fallback_token(self.fallback);
                false
            }
            Stored::Missing => {
                let value = self.generate();
                if self.persist(value.as_str()) {
                    #[cfg(feature = "log")]
                    log::info!("ota: generated new device token");
                    self.current = Token {
                        value,
                        origin: TokenOrigin::Persisted,
                        generated_at: Some(Instant::now()),
                    };
                    true
                } else {
                    #[cfg(feature = "log")]
                    log::warn!("ota: failed to persist token, using compile-time token");
                    self.current = fallback_token(self.fallback);
                    false
                }
            }
        }
    }

    pub fn token(&self) -> &Token {
        &self.current
    }

    pub fn get_token(&self) -> &str {
        self.current.as_str()
    }

    pub fn origin(&self) -> TokenOrigin {
        self.current.origin
    }

    pub fn generated_at(&self) -> Option<Instant> {
        self.current.generated_at
    }

    /// Replace the token with fresh entropy.
    pub fn regenerate_token(&mut self) -> bool {
        let value = self.generate();
        if !self.persist(value.as_str()) {
            #[cfg(feature = "log")]
            log::warn!("ota: token regeneration failed to persist");
            return false;
        }
        self.current = Token {
            value,
            origin: TokenOrigin::Persisted,
            generated_at: Some(Instant::now()),
        };
        #[cfg(feature = "log")]
        log::info!("ota: token regenerated");
        true
    }

    /// Install a caller-chosen token.
    pub fn set_token(&mut self, value: &str) -> bool {
        if !is_valid_token(value) || !self.persist(value) {
            return false;
        }
        let Some(token) = Token::new(value, TokenOrigin::Persisted, Some(Instant::now())) else {
            return false;
        };
        self.current = token;
        #[cfg(feature = "log")]
        log::info!("ota: token replaced ({} chars)", value.len());
        true
    }

    /// Forget the persisted token and serve the fallback.
    pub fn clear(&mut self) -> bool {
        if self.store.remove(TOKEN_NAMESPACE, TOKEN_KEY).is_err() {
            #[cfg(feature = "log")]
            log::warn!("ota: failed to clear persisted token");
            return false;
        }
        self.current = fallback_token(self.fallback);
        #[cfg(feature = "log")]
        log::info!("ota: token cleared, compile-time token active");
        true
    }

    fn load(&mut self) -> Stored {
        let mut buf = [0u8; MAX_TOKEN_LEN];
        match self.store.read(TOKEN_NAMESPACE, TOKEN_KEY, &mut buf) {
            Ok(Some(len)) => buf
                .get(..len)
                .and_then(|bytes| core::str::from_utf8(bytes).ok())
                .filter(|value| is_valid_token(value))
                .and_then(|value| Token::new(value, TokenOrigin::Persisted, None))
                .map_or(Stored::Missing, Stored::Found),
            Ok(None) | Err(StoreError::Capacity) => Stored::Missing,
            Err(StoreError::Unavailable | StoreError::Driver) => Stored::Unavailable,
        }
    }

    fn persist(&mut self, value: &str) -> bool {
        self.store
            .write(TOKEN_NAMESPACE, TOKEN_KEY, value.as_bytes())
            .is_ok()
    }

    fn generate(&mut self) -> TokenValue {
        let mut value = TokenValue::new();
        // Must differ from the token it replaces.
        for _ in 0..4 {
            let mut raw = [0u8; TOKEN_BYTES];
            self.entropy.fill_bytes(&mut raw);
            let mut hex = [0u8; GENERATED_TOKEN_LEN];
            if hex::encode_to_slice(raw, &mut hex).is_err() {
                continue;
            }
            value.clear();
            if let Ok(text) = core::str::from_utf8(&hex) {
                let _ = value.push_str(text);
            }
            if value.as_str() != self.current.as_str() {
                break;
            }
        }
        value
    }
}

impl<S: KeyValueStore, R: EntropySource> TokenProvider for TokenStore<S, R> {
    fn verify(&self, presented: &str) -> bool {
        self.current.matches(presented)
    }
}

impl<S: KeyValueStore, R: EntropySource> TokenProvider for SharedTokenStore<S, R> {
    fn verify(&self, presented: &str) -> bool {
        self.lock(|store| store.borrow().verify(presented))
    }
}

fn fallback_token(value: &'static str) -> Token {
    let mut stored = TokenValue::new();
    // `value` is validated against MAX_TOKEN_LEN before it gets here.
    let _ = stored.push_str(value);
    Token {
        value: stored,
        origin: TokenOrigin::Fallback,
        generated_at: None,
    }
}
