#![no_std]

//! Over-the-air update core for the Lightwave controller.
//!
//! Layers:
//! - `lock` - single session gate shared by every transport
//! - `token` - per-device OTA secret backed by a key-value store
//! - `codec` - strict JSON decode/encode for the WebSocket protocol
//! - `session` - upload state machine driving the flash target
//! - `feedback` - LED progress display that pre-empts normal rendering
//! - `record` - flash layout of the key-value store
//! - `transport` - WebSocket dispatch, REST upload and token admin glue
//!
//! Hardware lives behind the traits in [`ports`], so the whole crate runs on
//! the host as well as on the device.

pub mod codec;
pub mod config;
pub mod error;
pub mod feedback;
pub mod lock;
pub mod ports;
pub mod record;
pub mod session;
pub mod token;
pub mod transport;
pub mod version;

pub use config::OtaConfig;
pub use error::{ErrorKind, OtaError};
pub use feedback::{FeedbackIndicator, FeedbackPainter};
pub use lock::{SessionLease, SessionLock, Transport};
pub use session::{Completion, OtaService, Owner, Phase, Progress, Ready, SessionControl};
pub use token::{Token, TokenOrigin, TokenProvider, TokenStore};
