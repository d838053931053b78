//! Infrastructure layer - port implementations
//!
//! Concrete implementations of the update engine ports on top of the ESP32
//! flash, RMT, RNG and radio.

pub(crate) mod config;
pub(crate) mod drivers;
pub(crate) mod repositories;
pub(crate) mod services;
pub(crate) mod tasks;
pub(crate) mod types;
