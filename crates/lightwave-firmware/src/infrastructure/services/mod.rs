pub(crate) mod firmware;
pub(crate) mod restart;

pub(crate) use firmware::EspFirmwareFlasher;
pub(crate) use restart::{DeferredRestart, RESTART_SIGNAL};
