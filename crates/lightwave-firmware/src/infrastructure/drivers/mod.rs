mod flash_storage;
mod led;
mod network;
mod random;

pub(crate) use flash_storage::{BLOCK_SIZE, FlashStorageMutex, init_flash_storage_mutex};
pub(crate) use led::{EspLedDriver, LedStripMutex, SharedLedStrip};
pub(crate) use network::init_network_stack;
pub(crate) use random::EspEntropy;
