//! Flash storage driver with shared mutex access
//!
//! The key-value store and the firmware flasher both go through this mutex,
//! so a token write can never interleave with an image write.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use esp_hal::peripherals::FLASH;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

pub(crate) const BLOCK_SIZE: u32 = 4096;

pub(crate) type FlashStorageMutex = Mutex<CriticalSectionRawMutex, RefCell<FlashStorage<'static>>>;

static FLASH_STORAGE_CELL: StaticCell<FlashStorageMutex> = StaticCell::new();

/// Initialize the shared flash storage mutex from the FLASH peripheral.
///
/// # Panics
/// Panics if called more than once.
pub(crate) fn init_flash_storage_mutex(flash: FLASH<'static>) -> &'static FlashStorageMutex {
    let flash_storage = FlashStorage::new(flash);
    FLASH_STORAGE_CELL.init(Mutex::new(RefCell::new(flash_storage)))
}
