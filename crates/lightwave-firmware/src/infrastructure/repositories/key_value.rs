//! Key-value store kept in the `ota_store` flash sector.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
#[cfg(feature = "log")]
use esp_println::println;
use lightwave_ota::ports::{KeyValueStore, StoreError};
use lightwave_ota::record;

use crate::infrastructure::drivers::{BLOCK_SIZE, FlashStorageMutex};

/// Bytes of the sector holding the record. Multiple of the flash write size.
const RECORD_SIZE: usize = 256;

pub(crate) struct FlashKeyValueStore {
    flash: &'static FlashStorageMutex,
    addr: u32,
}

impl FlashKeyValueStore {
    pub(crate) fn new(flash: &'static FlashStorageMutex, addr: u32) -> Self {
        Self { flash, addr }
    }

    fn load(&self, buf: &mut [u8; RECORD_SIZE]) -> Result<(), StoreError> {
        self.flash.lock(|cell| {
            cell.borrow_mut()
                .read(self.addr, buf)
                .map_err(|_| StoreError::Unavailable)
        })
    }

    fn update(&mut self, namespace: &str, key: &str, value: Option<&[u8]>) -> Result<(), StoreError> {
        let mut current = [0u8; RECORD_SIZE];
        self.load(&mut current)?;
        let mut next = [0u8; RECORD_SIZE];
        record::rebuild(&current, namespace, key, value, &mut next)?;

        self.flash.lock(|cell| {
            let mut flash = cell.borrow_mut();
            if let Err(_e) = flash.erase(self.addr, self.addr + BLOCK_SIZE) {
                #[cfg(feature = "log")]
                println!("kv: failed to erase store sector: {:?}", _e);
                return Err(StoreError::Driver);
            }
            if let Err(_e) = NorFlash::write(&mut *flash, self.addr, &next) {
                #[cfg(feature = "log")]
                println!("kv: failed to write store sector: {:?}", _e);
                return Err(StoreError::Driver);
            }
            Ok(())
        })
    }
}

impl KeyValueStore for FlashKeyValueStore {
    fn read(
        &mut self,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<Option<usize>, StoreError> {
        let mut current = [0u8; RECORD_SIZE];
        self.load(&mut current)?;
        let Some(value) = record::lookup(&current, namespace, key) else {
            return Ok(None);
        };
        let target = buf.get_mut(..value.len()).ok_or(StoreError::Capacity)?;
        target.copy_from_slice(value);
        Ok(Some(value.len()))
    }

    fn write(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.update(namespace, key, Some(value))
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let mut current = [0u8; RECORD_SIZE];
        self.load(&mut current)?;
        if record::lookup(&current, namespace, key).is_none() {
            return Ok(());
        }
        self.update(namespace, key, None)
    }
}
