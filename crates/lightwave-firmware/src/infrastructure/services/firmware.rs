//! Flash side of the update engine.
//!
//! Firmware images go to the OTA app slot after the running one and are
//! activated through the ESP-IDF `otadata` partition. Filesystem images go
//! to the `spiffs` data partition and need no activation.

use embedded_storage::Storage;
use esp_bootloader_esp_idf::ota::{Ota, OtaImageState, Slot};
use esp_bootloader_esp_idf::partitions::{
    AppPartitionSubType, DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType,
    read_partition_table,
};
use esp_println::println;
use esp_storage::FlashStorage;
use lightwave_ota::ports::{FirmwareFlasher, FlashError, FlashTarget, Partition};

use crate::infrastructure::drivers::FlashStorageMutex;

type TableBuffer = [u8; PARTITION_TABLE_MAX_LEN];

/// Location of an update target.
#[derive(Debug, Clone, Copy)]
struct Region {
    offset: u32,
    len: u32,
    /// OTA slot to activate after a firmware image is written.
    slot: Option<Slot>,
}

pub(crate) struct EspFirmwareFlasher {
    flash: &'static FlashStorageMutex,
}

impl EspFirmwareFlasher {
    pub(crate) fn new(flash: &'static FlashStorageMutex) -> Self {
        Self { flash }
    }

    /// Mark a freshly booted image as valid so the bootloader keeps it.
    pub(crate) fn handle_boot_state(&self) {
        self.flash.lock(|cell| {
            let mut flash = cell.borrow_mut();
            let mut buffer = [0u8; PARTITION_TABLE_MAX_LEN];

            let Ok(pt) = read_partition_table(&mut *flash, &mut buffer) else {
                println!("ota: failed to read partition table");
                return;
            };
            let Ok(Some(ota_data_part)) =
                pt.find_partition(PartitionType::Data(DataPartitionSubType::Ota))
            else {
                println!("ota: no OTA data partition found (OTA not configured)");
                return;
            };

            let mut ota_region = ota_data_part.as_embedded_storage(&mut *flash);
            let Ok(mut ota) = Ota::new(&mut ota_region) else {
                println!("ota: failed to open otadata for boot state check");
                return;
            };
            if !matches!(ota.current_slot(), Ok(slot) if slot != Slot::None) {
                println!("ota: running from the factory image");
                return;
            }

            match ota.current_ota_state() {
                Ok(OtaImageState::New | OtaImageState::PendingVerify) => {
                    if ota.set_current_ota_state(OtaImageState::Valid).is_ok() {
                        println!("ota: marked current image as VALID");
                    } else {
                        println!("ota: failed to mark current image as VALID");
                    }
                }
                Ok(state) => println!("ota: current image state: {:?}", state),
                Err(_) => println!("ota: current image state unreadable"),
            }
        });
    }

    fn locate(&self, partition: Partition) -> Result<Region, FlashError> {
        self.flash.lock(|cell| {
            let mut flash = cell.borrow_mut();
            let mut buffer = [0u8; PARTITION_TABLE_MAX_LEN];

            let (kind, slot) = match partition {
                Partition::Firmware => {
                    let slot = current_slot(&mut flash, &mut buffer)?.next();
                    (app_partition(slot), Some(slot))
                }
                Partition::Filesystem => (PartitionType::Data(DataPartitionSubType::Spiffs), None),
            };
            let (offset, len) = find(&mut flash, &mut buffer, kind)?;
            Ok(Region { offset, len, slot })
        })
    }
}

impl FirmwareFlasher for EspFirmwareFlasher {
    type Target = EspFlashTarget;

    fn running_image_size(&mut self) -> u32 {
        let running = self.flash.lock(|cell| {
            let mut flash = cell.borrow_mut();
            let mut buffer = [0u8; PARTITION_TABLE_MAX_LEN];
            let kind = match current_slot(&mut flash, &mut buffer)? {
                Slot::None => PartitionType::App(AppPartitionSubType::Factory),
                slot => app_partition(slot),
            };
            find(&mut flash, &mut buffer, kind)
        });
        running.map_or(0, |(_, len)| len)
    }

    fn free_space(&mut self, partition: Partition) -> u32 {
        self.locate(partition).map_or(0, |region| region.len)
    }

    fn begin(&mut self, partition: Partition, size: u32) -> Result<EspFlashTarget, FlashError> {
        let region = self.locate(partition)?;
        if size > region.len {
            return Err(FlashError::TooLarge);
        }

        println!(
            "ota: writing {} image to 0x{:X} ({} of {} bytes, slot {:?})",
            partition.as_str(),
            region.offset,
            size,
            region.len,
            region.slot
        );
        Ok(EspFlashTarget {
            flash: self.flash,
            region,
        })
    }
}

pub(crate) struct EspFlashTarget {
    flash: &'static FlashStorageMutex,
    region: Region,
}

impl FlashTarget for EspFlashTarget {
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        let len = u32::try_from(data.len()).map_err(|_| FlashError::TooLarge)?;
        match offset.checked_add(len) {
            Some(end) if end <= self.region.len => {}
            _ => return Err(FlashError::TooLarge),
        }

        let address = self.region.offset + offset;
        self.flash.lock(|cell| {
            cell.borrow_mut()
                .write(address, data)
                .map_err(|_| FlashError::Write)
        })
    }

    fn finalize(self) -> Result<(), FlashError> {
        let Some(slot) = self.region.slot else {
            return Ok(());
        };

        self.flash.lock(|cell| {
            let mut flash = cell.borrow_mut();
            let mut buffer = [0u8; PARTITION_TABLE_MAX_LEN];
            let pt = read_partition_table(&mut *flash, &mut buffer)
                .map_err(|_| FlashError::PartitionTable)?;
            let ota_data_part = pt
                .find_partition(PartitionType::Data(DataPartitionSubType::Ota))
                .map_err(|_| FlashError::PartitionTable)?
                .ok_or(FlashError::NoPartition)?;

            let mut ota_region = ota_data_part.as_embedded_storage(&mut *flash);
            let mut ota = Ota::new(&mut ota_region).map_err(|_| FlashError::Activate)?;
            ota.set_current_slot(slot)
                .map_err(|_| FlashError::Activate)?;
            // The next boot marks it valid, see `handle_boot_state`.
            ota.set_current_ota_state(OtaImageState::New)
                .map_err(|_| FlashError::Activate)?;

            println!("ota: slot {:?} activated", slot);
            Ok(())
        })
    }

    fn discard(self) {
        println!(
            "ota: discarded partial image at 0x{:X}, slot stays inactive",
            self.region.offset
        );
    }
}

fn app_partition(slot: Slot) -> PartitionType {
    match slot {
        Slot::None | Slot::Slot0 => PartitionType::App(AppPartitionSubType::Ota0),
        Slot::Slot1 => PartitionType::App(AppPartitionSubType::Ota1),
    }
}

fn current_slot(flash: &mut FlashStorage<'static>, buffer: &mut TableBuffer) -> Result<Slot, FlashError> {
    let pt = read_partition_table(&mut *flash, buffer).map_err(|_| FlashError::PartitionTable)?;
    let ota_data_part = pt
        .find_partition(PartitionType::Data(DataPartitionSubType::Ota))
        .map_err(|_| FlashError::PartitionTable)?
        .ok_or(FlashError::NoPartition)?;

    let mut ota_region = ota_data_part.as_embedded_storage(&mut *flash);
    let mut ota = Ota::new(&mut ota_region).map_err(|_| FlashError::PartitionTable)?;
    ota.current_slot().map_err(|_| FlashError::PartitionTable)
}

/// Offset and length of the first partition of `kind`.
fn find(
    flash: &mut FlashStorage<'static>,
    buffer: &mut TableBuffer,
    kind: PartitionType,
) -> Result<(u32, u32), FlashError> {
    let pt = read_partition_table(&mut *flash, buffer).map_err(|_| FlashError::PartitionTable)?;
    let entry = pt
        .find_partition(kind)
        .map_err(|_| FlashError::PartitionTable)?
        .ok_or(FlashError::NoPartition)?;
    Ok((entry.offset(), entry.len()))
}
