//! Traits implemented by the hardware layer.

use embassy_time::Duration;
use smart_leds::RGB8;

/// Flash region an image is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Firmware,
    Filesystem,
}

impl Partition {
    pub const fn as_str(self) -> &'static str {
        match self {
            Partition::Firmware => "firmware",
            Partition::Filesystem => "filesystem",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "firmware" => Some(Partition::Firmware),
            "filesystem" => Some(Partition::Filesystem),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be opened at all.
    Unavailable,
    /// Value does not fit the record.
    Capacity,
    /// Underlying driver failed.
    Driver,
}

/// Namespaced key-value persistence.
pub trait KeyValueStore {
    /// Read `key` into `buf`, returning the value length, or `None` when the
    /// key is absent.
    fn read(&mut self, namespace: &str, key: &str, buf: &mut [u8])
    -> Result<Option<usize>, StoreError>;

    fn write(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError>;
}

/// Hardware random source.
pub trait EntropySource {
    fn fill_bytes(&mut self, buf: &mut [u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Partition table missing or unreadable.
    PartitionTable,
    /// No partition for the requested target.
    NoPartition,
    /// Image larger than the target partition.
    TooLarge,
    Erase,
    Write,
    /// The new slot could not be marked bootable.
    Activate,
}

impl FlashError {
    pub const fn as_str(self) -> &'static str {
        match self {
            FlashError::PartitionTable => "partition table unreadable",
            FlashError::NoPartition => "no target partition",
            FlashError::TooLarge => "image larger than partition",
            FlashError::Erase => "flash erase failed",
            FlashError::Write => "flash write failed",
            FlashError::Activate => "partition activation failed",
        }
    }
}

/// Flash primitive that opens update targets.
pub trait FirmwareFlasher {
    type Target: FlashTarget;

    /// Size of the image currently running.
    fn running_image_size(&mut self) -> u32;

    /// Bytes available for an image of the given kind.
    fn free_space(&mut self, partition: Partition) -> u32;

    /// Prepare a target able to hold `size` bytes.
    fn begin(&mut self, partition: Partition, size: u32) -> Result<Self::Target, FlashError>;
}

/// An inactive partition being filled with a new image.
///
/// Writes are blocking and bounded by one sector erase plus the chunk
/// programming time.
pub trait FlashTarget {
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Flush pending bytes and make the image bootable.
    fn finalize(self) -> Result<(), FlashError>;

    /// Drop the partial image; the partition stays inactive.
    fn discard(self);
}

/// LED strip output used by the feedback painter.
pub trait LedOutput {
    fn write(&mut self, colors: &[RGB8]);
}

/// Schedules the device restart after a completed update.
pub trait RestartScheduler {
    fn schedule_restart(&mut self, after: Duration);
}

/// Visual reaction to session milestones.
pub trait UpdateFeedback {
    fn on_progress(&mut self, percent: u8);
    fn on_success(&mut self);
    fn on_failure(&mut self);
}
