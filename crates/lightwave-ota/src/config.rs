use embassy_time::Duration;

/// Token used when the key-value store cannot be reached and the build did
/// not provide one.
pub const DEFAULT_FALLBACK_TOKEN: &str = "lightwave-ota-fallback";

/// Update engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct OtaConfig {
    /// Version string of the running firmware, `major.minor.patch`.
    pub firmware_version: &'static str,
    /// Largest decoded chunk accepted from the WebSocket transport.
    pub max_chunk_size: usize,
    /// Refuse to finalize an image when neither `begin` nor `verify`
    /// supplied a checksum.
    pub require_checksum: bool,
    /// Percentage step between feedback and log updates.
    pub progress_step: u8,
    /// Delay between a completed update and the restart.
    pub restart_delay: Duration,
}

impl OtaConfig {
    pub const DEFAULT: Self = Self {
        firmware_version: "0.0.0",
        max_chunk_size: 4096,
        require_checksum: false,
        progress_step: 10,
        restart_delay: Duration::from_millis(500),
    };

    #[must_use]
    pub const fn with_firmware_version(mut self, version: &'static str) -> Self {
        self.firmware_version = version;
        self
    }

    #[must_use]
    pub const fn with_require_checksum(mut self, require: bool) -> Self {
        self.require_checksum = require;
        self
    }

    #[must_use]
    pub const fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
