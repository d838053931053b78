#![allow(clippy::unreadable_literal)]

use embassy_time::Duration;
use lightwave_ota::OtaConfig;
use smart_leds::RGB8;

pub(crate) const BUILD_VERSION: &str = env!("BUILD_VERSION");
pub(crate) const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");

pub(crate) struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

pub(crate) struct DeviceConfig {
    pub name: &'static str,
    pub hostname: &'static str,
}

pub(crate) struct LightConfig {
    pub led_count: usize,
    /// Pixel the progress bar grows from.
    pub feedback_center: usize,
    pub idle_color: RGB8,
    pub frame_interval: Duration,
}

pub(crate) struct HttpConfig {
    pub port: u16,
    pub socket_timeout: Duration,
}

pub(crate) struct SecurityConfig {
    /// Served when the token store is unreadable.
    pub fallback_token: &'static str,
    /// Key for the token admin routes; routes are open when unset.
    pub admin_key: Option<&'static str>,
}

pub(crate) struct StorageConfig {
    /// Base address of the `ota_store` partition (see partitions.csv).
    pub store_offset: u32,
}

pub(crate) const WIFI: WifiConfig = WifiConfig {
    ssid: env!("WIFI_SSID"),
    password: env!("WIFI_PASSWORD"),
};

#[cfg(feature = "rs1")]
pub(crate) const DEVICE: DeviceConfig = DeviceConfig {
    name: "Lightwave RS1",
    hostname: "lightwave-rs1",
};
#[cfg(feature = "curtain")]
pub(crate) const DEVICE: DeviceConfig = DeviceConfig {
    name: "Lightwave Curtain",
    hostname: "lightwave-curtain",
};
#[cfg(not(any(feature = "rs1", feature = "curtain")))]
pub(crate) const DEVICE: DeviceConfig = DeviceConfig {
    name: "Lightwave ESP32",
    hostname: "lightwave-esp32",
};

#[cfg(feature = "rs1")]
pub(crate) const LIGHT: LightConfig = LightConfig {
    led_count: 26,
    feedback_center: 13,
    idle_color: RGB8::new(0xFF, 0xAA, 0x78),
    frame_interval: Duration::from_millis(33),
};
#[cfg(feature = "curtain")]
pub(crate) const LIGHT: LightConfig = LightConfig {
    led_count: 160,
    feedback_center: 80,
    idle_color: RGB8::new(0xFF, 0x9C, 0x60),
    frame_interval: Duration::from_millis(33),
};
#[cfg(not(any(feature = "rs1", feature = "curtain")))]
pub(crate) const LIGHT: LightConfig = LightConfig {
    led_count: 6,
    feedback_center: 3,
    idle_color: RGB8::new(0x40, 0x30, 0x20),
    frame_interval: Duration::from_millis(33),
};

pub(crate) const LED_COUNT: usize = LIGHT.led_count;

pub(crate) const HTTP: HttpConfig = HttpConfig {
    port: 80,
    socket_timeout: Duration::from_secs(30),
};

pub(crate) const SECURITY: SecurityConfig = SecurityConfig {
    fallback_token: match option_env!("OTA_FALLBACK_TOKEN") {
        Some(token) => token,
        None => lightwave_ota::config::DEFAULT_FALLBACK_TOKEN,
    },
    admin_key: option_env!("OTA_ADMIN_KEY"),
};

pub(crate) const STORAGE: StorageConfig = StorageConfig {
    store_offset: 0x31_0000,
};

pub(crate) const OTA: OtaConfig = OtaConfig::DEFAULT
    .with_firmware_version(BUILD_VERSION)
    .with_max_chunk_size(2048);

#[macro_export]
macro_rules! led_gpio {
    ($p:expr) => {
        $p.GPIO25
    };
}
