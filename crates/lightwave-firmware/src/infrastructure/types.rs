use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use esp_hal::delay::Delay;
use lightwave_ota::token::SharedTokenStore;
use lightwave_ota::{FeedbackIndicator, FeedbackPainter, OtaService, SessionLock};

use crate::infrastructure::config::LED_COUNT;
use crate::infrastructure::drivers::{EspEntropy, SharedLedStrip};
use crate::infrastructure::repositories::FlashKeyValueStore;
use crate::infrastructure::services::{DeferredRestart, EspFirmwareFlasher};

pub(crate) type OtaTokens = SharedTokenStore<FlashKeyValueStore, EspEntropy>;
pub(crate) type LedFeedback = FeedbackPainter<'static, SharedLedStrip, Delay, LED_COUNT>;
pub(crate) type LightwaveOta =
    OtaService<'static, EspFirmwareFlasher, OtaTokens, LedFeedback, DeferredRestart>;
/// Held for one command at a time, never across a socket read.
pub(crate) type OtaServiceMutex = Mutex<CriticalSectionRawMutex, LightwaveOta>;

/// Single update session across both transports.
pub(crate) static SESSION_LOCK: SessionLock = SessionLock::new();

/// Raised while update feedback owns the LED strip.
pub(crate) static FEEDBACK_INDICATOR: FeedbackIndicator = FeedbackIndicator::new();
