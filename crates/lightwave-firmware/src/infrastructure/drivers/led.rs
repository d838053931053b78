use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use esp_hal::xtensa_lx::interrupt;
use esp_hal::{gpio::interconnect::PeripheralOutput, peripherals::RMT, rmt::Rmt, time::Rate};
use esp_hal_smartled::{SmartLedsAdapter, buffer_size, smart_led_buffer};
use lightwave_ota::ports::LedOutput;
use smart_leds::{RGB8, SmartLedsWrite};
use static_cell::make_static;

use crate::infrastructure::config::LED_COUNT;

/// WS2812 strip driven through the RMT peripheral.
pub(crate) struct EspLedDriver<'a> {
    adapter: SmartLedsAdapter<'a, { buffer_size(LED_COUNT) }>,
}

impl<'a> EspLedDriver<'a> {
    /// # Panics
    /// Panics if the RMT peripheral rejects the clock configuration.
    pub(crate) fn new<O>(rmt: RMT<'a>, pin: O) -> Self
    where
        O: PeripheralOutput<'a>,
    {
        let rmt = Rmt::new(rmt, Rate::from_mhz(80)).expect("RMT init failed");
        let rmt_buffer = make_static!(smart_led_buffer!(LED_COUNT));
        let adapter = SmartLedsAdapter::new(rmt.channel0, pin, rmt_buffer);

        Self { adapter }
    }

    pub(crate) fn write(&mut self, colors: &[RGB8]) {
        interrupt::free(|| {
            let _ = self.adapter.write(colors.iter().copied());
        });
    }
}

pub(crate) type LedStripMutex = Mutex<CriticalSectionRawMutex, RefCell<EspLedDriver<'static>>>;

/// Strip handle shared by the renderer and the update feedback painter.
#[derive(Clone, Copy)]
pub(crate) struct SharedLedStrip {
    strip: &'static LedStripMutex,
}

impl SharedLedStrip {
    pub(crate) fn new(strip: &'static LedStripMutex) -> Self {
        Self { strip }
    }
}

impl LedOutput for SharedLedStrip {
    fn write(&mut self, colors: &[RGB8]) {
        self.strip.lock(|cell| cell.borrow_mut().write(colors));
    }
}
