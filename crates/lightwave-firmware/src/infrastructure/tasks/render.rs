use embassy_time::Ticker;
use lightwave_ota::FeedbackIndicator;
use lightwave_ota::ports::LedOutput;
use smart_leds::RGB8;

use crate::infrastructure::config::{self, LED_COUNT};
use crate::infrastructure::drivers::SharedLedStrip;

const LEVEL_MIN: u8 = 96;
const LEVEL_STEP: u8 = 1;

/// Idle light frame loop.
///
/// Renders a slow breathing of the idle color and leaves the strip alone
/// while update feedback is active.
#[embassy_executor::task]
pub(crate) async fn render_task(mut strip: SharedLedStrip, indicator: &'static FeedbackIndicator) {
    let mut ticker = Ticker::every(config::LIGHT.frame_interval);
    let mut frame = [RGB8::default(); LED_COUNT];
    let mut level = LEVEL_MIN;
    let mut rising = true;

    loop {
        ticker.next().await;
        if indicator.is_active() {
            continue;
        }

        (level, rising) = next_level(level, rising);
        frame.fill(scale(config::LIGHT.idle_color, level));
        strip.write(&frame);
    }
}

fn next_level(level: u8, rising: bool) -> (u8, bool) {
    match (rising, level) {
        (true, u8::MAX) => (u8::MAX - LEVEL_STEP, false),
        (true, _) => (level.saturating_add(LEVEL_STEP), true),
        (false, l) if l <= LEVEL_MIN => (LEVEL_MIN + LEVEL_STEP, true),
        (false, _) => (level - LEVEL_STEP, false),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn scale(color: RGB8, level: u8) -> RGB8 {
    let channel = |c: u8| (u16::from(c) * u16::from(level) / 255) as u8;
    RGB8::new(channel(color.r), channel(color.g), channel(color.b))
}
