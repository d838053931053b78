//! LED progress display for updates.
//!
//! While an update runs the painter writes straight to the strip and raises
//! the [`FeedbackIndicator`] flag; the render loop checks the flag and skips
//! its frames so the two never fight over the output.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use smart_leds::RGB8;

use crate::ports::{LedOutput, UpdateFeedback};

pub const PROGRESS_COLOR: RGB8 = RGB8::new(0, 96, 255);
pub const SUCCESS_COLOR: RGB8 = RGB8::new(0, 255, 0);
pub const FAILURE_COLOR: RGB8 = RGB8::new(255, 0, 0);

const FLASH_COUNT: u8 = 3;
const FLASH_ON_MS: u32 = 150;
const FLASH_OFF_MS: u32 = 150;

const OFF: RGB8 = RGB8::new(0, 0, 0);

/// Render-suppression flag shared with the render loop.
#[derive(Debug)]
pub struct FeedbackIndicator {
    active: AtomicBool,
}

impl FeedbackIndicator {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// The renderer must not touch the strip while this is set.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Hand the strip back to the renderer without repainting.
    pub fn restore(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Default for FeedbackIndicator {
    fn default() -> Self {
        Self::new()
    }
}

/// Paints update feedback onto a strip of `N` pixels.
pub struct FeedbackPainter<'a, O, D, const N: usize> {
    indicator: &'a FeedbackIndicator,
    output: O,
    delay: D,
    center: usize,
    frame: [RGB8; N],
}

impl<'a, O: LedOutput, D: DelayNs, const N: usize> FeedbackPainter<'a, O, D, N> {
    pub fn new(indicator: &'a FeedbackIndicator, output: O, delay: D) -> Self {
        Self {
            indicator,
            output,
            delay,
            center: N / 2,
            frame: [OFF; N],
        }
    }

    /// Move the point progress grows from. Clamped to the strip.
    #[must_use]
    pub fn with_center(mut self, center: usize) -> Self {
        self.center = center.min(N);
        self
    }

    pub fn indicator(&self) -> &'a FeedbackIndicator {
        self.indicator
    }

    pub fn frame(&self) -> &[RGB8; N] {
        &self.frame
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Light the strip outward from the center in proportion to `percent`.
    pub fn show_progress(&mut self, percent: u8) {
        self.indicator.activate();

        let percent = usize::from(percent.min(100));
        let reach = self.center.max(N - self.center);
        let radius = (percent * reach).div_ceil(100);

        let center = self.center;
        for (index, pixel) in self.frame.iter_mut().enumerate() {
            let distance = if index >= center {
                index - center
            } else {
                center - 1 - index
            };
            *pixel = if distance < radius { PROGRESS_COLOR } else { OFF };
        }
        self.output.write(&self.frame);
    }

    /// Flash green. The flag stays raised since a restart follows.
    pub fn show_success(&mut self) {
        self.indicator.activate();
        self.flash(SUCCESS_COLOR);
    }

    /// Flash red, then hand the strip back to the renderer.
    pub fn show_failure(&mut self) {
        self.indicator.activate();
        self.flash(FAILURE_COLOR);
        self.indicator.restore();
    }

    pub fn restore(&self) {
        self.indicator.restore();
    }

    fn flash(&mut self, color: RGB8) {
        for _ in 0..FLASH_COUNT {
            self.fill(color);
            self.delay.delay_ms(FLASH_ON_MS);
            self.fill(OFF);
            self.delay.delay_ms(FLASH_OFF_MS);
        }
    }

    fn fill(&mut self, color: RGB8) {
        self.frame = [color; N];
        self.output.write(&self.frame);
    }
}

impl<O: LedOutput, D: DelayNs, const N: usize> UpdateFeedback for FeedbackPainter<'_, O, D, N> {
    fn on_progress(&mut self, percent: u8) {
        self.show_progress(percent);
    }

    fn on_success(&mut self) {
        self.show_success();
    }

    fn on_failure(&mut self) {
        self.show_failure();
    }
}
