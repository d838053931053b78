use embassy_time::Timer;
use esp_println::println;

use crate::infrastructure::services::RESTART_SIGNAL;

/// Waits for a completed update and reboots into the new image.
#[embassy_executor::task]
pub(crate) async fn restart_task() {
    let delay = RESTART_SIGNAL.wait().await;
    println!("ota: rebooting in {} ms", delay.as_millis());
    // Lets the transports flush their final response first.
    Timer::after(delay).await;
    esp_hal::system::software_reset();
}
