use embassy_net::Runner;
use embassy_time::{Duration, Timer};
use esp_println::println;
use esp_radio::wifi::{
    ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState,
};
use lightwave_ota::SessionLock;

use crate::infrastructure::config;

/// Background task for connecting to the `WiFi` network
///
/// Reconnects after a drop, but never while an update owns the session.
#[embassy_executor::task]
pub(crate) async fn wifi_connection_task(
    mut controller: WifiController<'static>,
    session_lock: &'static SessionLock,
) {
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            Timer::after(Duration::from_millis(2000)).await;
        }

        if session_lock.is_active() {
            println!(
                "wifi: reconnect deferred, {} update in progress",
                session_lock.active_transport().as_str()
            );
            while session_lock.is_active() {
                Timer::after(Duration::from_millis(500)).await;
            }
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let client_config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(config::WIFI.ssid.into())
                    .with_password(config::WIFI.password.into()),
            );
            if let Err(e) = controller.set_config(&client_config) {
                println!("wifi: invalid client config: {e:?}");
                Timer::after(Duration::from_millis(5000)).await;
                continue;
            }
            if let Err(e) = controller.start_async().await {
                println!("wifi: failed to start: {e:?}");
                Timer::after(Duration::from_millis(5000)).await;
                continue;
            }
        }

        if let Err(e) = controller.connect_async().await {
            println!("wifi: failed to connect: {e:?}");
            Timer::after(Duration::from_millis(5000)).await;
        }
    }
}

/// Background task for running the network stack
#[embassy_executor::task]
pub(crate) async fn network_runner_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}
