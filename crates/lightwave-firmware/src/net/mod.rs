pub(crate) mod http;
pub(crate) mod ws;

use embassy_net::Stack;
use embassy_time::{Duration, Timer};

/// Wait for the link and a DHCP lease.
pub(crate) async fn wait_for_connection(stack: Stack<'_>) -> embassy_net::StaticConfigV4 {
    while !stack.is_link_up() {
        Timer::after(Duration::from_millis(100)).await;
    }
    loop {
        if let Some(config) = stack.config_v4() {
            return config;
        }
        Timer::after(Duration::from_millis(100)).await;
    }
}
