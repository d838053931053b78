//! HTTP server workers.
//!
//! Each worker owns one socket, so a WebSocket client can stay connected on
//! one worker while REST requests are served by the other.

use embassy_net::Stack;
#[cfg(feature = "log")]
use esp_println::println;

use crate::controllers::LightwaveHttpController;
use crate::infrastructure::config;
use crate::net::http::HttpServer;

pub(crate) const HTTP_WORKERS: usize = 2;

const RX_BUFFER_SIZE: usize = 4096;
const TX_BUFFER_SIZE: usize = 1024;

#[embassy_executor::task(pool_size = 2)]
pub(crate) async fn http_server_task(
    stack: Stack<'static>,
    handler: &'static LightwaveHttpController,
) {
    let server = HttpServer::<LightwaveHttpController, TX_BUFFER_SIZE, RX_BUFFER_SIZE>::new(
        handler,
        config::HTTP.socket_timeout,
    );
    let mut rx_buffer = [0u8; RX_BUFFER_SIZE];
    let mut tx_buffer = [0u8; TX_BUFFER_SIZE];

    if let Err(_e) = server
        .listen_and_serve(stack, config::HTTP.port, &mut rx_buffer, &mut tx_buffer)
        .await
    {
        #[cfg(feature = "log")]
        println!("http: server stopped: {:?}", _e);
    }
}
