use core::sync::atomic::{AtomicU32, Ordering};

use embassy_net::{Stack, tcp::TcpSocket};
use embassy_time::Duration;
#[cfg(feature = "log")]
use esp_println::println;

use super::{HttpResult, connection::HttpConnection};

/// Shared by every server instance so ids stay unique across workers.
static NEXT_CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) trait HttpHandler {
    async fn handle_request(&self, conn: HttpConnection<'_>) -> HttpResult;
}

pub(crate) struct HttpServer<'a, T: HttpHandler, const TX_SIZE: usize, const RX_SIZE: usize> {
    handler: &'a T,
    timeout: Duration,
}

impl<'a, T: HttpHandler, const TX_SIZE: usize, const RX_SIZE: usize>
    HttpServer<'a, T, TX_SIZE, RX_SIZE>
{
    pub(crate) fn new(handler: &'a T, timeout: Duration) -> Self {
        Self { handler, timeout }
    }
}

impl<T: HttpHandler, const TX_SIZE: usize, const RX_SIZE: usize>
    HttpServer<'_, T, TX_SIZE, RX_SIZE>
{
    pub(crate) async fn listen_and_serve(
        &self,
        stack: Stack<'static>,
        port: u16,
        rx_buffer: &mut [u8; RX_SIZE],
        tx_buffer: &mut [u8; TX_SIZE],
    ) -> HttpResult {
        loop {
            let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
            socket.set_timeout(Some(self.timeout));

            if socket.accept(port).await.is_err() {
                continue;
            }

            let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
            let conn = match HttpConnection::from_socket(id, socket).await {
                Ok(connection) => connection,
                Err(_e) => {
                    #[cfg(feature = "log")]
                    println!("http: #{} startup error: {:?}", id, _e);
                    continue;
                }
            };

            if let Err(_e) = self.handler.handle_request(conn).await {
                #[cfg(feature = "log")]
                println!("http: #{} connection error: {:?}", id, _e);
            }
        }
    }
}
