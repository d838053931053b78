//! WebSocket session loop on `/ws`.

use embassy_net::tcp::TcpSocket;
#[cfg(feature = "log")]
use esp_println::println;
use lightwave_ota::transport::WsOtaHandler;

use crate::infrastructure::config;
use crate::infrastructure::types::OtaServiceMutex;
use crate::net::http::{Error as HttpError, HttpResult};
use crate::net::ws::{self, CLOSE_INVALID_DATA, CLOSE_NORMAL, Opcode, WsError};

/// Largest decoded `ota.chunk` payload.
const MAX_CHUNK_SIZE: usize = config::OTA.max_chunk_size;
/// Base64 of a full chunk plus the JSON envelope.
const FRAME_BUFFER_SIZE: usize = 3072;
const REPLY_BUFFER_SIZE: usize = 512;

/// Serve text frames until the peer leaves, then drop any session it owned.
pub(crate) async fn serve_websocket(
    ota: &OtaServiceMutex,
    socket: &mut TcpSocket<'_>,
    connection: u32,
) -> HttpResult {
    let mut handler = WsOtaHandler::<MAX_CHUNK_SIZE>::new(MAX_CHUNK_SIZE);
    let mut frame_buf = [0u8; FRAME_BUFFER_SIZE];
    let mut reply = [0u8; REPLY_BUFFER_SIZE];

    #[cfg(feature = "log")]
    println!("ws: #{} connected", connection);

    let outcome = loop {
        let frame = match ws::read_frame(socket, &mut frame_buf).await {
            Ok(frame) => frame,
            Err(err) => break Err(err),
        };
        let payload = &frame_buf[..frame.len];

        match frame.opcode {
            Opcode::Text => {
                let Ok(text) = core::str::from_utf8(payload) else {
                    let _ = ws::write_close(socket, CLOSE_INVALID_DATA).await;
                    break Ok(());
                };
                let written = {
                    let mut service = ota.lock().await;
                    handler.handle(&mut *service, connection, text, &mut reply)
                };
                match written {
                    Ok(Some(len)) => {
                        if let Err(err) = ws::write_frame(socket, Opcode::Text, &reply[..len]).await {
                            break Err(err);
                        }
                    }
                    Ok(None) => {}
                    Err(_e) => {
                        #[cfg(feature = "log")]
                        println!("ws: #{} reply did not fit: {:?}", connection, _e);
                    }
                }
            }
            Opcode::Ping => {
                if let Err(err) = ws::write_frame(socket, Opcode::Pong, payload).await {
                    break Err(err);
                }
            }
            Opcode::Close => {
                let _ = ws::write_close(socket, CLOSE_NORMAL).await;
                break Ok(());
            }
            Opcode::Binary | Opcode::Pong => {}
        }
    };

    if let Err(err) = &outcome
        && !matches!(err, WsError::Closed)
    {
        let _ = ws::write_close(socket, err.close_code()).await;
    }

    let mut service = ota.lock().await;
    handler.on_disconnect(&mut *service, connection);
    #[cfg(feature = "log")]
    println!("ws: #{} closed", connection);

    match outcome {
        Ok(()) | Err(WsError::Closed) => Ok(()),
        Err(_) => Err(HttpError::Parse),
    }
}
