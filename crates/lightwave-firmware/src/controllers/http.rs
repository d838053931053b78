//! REST routes of the update engine and the WebSocket upgrade.

#[cfg(feature = "log")]
use esp_println::println;
use lightwave_ota::SessionControl as _;
use lightwave_ota::ports::Partition;
use lightwave_ota::transport::admin::{
    API_KEY_HEADER, TOKEN_PATH, apply, authorize, decode_action, render_admin_error, render_token,
};
use lightwave_ota::transport::rest::{
    FILESYSTEM_PATH, LEGACY_UPDATE_PATH, UPDATE_PATH, VERSION_PATH, render_error, render_legacy,
    render_success, render_version,
};
use lightwave_ota::transport::{UploadHeaders, receive_upload};
use lightwave_ota::{Completion, OtaError};

use super::ws::serve_websocket;
use crate::infrastructure::config;
use crate::infrastructure::types::{OtaServiceMutex, OtaTokens};
use crate::net::http::{
    ContentType, Error as HttpError, HttpConnection, HttpHandler, HttpMethod, HttpResult,
    ResponseHeaders,
};
use crate::net::ws;

pub(crate) const WS_PATH: &str = "/ws";

/// Receive buffer for streamed uploads; holds the multipart preamble.
const UPLOAD_BUFFER_SIZE: usize = 1024;
const RESPONSE_BUFFER_SIZE: usize = 256;

enum Route {
    Version,
    Upload(Partition),
    LegacyUpload,
    GetToken,
    SetToken,
    WebSocket,
    NotFound,
}

impl Route {
    fn resolve(conn: &HttpConnection<'_>) -> Self {
        match conn.route() {
            (HttpMethod::Get, VERSION_PATH) => Route::Version,
            (HttpMethod::Post, UPDATE_PATH) => Route::Upload(Partition::Firmware),
            (HttpMethod::Post, FILESYSTEM_PATH) => Route::Upload(Partition::Filesystem),
            (HttpMethod::Post, LEGACY_UPDATE_PATH) => Route::LegacyUpload,
            (HttpMethod::Get, TOKEN_PATH) => Route::GetToken,
            (HttpMethod::Post, TOKEN_PATH) => Route::SetToken,
            (HttpMethod::Get, WS_PATH) => Route::WebSocket,
            _ => Route::NotFound,
        }
    }
}

pub(crate) struct LightwaveHttpController {
    ota: &'static OtaServiceMutex,
    tokens: &'static OtaTokens,
}

impl LightwaveHttpController {
    pub(crate) fn new(ota: &'static OtaServiceMutex, tokens: &'static OtaTokens) -> Self {
        Self { ota, tokens }
    }

    async fn handle_version(&self, conn: &mut HttpConnection<'_>) -> HttpResult {
        let info = self.ota.lock().await.status();
        let mut body = [0u8; RESPONSE_BUFFER_SIZE];
        let len = render_version(&info, &mut body).map_err(|_| HttpError::FormatHeaders)?;
        conn.respond(200, ContentType::Json, &body[..len]).await
    }

    async fn handle_upload(&self, conn: &mut HttpConnection<'_>, partition: Partition) -> HttpResult {
        let result = self.receive(conn, partition).await;

        let mut body = [0u8; RESPONSE_BUFFER_SIZE];
        let (status, len) = match &result {
            Ok(completion) => (200, render_success(partition, completion, &mut body)),
            Err(err) => (err.kind().http_status(), render_error(err, &mut body)),
        };
        let len = len.map_err(|_| HttpError::FormatHeaders)?;
        conn.respond(status, ContentType::Json, &body[..len]).await
    }

    async fn handle_legacy_upload(&self, conn: &mut HttpConnection<'_>) -> HttpResult {
        let result = self.receive(conn, Partition::Firmware).await;

        let status = match &result {
            Ok(_) => 200,
            Err(err) => err.kind().http_status(),
        };
        let text = render_legacy(&result);
        conn.respond(status, ContentType::TextPlain, text.as_bytes())
            .await
    }

    async fn receive(
        &self,
        conn: &mut HttpConnection<'_>,
        partition: Partition,
    ) -> Result<Completion, OtaError> {
        let id = conn.id;
        let (head, mut body) = conn.upload_parts();
        let headers = UploadHeaders::parse(head);
        let mut buf = [0u8; UPLOAD_BUFFER_SIZE];

        let result = receive_upload(self.ota, id, partition, &headers, &mut body, &mut buf).await;
        #[cfg(feature = "log")]
        match &result {
            Ok(done) => println!(
                "http: #{} {} upload done, {} bytes in {} ms",
                id,
                partition.as_str(),
                done.bytes_written,
                done.duration_ms
            ),
            Err(err) => println!("http: #{} {} upload failed: {}", id, partition.as_str(), err),
        }
        result
    }

    async fn handle_get_token(&self, conn: &mut HttpConnection<'_>) -> HttpResult {
        let mut body = [0u8; RESPONSE_BUFFER_SIZE];
        let rendered = match authorize(config::SECURITY.admin_key, conn.header(API_KEY_HEADER)) {
            Ok(()) => (200, self.render_token(&mut body)),
            Err(err) => (err.http_status(), render_admin_error(err, &mut body)),
        };
        respond_json(conn, rendered, &body).await
    }

    async fn handle_set_token(&self, conn: &mut HttpConnection<'_>) -> HttpResult {
        let mut body = [0u8; RESPONSE_BUFFER_SIZE];
        let authorized = authorize(config::SECURITY.admin_key, conn.header(API_KEY_HEADER));
        let outcome = match authorized {
            Ok(()) => {
                let request = conn.read_body().await?;
                decode_action(request).and_then(|action| {
                    self.tokens
                        .lock(|cell| apply(&mut cell.borrow_mut(), action))
                })
            }
            Err(err) => Err(err),
        };

        let rendered = match outcome {
            Ok(()) => {
                #[cfg(feature = "log")]
                println!("http: #{} ota token updated", conn.id);
                (200, self.render_token(&mut body))
            }
            Err(err) => (err.http_status(), render_admin_error(err, &mut body)),
        };
        respond_json(conn, rendered, &body).await
    }

    fn render_token(&self, out: &mut [u8]) -> Result<usize, lightwave_ota::codec::EncodeError> {
        self.tokens
            .lock(|cell| render_token(cell.borrow().token(), out))
    }

    async fn handle_websocket(&self, mut conn: HttpConnection<'_>) -> HttpResult {
        let is_upgrade = conn
            .header("Upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
        let version_ok = conn.header("Sec-WebSocket-Version") == Some("13");
        let key = conn.header("Sec-WebSocket-Key").filter(|_| is_upgrade && version_ok);
        let Some(key) = key else {
            conn.write_headers(&ResponseHeaders::bad_request()).await?;
            return conn.finish().await;
        };

        let accept = ws::accept_key(key);
        conn.write_headers(&ResponseHeaders::websocket_upgrade(accept))
            .await?;

        let id = conn.id;
        let mut socket = conn.into_socket();
        let result = serve_websocket(self.ota, &mut socket, id).await;
        socket.close();
        let _ = socket.flush().await;
        result
    }
}

impl HttpHandler for LightwaveHttpController {
    async fn handle_request(&self, conn: HttpConnection<'_>) -> HttpResult {
        let mut conn = conn;
        match Route::resolve(&conn) {
            Route::Version => self.handle_version(&mut conn).await?,
            Route::Upload(partition) => self.handle_upload(&mut conn, partition).await?,
            Route::LegacyUpload => self.handle_legacy_upload(&mut conn).await?,
            Route::GetToken => self.handle_get_token(&mut conn).await?,
            Route::SetToken => self.handle_set_token(&mut conn).await?,
            Route::WebSocket => return self.handle_websocket(conn).await,
            Route::NotFound => serve_404(&mut conn).await?,
        }
        conn.finish().await
    }
}

async fn respond_json(
    conn: &mut HttpConnection<'_>,
    (status, rendered): (u16, Result<usize, lightwave_ota::codec::EncodeError>),
    body: &[u8],
) -> HttpResult {
    let len = rendered.map_err(|_| HttpError::FormatHeaders)?;
    conn.respond(status, ContentType::Json, &body[..len]).await
}

async fn serve_404(conn: &mut HttpConnection<'_>) -> HttpResult {
    conn.write_headers(&ResponseHeaders::not_found()).await
}
