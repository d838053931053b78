//! Integration tests for the streamed HTTP upload.

mod common;

use core::convert::Infallible;

use common::{Rig, TOKEN, TestService, image, md5_hex};
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_io_async::{ErrorType, Read};
use lightwave_ota::codec::StatusInfo;
use lightwave_ota::ports::Partition;
use lightwave_ota::transport::rest::{
    render_error, render_legacy, render_success, render_version,
};
use lightwave_ota::transport::{UploadHeaders, receive_upload};
use lightwave_ota::{Completion, ErrorKind, OtaError, Owner, SessionControl, Transport};

const BOUNDARY: &str = "----lightwaveXYZ";

type SharedService<'a> = Mutex<CriticalSectionRawMutex, TestService<'a>>;

/// Reader handing out at most `step` bytes per call.
struct Trickle<'a> {
    data: &'a [u8],
    step: usize,
}

impl ErrorType for Trickle<'_> {
    type Error = Infallible;
}

impl Read for Trickle<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let n = buf.len().min(self.step).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

fn raw_head(len: usize, extra: &str) -> String {
    format!(
        "Host: lightwave.local\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nX-OTA-Token: {}\r\n{}",
        len, TOKEN, extra
    )
}

fn multipart_body(data: &[u8], boundary: &str) -> Vec<u8> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"firmware\"; filename=\"lightwave.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        boundary
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn multipart_head(len: usize) -> String {
    format!(
        "Content-Type: multipart/form-data; boundary={}\r\nContent-Length: {}\r\nx-ota-token: {}\r\n",
        BOUNDARY, len, TOKEN
    )
}

fn upload<R: Read>(
    service: &SharedService<'_>,
    head: &str,
    body: &mut R,
    buf_len: usize,
) -> Result<Completion, OtaError> {
    let headers = UploadHeaders::parse(head);
    let mut buf = vec![0u8; buf_len];
    block_on(receive_upload(
        service,
        9,
        Partition::Firmware,
        &headers,
        body,
        &mut buf,
    ))
}

fn rendered(len: usize, buf: &[u8]) -> &str {
    std::str::from_utf8(&buf[..len]).unwrap()
}

// -----------------------------------------------------------------------------
// Test 1: Raw body uploads
// -----------------------------------------------------------------------------

#[test]
fn raw_upload_completes() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(3000);
    let head = raw_head(data.len(), "");

    let completion = upload(&service, &head, &mut data.as_slice(), 512).unwrap();

    assert_eq!(completion.bytes_written, 3000);
    assert!(completion.rebooting);
    assert_eq!(rig.flash.activated(), Some(data));
    assert!(!rig.lock.is_active());
    assert!(rig.restart.scheduled.get().is_some());
}

#[test]
fn raw_upload_checks_md5_header() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(700);
    let head = raw_head(data.len(), &format!("X-OTA-MD5: {}\r\n", md5_hex(&data)));

    assert!(upload(&service, &head, &mut data.as_slice(), 128).is_ok());
}

#[test]
fn raw_upload_with_wrong_md5_fails() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(700);
    let head = raw_head(
        data.len(),
        "X-OTA-MD5: ffffffffffffffffffffffffffffffff\r\n",
    );

    let err = upload(&service, &head, &mut data.as_slice(), 128).unwrap_err();

    assert_eq!(err, OtaError::ChecksumMismatch);
    assert_eq!(err.kind().http_status(), 500);
    assert!(rig.flash.activated().is_none());
    assert!(!rig.lock.is_active());
}

#[test]
fn short_body_counts_as_disconnect() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(400);
    let head = raw_head(1000, "");

    let err = upload(&service, &head, &mut data.as_slice(), 128).unwrap_err();

    assert_eq!(err, OtaError::Disconnected);
    assert_eq!(err.kind(), ErrorKind::Disconnect);
    assert!(!rig.lock.is_active());
    assert_eq!(rig.flash.discarded(), 1);
}

#[test]
fn missing_content_length_is_rejected() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let head = format!("X-OTA-Token: {}\r\n", TOKEN);

    let err = upload(&service, &head, &mut [1u8, 2, 3].as_slice(), 64).unwrap_err();

    assert_eq!(err, OtaError::Malformed("Content-Length"));
    assert_eq!(err.kind().http_status(), 400);
    assert!(!rig.lock.is_active());
}

#[test]
fn missing_token_is_unauthorized() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let head = "Content-Length: 3\r\n";

    let err = upload(&service, head, &mut [1u8, 2, 3].as_slice(), 64).unwrap_err();

    assert_eq!(err, OtaError::Unauthorized);
    assert_eq!(err.kind().http_status(), 401);
}

#[test]
fn upload_is_busy_while_websocket_holds_lock() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let mut request = lightwave_ota::codec::BeginRequest::new(10);
    request.token = Some(TOKEN.try_into().unwrap());
    block_on(service.lock())
        .begin(Owner::websocket(1), &request)
        .unwrap();

    let data = image(10);
    let err = upload(&service, &raw_head(10, ""), &mut data.as_slice(), 64).unwrap_err();

    assert_eq!(err, OtaError::Busy);
    assert_eq!(err.kind().http_status(), 409);
    assert_eq!(rig.lock.active_transport(), Transport::WebSocket);
    assert_eq!(
        block_on(service.lock()).session().unwrap().owner(),
        Owner::websocket(1)
    );
}

#[test]
fn downgrade_header_without_force_is_rejected() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(10);
    let head = raw_head(10, "X-OTA-Version: 1.0.0\r\nX-OTA-Force: false\r\n");

    let err = upload(&service, &head, &mut data.as_slice(), 64).unwrap_err();

    assert!(matches!(err, OtaError::VersionRejected { .. }));
}

// -----------------------------------------------------------------------------
// Test 2: Multipart uploads
// -----------------------------------------------------------------------------

#[test]
fn multipart_upload_completes() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(5000);
    let body = multipart_body(&data, BOUNDARY);

    let completion = upload(
        &service,
        &multipart_head(body.len()),
        &mut body.as_slice(),
        512,
    )
    .unwrap();

    assert_eq!(completion.bytes_written, 5000);
    assert_eq!(rig.flash.activated(), Some(data));
    assert_eq!(
        rig.flash.state.borrow().opened,
        Some((Partition::Firmware, 5000))
    );
}

#[test]
fn multipart_upload_survives_tiny_reads() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(777);
    let body = multipart_body(&data, BOUNDARY);
    let mut reader = Trickle {
        data: &body,
        step: 7,
    };

    let completion = upload(&service, &multipart_head(body.len()), &mut reader, 256).unwrap();

    assert_eq!(completion.bytes_written, 777);
    assert_eq!(rig.flash.activated(), Some(data));
}

#[test]
fn multipart_small_image_fits_first_read() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(20);
    let body = multipart_body(&data, BOUNDARY);

    let completion = upload(
        &service,
        &multipart_head(body.len()),
        &mut body.as_slice(),
        1024,
    )
    .unwrap();

    assert_eq!(completion.bytes_written, 20);
    assert_eq!(rig.flash.activated(), Some(data));
}

#[test]
fn multipart_wrong_closing_boundary_fails() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let data = image(300);
    let mut body = multipart_body(&data, BOUNDARY);
    let len = body.len();
    body[len - 6] = b'Q';

    let err = upload(
        &service,
        &multipart_head(body.len()),
        &mut body.as_slice(),
        256,
    )
    .unwrap_err();

    assert!(matches!(err, OtaError::Malformed(_)));
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(rig.flash.activated().is_none());
    assert!(!rig.lock.is_active());
}

#[test]
fn multipart_without_opening_boundary_fails() {
    let rig = Rig::new();
    let service = Mutex::new(rig.service());
    let body = b"not a multipart body at all, just bytes".to_vec();

    let err = upload(
        &service,
        &multipart_head(body.len()),
        &mut body.as_slice(),
        256,
    )
    .unwrap_err();

    assert!(matches!(err, OtaError::Malformed(_)));
    assert!(!rig.lock.is_active());
}

// -----------------------------------------------------------------------------
// Test 3: Headers
// -----------------------------------------------------------------------------

#[test]
fn header_names_are_case_insensitive() {
    let headers = UploadHeaders::parse(
        "x-ota-token: t\r\nX-OTA-MD5: abc\r\ncontent-length: 12\r\nX-Ota-Version: 2.0.0\r\n",
    );

    assert_eq!(headers.token, Some("t"));
    assert_eq!(headers.md5, Some("abc"));
    assert_eq!(headers.content_length, Some(12));
    assert_eq!(headers.version, Some("2.0.0"));
}

#[test]
fn force_defaults_to_true() {
    assert!(UploadHeaders::parse("").force());
    assert!(UploadHeaders::parse("X-OTA-Force: 1\r\n").force());
    assert!(!UploadHeaders::parse("X-OTA-Force: false\r\n").force());
    assert!(!UploadHeaders::parse("X-OTA-Force: 0\r\n").force());
    assert!(UploadHeaders::parse("X-OTA-Force: TRUE\r\n").force());
}

#[test]
fn unrecognized_force_value_is_not_forced() {
    assert!(!UploadHeaders::parse("X-OTA-Force: no\r\n").force());
    assert!(!UploadHeaders::parse("X-OTA-Force: yes\r\n").force());
    assert!(!UploadHeaders::parse("X-OTA-Force:\r\n").force());
}

#[test]
fn bad_md5_header_is_malformed() {
    let headers = UploadHeaders::parse("X-OTA-MD5: 1234\r\n");

    assert_eq!(
        headers.begin_request(Partition::Firmware, 10).unwrap_err(),
        OtaError::Malformed("X-OTA-MD5")
    );
}

#[test]
fn begin_request_targets_partition() {
    let headers = UploadHeaders::parse("X-OTA-Token: t\r\n");

    let request = headers.begin_request(Partition::Filesystem, 55).unwrap();

    assert_eq!(request.size, 55);
    assert_eq!(request.target, Partition::Filesystem);
    assert_eq!(request.token.as_deref(), Some("t"));
    assert!(request.force);
}

// -----------------------------------------------------------------------------
// Test 4: Responses
// -----------------------------------------------------------------------------

#[test]
fn success_envelope() {
    let completion = Completion {
        bytes_written: 1000,
        duration_ms: 42,
        rebooting: true,
    };
    let mut buf = [0u8; 256];

    let len = render_success(Partition::Firmware, &completion, &mut buf).unwrap();

    assert_eq!(
        rendered(len, &buf),
        r#"{"success":true,"data":{"message":"Firmware update complete","rebooting":true,"bytesWritten":1000,"durationMs":42}}"#
    );
}

#[test]
fn error_envelope() {
    let mut buf = [0u8; 256];

    let len = render_error(&OtaError::Busy, &mut buf).unwrap();

    assert_eq!(
        rendered(len, &buf),
        r#"{"success":false,"error":{"code":"SESSION_BUSY","message":"Another OTA session is already active"}}"#
    );
}

#[test]
fn version_envelope() {
    let info = StatusInfo {
        version: "1.2.0",
        version_number: 10200,
        sketch_size: 100,
        free_space: 200,
        ota_available: true,
        max_ota_size: 200,
    };
    let mut buf = [0u8; 256];

    let len = render_version(&info, &mut buf).unwrap();

    assert_eq!(
        rendered(len, &buf),
        r#"{"success":true,"data":{"version":"1.2.0","versionNumber":10200,"sketchSize":100,"freeSpace":200,"otaAvailable":true,"maxOtaSize":200}}"#
    );
}

#[test]
fn legacy_text_responses() {
    let ok = Ok(Completion {
        bytes_written: 123_456,
        duration_ms: 1,
        rebooting: true,
    });
    let err = Err(OtaError::Unauthorized);

    assert_eq!(
        render_legacy(&ok).as_str(),
        "OK - Firmware updated (123456 bytes), rebooting..."
    );
    assert_eq!(render_legacy(&err).as_str(), "ERROR: Invalid OTA token");
}
