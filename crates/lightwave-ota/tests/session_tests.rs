//! Integration tests for the upload state machine.

mod common;

use common::{Rig, Shown, TOKEN, image, md5_bytes};
use embassy_time::Duration;
use lightwave_ota::codec::{BeginRequest, Checksum};
use lightwave_ota::ports::{FlashError, Partition};
use lightwave_ota::token::TokenValue;
use lightwave_ota::{ErrorKind, OtaConfig, OtaError, Owner, Phase, SessionControl, Transport};

const WS: Owner = Owner::websocket(1);
const REST: Owner = Owner::rest(7);

fn begin_request(size: u32) -> BeginRequest {
    let mut request = BeginRequest::new(size);
    let mut token = TokenValue::new();
    token.push_str(TOKEN).unwrap();
    request.token = Some(token);
    request
}

fn with_version(mut request: BeginRequest, version: &str, force: bool) -> BeginRequest {
    let mut value = lightwave_ota::codec::VersionString::new();
    value.push_str(version).unwrap();
    request.version = Some(value);
    request.force = force;
    request
}

fn send_all<C: SessionControl>(control: &mut C, owner: Owner, data: &[u8], chunk: usize) {
    let mut offset = 0u32;
    for piece in data.chunks(chunk) {
        let progress = control.write_chunk(owner, offset, piece).unwrap();
        offset += piece.len() as u32;
        assert_eq!(progress.offset, offset);
    }
}

// -----------------------------------------------------------------------------
// Test 1: Successful update
// -----------------------------------------------------------------------------

#[test]
fn begin_chunks_verify_completes() {
    let rig = Rig::new();
    let mut service = rig.service();
    let data = image(1000);

    let ready = service.begin(WS, &begin_request(1000)).unwrap();
    assert_eq!(ready.total_size, 1000);
    assert_eq!(service.phase(), Phase::Began);
    assert_eq!(rig.lock.active_transport(), Transport::WebSocket);

    send_all(&mut service, WS, &data, 256);
    assert_eq!(service.phase(), Phase::Transferring);

    let checksum = Checksum::new(md5_bytes(&data));
    let completion = service.verify(WS, Some(&checksum)).unwrap();

    assert_eq!(completion.bytes_written, 1000);
    assert!(completion.rebooting);
    assert_eq!(service.phase(), Phase::Completing);
    assert!(service.restart_pending());
    assert!(service.session().is_none());
    assert!(!rig.lock.is_active());
    assert_eq!(rig.flash.activated(), Some(data));
    assert_eq!(rig.restart.scheduled.get(), Some(Duration::from_millis(500)));
    assert_eq!(rig.feedback.last(), Some(Shown::Success));
}

#[test]
fn checksum_from_begin_is_used() {
    let rig = Rig::new();
    let mut service = rig.service();
    let data = image(300);
    let mut request = begin_request(300);
    request.md5 = Some(Checksum::new(md5_bytes(&data)));

    service.begin(REST, &request).unwrap();
    send_all(&mut service, REST, &data, 100);

    assert!(service.verify(REST, None).is_ok());
    assert_eq!(rig.flash.activated(), Some(data));
}

#[test]
fn verify_without_checksum_commits_by_default() {
    let rig = Rig::new();
    let mut service = rig.service();
    let data = image(64);

    service.begin(WS, &begin_request(64)).unwrap();
    send_all(&mut service, WS, &data, 64);

    assert!(service.verify(WS, None).is_ok());
}

#[test]
fn progress_feedback_steps_by_ten_percent() {
    let rig = Rig::new();
    let mut service = rig.service();
    let data = image(1000);

    service.begin(WS, &begin_request(1000)).unwrap();
    send_all(&mut service, WS, &data, 50);

    let progress: Vec<u8> = rig
        .feedback
        .events()
        .into_iter()
        .filter_map(|shown| match shown {
            Shown::Progress(percent) => Some(percent),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
}

#[test]
fn filesystem_target_is_opened() {
    let rig = Rig::new();
    let mut service = rig.service();
    let mut request = begin_request(10);
    request.target = Partition::Filesystem;

    service.begin(WS, &request).unwrap();

    assert_eq!(
        rig.flash.state.borrow().opened,
        Some((Partition::Filesystem, 10))
    );
    assert_eq!(service.session().unwrap().partition(), Partition::Filesystem);
}

// -----------------------------------------------------------------------------
// Test 2: Integrity failures
// -----------------------------------------------------------------------------

#[test]
fn wrong_checksum_discards_image() {
    let rig = Rig::new();
    let mut service = rig.service();
    let data = image(500);

    service.begin(WS, &begin_request(500)).unwrap();
    send_all(&mut service, WS, &data, 128);

    let wrong = Checksum::new([0xAB; 16]);
    let err = service.verify(WS, Some(&wrong)).unwrap_err();

    assert_eq!(err, OtaError::ChecksumMismatch);
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(err.code(), "INTEGRITY_ERROR");
    assert!(!rig.lock.is_active());
    assert!(rig.flash.activated().is_none());
    assert_eq!(rig.flash.discarded(), 1);
    assert_eq!(service.phase(), Phase::Failed);
    assert_eq!(rig.feedback.last(), Some(Shown::Failure));
    assert!(rig.restart.scheduled.get().is_none());
}

#[test]
fn retransmitted_chunk_reports_expected_offset() {
    let rig = Rig::new();
    let mut service = rig.service();
    let data = image(300);

    service.begin(WS, &begin_request(300)).unwrap();
    service.write_chunk(WS, 0, &data[..100]).unwrap();

    let err = service.write_chunk(WS, 0, &data[..100]).unwrap_err();
    assert_eq!(
        err,
        OtaError::OffsetMismatch {
            expected: 100,
            received: 0
        }
    );
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("expected 100"));

    service.write_chunk(WS, 100, &data[100..]).unwrap();
    assert!(service.verify(WS, None).is_ok());
    assert_eq!(rig.flash.activated(), Some(data));
}

#[test]
fn overrun_aborts_session() {
    let rig = Rig::new();
    let mut service = rig.service();

    service.begin(WS, &begin_request(100)).unwrap();
    service.write_chunk(WS, 0, &[1; 60]).unwrap();

    let err = service.write_chunk(WS, 60, &[1; 41]).unwrap_err();

    assert_eq!(
        err,
        OtaError::Overrun {
            offset: 60,
            len: 41,
            total: 100
        }
    );
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(service.session().is_none());
    assert!(!rig.lock.is_active());
    assert_eq!(rig.flash.discarded(), 1);
}

#[test]
fn flash_write_failure_ends_session() {
    let rig = Rig::new();
    let mut service = rig.service();
    rig.flash.state.borrow_mut().fail_write_at = Some(50);

    service.begin(WS, &begin_request(100)).unwrap();
    service.write_chunk(WS, 0, &[2; 50]).unwrap();
    let err = service.write_chunk(WS, 50, &[2; 50]).unwrap_err();

    assert_eq!(err, OtaError::Flash(FlashError::Write));
    assert_eq!(err.code(), "FLASH_ERROR");
    assert_eq!(service.phase(), Phase::Failed);
    assert!(!rig.lock.is_active());
}

#[test]
fn finalize_failure_is_reported() {
    let rig = Rig::new();
    let mut service = rig.service();
    rig.flash.state.borrow_mut().fail_finalize = true;

    service.begin(WS, &begin_request(10)).unwrap();
    service.write_chunk(WS, 0, &[3; 10]).unwrap();
    let err = service.verify(WS, None).unwrap_err();

    assert_eq!(err, OtaError::Flash(FlashError::Activate));
    assert!(!service.restart_pending());
    assert!(!rig.lock.is_active());
    assert!(rig.restart.scheduled.get().is_none());
}

// -----------------------------------------------------------------------------
// Test 3: Session exclusivity
// -----------------------------------------------------------------------------

#[test]
fn second_transport_is_busy() {
    let rig = Rig::new();
    let mut service = rig.service();

    service.begin(WS, &begin_request(100)).unwrap();
    let err = service.begin(REST, &begin_request(100)).unwrap_err();

    assert_eq!(err, OtaError::Busy);
    assert_eq!(err.kind().http_status(), 409);
    assert_eq!(rig.lock.active_transport(), Transport::WebSocket);
    assert_eq!(service.session().unwrap().owner(), WS);
}

#[test]
fn externally_held_lock_is_busy() {
    let rig = Rig::new();
    let mut service = rig.service();
    assert!(rig.lock.try_acquire(Transport::WebSocket));

    assert_eq!(
        service.begin(REST, &begin_request(100)).unwrap_err(),
        OtaError::Busy
    );
}

#[test]
fn refused_begins_keep_running_upload() {
    let rig = Rig::new();
    let mut service = rig.service();
    let data = image(300);

    service.begin(WS, &begin_request(300)).unwrap();
    service.write_chunk(WS, 0, &data[..100]).unwrap();

    for _ in 0..2 {
        assert_eq!(
            service.begin(REST, &begin_request(300)).unwrap_err(),
            OtaError::Busy
        );
        assert_eq!(rig.lock.active_transport(), Transport::WebSocket);
    }

    assert_eq!(service.session().unwrap().owner(), WS);
    service.write_chunk(WS, 100, &data[100..]).unwrap();
    let checksum = Checksum::new(md5_bytes(&data));
    service.verify(WS, Some(&checksum)).unwrap();
    assert_eq!(rig.flash.activated(), Some(data));
    assert_eq!(rig.flash.discarded(), 0);
    assert!(!rig.lock.is_active());
}

#[test]
fn begin_never_replaces_live_session() {
    let rig = Rig::new();
    let mut service = rig.service();

    service.begin(WS, &begin_request(100)).unwrap();
    // Gate freed behind the service's back.
    rig.lock.release();

    assert_eq!(
        service.begin(REST, &begin_request(100)).unwrap_err(),
        OtaError::Busy
    );
    assert!(!rig.lock.is_active());
    assert_eq!(service.session().unwrap().owner(), WS);
    assert_eq!(rig.flash.discarded(), 0);
}

#[test]
fn other_connection_cannot_drive_session() {
    let rig = Rig::new();
    let mut service = rig.service();
    let intruder = Owner::websocket(2);

    service.begin(WS, &begin_request(100)).unwrap();

    assert_eq!(
        service.write_chunk(intruder, 0, &[0; 10]).unwrap_err(),
        OtaError::NotOwner
    );
    assert_eq!(service.abort(intruder).unwrap_err(), OtaError::NotOwner);
    assert!(!service.disconnect(intruder));
    assert!(rig.lock.is_active());
    assert_eq!(service.session().unwrap().received(), 0);
}

#[test]
fn disconnect_frees_lock() {
    let rig = Rig::new();
    let mut service = rig.service();

    service.begin(WS, &begin_request(100)).unwrap();
    service.write_chunk(WS, 0, &[0; 40]).unwrap();

    assert!(service.disconnect(WS));
    assert!(!rig.lock.is_active());
    assert_eq!(service.phase(), Phase::Aborted);
    assert_eq!(rig.flash.discarded(), 1);

    assert!(service.begin(REST, &begin_request(100)).is_ok());
}

#[test]
fn abort_frees_lock() {
    let rig = Rig::new();
    let mut service = rig.service();

    service.begin(REST, &begin_request(100)).unwrap();
    service.abort(REST).unwrap();

    assert!(!rig.lock.is_active());
    assert_eq!(service.phase(), Phase::Aborted);
    assert_eq!(service.abort(REST).unwrap_err(), OtaError::NoSession);
}

#[test]
fn begin_after_completion_waits_for_restart() {
    let rig = Rig::new();
    let mut service = rig.service();

    service.begin(WS, &begin_request(4)).unwrap();
    service.write_chunk(WS, 0, &[9; 4]).unwrap();
    service.verify(WS, None).unwrap();

    assert_eq!(
        service.begin(WS, &begin_request(4)).unwrap_err(),
        OtaError::RestartPending
    );
}

// -----------------------------------------------------------------------------
// Test 4: Begin validation
// -----------------------------------------------------------------------------

#[test]
fn wrong_token_is_unauthorized() {
    let rig = Rig::new();
    let mut service = rig.service();
    let mut request = BeginRequest::new(100);
    let mut token = TokenValue::new();
    token.push_str("guess").unwrap();
    request.token = Some(token);

    let err = service.begin(WS, &request).unwrap_err();

    assert_eq!(err, OtaError::Unauthorized);
    assert_eq!(err.code(), "UNAUTHORIZED");
    assert!(!rig.lock.is_active());
    assert_eq!(service.phase(), Phase::Idle);
}

#[test]
fn missing_token_is_unauthorized() {
    let rig = Rig::new();
    let mut service = rig.service();

    assert_eq!(
        service.begin(WS, &BeginRequest::new(100)).unwrap_err(),
        OtaError::Unauthorized
    );
}

#[test]
fn zero_size_is_rejected() {
    let rig = Rig::new();
    let mut service = rig.service();

    assert_eq!(
        service.begin(WS, &begin_request(0)).unwrap_err(),
        OtaError::InvalidSize
    );
    assert!(!rig.lock.is_active());
}

#[test]
fn oversized_image_is_rejected() {
    let rig = Rig::new();
    let mut service = rig.service();
    let size = common::FREE_SPACE + 1;

    let err = service.begin(WS, &begin_request(size)).unwrap_err();

    assert_eq!(
        err,
        OtaError::TooLarge {
            size,
            available: common::FREE_SPACE
        }
    );
    assert_eq!(err.code(), "INSUFFICIENT_SPACE");
    assert_eq!(err.kind().http_status(), 413);
    assert!(!rig.lock.is_active());
}

#[test]
fn allocation_failure_frees_lock() {
    let rig = Rig::new();
    let mut service = rig.service();
    rig.flash.state.borrow_mut().fail_begin = Some(FlashError::Erase);

    let err = service.begin(WS, &begin_request(100)).unwrap_err();

    assert_eq!(err, OtaError::Allocation(FlashError::Erase));
    assert!(!rig.lock.is_active());
}

#[test]
fn downgrade_needs_force() {
    let rig = Rig::new();
    let mut service = rig.service();

    let err = service
        .begin(WS, &with_version(begin_request(10), "1.1.9", false))
        .unwrap_err();
    assert_eq!(
        err,
        OtaError::VersionRejected {
            current: 10200,
            incoming: 10109
        }
    );
    assert!(!rig.lock.is_active());

    assert!(
        service
            .begin(WS, &with_version(begin_request(10), "1.1.9", true))
            .is_ok()
    );
}

#[test]
fn newer_or_unknown_version_passes() {
    let rig = Rig::new();
    let mut service = rig.service();

    service
        .begin(WS, &with_version(begin_request(10), "v1.3.0", false))
        .unwrap();
    service.abort(WS).unwrap();

    service
        .begin(WS, &with_version(begin_request(10), "nightly", false))
        .unwrap();
}

#[test]
fn filesystem_skips_version_guard() {
    let rig = Rig::new();
    let mut service = rig.service();
    let mut request = with_version(begin_request(10), "0.0.1", false);
    request.target = Partition::Filesystem;

    assert!(service.begin(WS, &request).is_ok());
}

// -----------------------------------------------------------------------------
// Test 5: Chunk and verify preconditions
// -----------------------------------------------------------------------------

#[test]
fn chunk_without_session() {
    let rig = Rig::new();
    let mut service = rig.service();

    assert_eq!(
        service.write_chunk(WS, 0, &[1]).unwrap_err(),
        OtaError::NoSession
    );
}

#[test]
fn empty_chunk_is_rejected() {
    let rig = Rig::new();
    let mut service = rig.service();
    service.begin(WS, &begin_request(10)).unwrap();

    assert_eq!(
        service.write_chunk(WS, 0, &[]).unwrap_err(),
        OtaError::EmptyChunk
    );
    assert!(rig.lock.is_active());
}

#[test]
fn early_verify_keeps_session() {
    let rig = Rig::new();
    let mut service = rig.service();
    service.begin(WS, &begin_request(10)).unwrap();
    service.write_chunk(WS, 0, &[1; 5]).unwrap();

    assert_eq!(
        service.verify(WS, None).unwrap_err(),
        OtaError::Incomplete {
            received: 5,
            total: 10
        }
    );
    assert!(rig.lock.is_active());
    service.write_chunk(WS, 5, &[1; 5]).unwrap();
    assert!(service.verify(WS, None).is_ok());
}

#[test]
fn required_checksum_is_enforced() {
    let rig = Rig::new();
    let mut service = rig.service_with(OtaConfig::DEFAULT.with_require_checksum(true));
    let data = image(20);
    service.begin(WS, &begin_request(20)).unwrap();
    service.write_chunk(WS, 0, &data).unwrap();

    assert_eq!(
        service.verify(WS, None).unwrap_err(),
        OtaError::ChecksumRequired
    );
    assert!(rig.lock.is_active());

    let checksum = Checksum::new(md5_bytes(&data));
    assert!(service.verify(WS, Some(&checksum)).is_ok());
}

// -----------------------------------------------------------------------------
// Test 6: Status
// -----------------------------------------------------------------------------

#[test]
fn status_reports_capacity() {
    let rig = Rig::new();
    let mut service = rig.service();

    let status = service.status();

    assert_eq!(status.version, "1.2.0");
    assert_eq!(status.version_number, 10200);
    assert_eq!(status.sketch_size, 1_200_000);
    assert_eq!(status.free_space, common::FREE_SPACE);
    assert_eq!(status.max_ota_size, common::FREE_SPACE);
    assert!(status.ota_available);
    assert_eq!(service.phase(), Phase::Checking);
}

#[test]
fn status_without_space_is_unavailable() {
    let rig = Rig::new();
    rig.flash.state.borrow_mut().free_space = 0;
    let mut service = rig.service();

    assert!(!service.status().ota_available);
}
