//! Upload state machine shared by both transports.
//!
//! [`OtaService`] owns at most one [`UploadSession`]. A session holds the
//! [`SessionLease`] taken at `begin`, so every way a session ends (verify,
//! abort, disconnect, integrity or flash failure) goes through
//! one private exit routine and drops the lease there.

use embassy_time::Instant;
use md5::{Digest, Md5};

use crate::codec::{BeginRequest, Checksum, StatusInfo};
use crate::config::OtaConfig;
use crate::error::OtaError;
use crate::lock::{SessionLease, SessionLock, Transport};
use crate::ports::{FirmwareFlasher, FlashTarget, Partition, RestartScheduler, UpdateFeedback};
use crate::token::TokenProvider;
use crate::version::{is_upgrade_allowed, parse_version_number};

/// Transport connection driving a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub transport: Transport,
    /// Connection id, unique within the transport.
    pub connection: u32,
}

impl Owner {
    pub const fn rest(connection: u32) -> Self {
        Self {
            transport: Transport::Rest,
            connection,
        }
    }

    pub const fn websocket(connection: u32) -> Self {
        Self {
            transport: Transport::WebSocket,
            connection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Checking,
    Authorizing,
    Began,
    Transferring,
    Verifying,
    Completing,
    Aborted,
    Failed,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Checking => "checking",
            Phase::Authorizing => "authorizing",
            Phase::Began => "began",
            Phase::Transferring => "transferring",
            Phase::Verifying => "verifying",
            Phase::Completing => "completing",
            Phase::Aborted => "aborted",
            Phase::Failed => "failed",
        }
    }
}

/// Accepted `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub total_size: u32,
}

/// State after an accepted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Next expected offset, equal to the bytes received so far.
    pub offset: u32,
    pub total: u32,
    pub percent: u8,
}

/// Finalized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub bytes_written: u32,
    pub duration_ms: u64,
    pub rebooting: bool,
}

/// Operations the transport glue drives.
pub trait SessionControl {
    fn status(&mut self) -> StatusInfo<'static>;

    fn begin(&mut self, owner: Owner, request: &BeginRequest) -> Result<Ready, OtaError>;

    fn write_chunk(&mut self, owner: Owner, offset: u32, data: &[u8])
    -> Result<Progress, OtaError>;

    /// Check the received image and finalize it. `checksum` overrides the
    /// one given at `begin`.
    fn verify(&mut self, owner: Owner, checksum: Option<&Checksum>)
    -> Result<Completion, OtaError>;

    fn abort(&mut self, owner: Owner) -> Result<(), OtaError>;

    /// Tear down the session if `owner` holds it. Returns whether one was
    /// dropped.
    fn disconnect(&mut self, owner: Owner) -> bool;

    fn phase(&self) -> Phase;
}

/// One in-flight upload.
pub struct UploadSession<'a, W> {
    lease: SessionLease<'a>,
    owner: Owner,
    target: W,
    partition: Partition,
    total: u32,
    received: u32,
    expected: Option<Checksum>,
    digest: Md5,
    last_step: u8,
    started_at: Instant,
}

impl<W> UploadSession<'_, W> {
    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn transport(&self) -> Transport {
        self.lease.transport()
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    fn percent(&self) -> u8 {
        percent_of(self.received, self.total)
    }
}

enum Exit {
    Commit,
    Discard(Phase),
}

/// Session coordinator.
pub struct OtaService<'a, F: FirmwareFlasher, T, P, R> {
    config: OtaConfig,
    lock: &'a SessionLock,
    tokens: &'a T,
    flasher: F,
    feedback: P,
    restart: R,
    session: Option<UploadSession<'a, F::Target>>,
    phase: Phase,
    restart_pending: bool,
}

impl<'a, F, T, P, R> OtaService<'a, F, T, P, R>
where
    F: FirmwareFlasher,
    T: TokenProvider,
    P: UpdateFeedback,
    R: RestartScheduler,
{
    pub fn new(
        config: OtaConfig,
        lock: &'a SessionLock,
        tokens: &'a T,
        flasher: F,
        feedback: P,
        restart: R,
    ) -> Self {
        Self {
            config,
            lock,
            tokens,
            flasher,
            feedback,
            restart,
            session: None,
            phase: Phase::Idle,
            restart_pending: false,
        }
    }

    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&UploadSession<'a, F::Target>> {
        self.session.as_ref()
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_pending
    }

    pub fn flasher(&mut self) -> &mut F {
        &mut self.flasher
    }

    pub fn feedback(&mut self) -> &mut P {
        &mut self.feedback
    }

    fn owned_session(&mut self, owner: Owner) -> Result<&mut UploadSession<'a, F::Target>, OtaError> {
        match self.session.as_mut() {
            None => Err(OtaError::NoSession),
            Some(session) if session.owner != owner => Err(OtaError::NotOwner),
            Some(session) => Ok(session),
        }
    }

    fn authorize(&mut self, request: &BeginRequest) -> Result<(), OtaError> {
        let presented = request.token.as_ref().map_or("", |token| token.as_str());
        if !self.tokens.verify(presented) {
            return Err(OtaError::Unauthorized);
        }

        if request.target == Partition::Firmware
            && let Some(version) = request.version.as_ref()
        {
            let current = parse_version_number(self.config.firmware_version);
            let incoming = parse_version_number(version);
            if !is_upgrade_allowed(current, incoming, request.force) {
                return Err(OtaError::VersionRejected { current, incoming });
            }
        }

        let available = self.flasher.free_space(request.target);
        if request.size > available {
            return Err(OtaError::TooLarge {
                size: request.size,
                available,
            });
        }
        Ok(())
    }

    /// The single exit of every session.
    fn close(&mut self, exit: Exit) -> Result<Completion, OtaError> {
        let Some(session) = self.session.take() else {
            return Err(OtaError::NoSession);
        };
        let UploadSession {
            lease,
            target,
            total,
            started_at,
            ..
        } = session;

        let result = match exit {
            Exit::Commit => match target.finalize() {
                Ok(()) => {
                    self.phase = Phase::Completing;
                    self.restart_pending = true;
                    self.feedback.on_success();
                    self.restart.schedule_restart(self.config.restart_delay);
                    #[cfg(feature = "log")]
                    log::info!("ota: update complete ({} bytes), restart scheduled", total);
                    Ok(Completion {
                        bytes_written: total,
                        duration_ms: started_at.elapsed().as_millis(),
                        rebooting: true,
                    })
                }
                Err(err) => {
                    self.phase = Phase::Failed;
                    self.feedback.on_failure();
                    #[cfg(feature = "log")]
                    log::error!("ota: finalize failed: {}", err.as_str());
                    Err(OtaError::Flash(err))
                }
            },
            Exit::Discard(phase) => {
                target.discard();
                self.phase = phase;
                self.feedback.on_failure();
                #[cfg(feature = "log")]
                log::warn!("ota: session {} ({} bytes declared)", phase.as_str(), total);
                Err(OtaError::Aborted)
            }
        };

        drop(lease);
        result
    }
}

impl<'a, F, T, P, R> SessionControl for OtaService<'a, F, T, P, R>
where
    F: FirmwareFlasher,
    T: TokenProvider,
    P: UpdateFeedback,
    R: RestartScheduler,
{
    fn status(&mut self) -> StatusInfo<'static> {
        if self.session.is_none() && !self.restart_pending {
            self.phase = Phase::Checking;
        }
        let free_space = self.flasher.free_space(Partition::Firmware);
        StatusInfo {
            version: self.config.firmware_version,
            version_number: parse_version_number(self.config.firmware_version),
            sketch_size: self.flasher.running_image_size(),
            free_space,
            ota_available: free_space > 0,
            max_ota_size: free_space,
        }
    }

    fn begin(&mut self, owner: Owner, request: &BeginRequest) -> Result<Ready, OtaError> {
        if self.restart_pending {
            return Err(OtaError::RestartPending);
        }
        if request.size == 0 {
            return Err(OtaError::InvalidSize);
        }
        // A live session is only ever replaced through its own exit.
        if self.session.is_some() {
            return Err(OtaError::Busy);
        }
        let Some(lease) = self.lock.lease(owner.transport) else {
            #[cfg(feature = "log")]
            log::warn!(
                "ota: begin over {} refused, {} owns the session",
                owner.transport.as_str(),
                self.lock.active_transport().as_str()
            );
            return Err(OtaError::Busy);
        };
        self.phase = Phase::Authorizing;

        if let Err(err) = self.authorize(request) {
            self.phase = Phase::Idle;
            #[cfg(feature = "log")]
            log::warn!("ota: begin rejected: {}", err);
            return Err(err);
        }

        let target = match self.flasher.begin(request.target, request.size) {
            Ok(target) => target,
            Err(err) => {
                self.phase = Phase::Idle;
                #[cfg(feature = "log")]
                log::error!("ota: cannot open {} target: {}", request.target.as_str(), err.as_str());
                return Err(OtaError::Allocation(err));
            }
        };

        self.session = Some(UploadSession {
            lease,
            owner,
            target,
            partition: request.target,
            total: request.size,
            received: 0,
            expected: request.md5,
            digest: Md5::new(),
            last_step: 0,
            started_at: Instant::now(),
        });
        self.phase = Phase::Began;
        self.feedback.on_progress(0);

        #[cfg(feature = "log")]
        log::info!(
            "ota: {} session started over {}, {} bytes",
            request.target.as_str(),
            owner.transport.as_str(),
            request.size
        );
        Ok(Ready {
            total_size: request.size,
        })
    }

    fn write_chunk(&mut self, owner: Owner, offset: u32, data: &[u8]) -> Result<Progress, OtaError> {
        let step = self.config.progress_step.max(1);
        let session = self.owned_session(owner)?;
        if data.is_empty() {
            return Err(OtaError::EmptyChunk);
        }

        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let total = session.total;
        if u64::from(offset) + u64::from(len) > u64::from(total) {
            let _ = self.close(Exit::Discard(Phase::Aborted));
            return Err(OtaError::Overrun { offset, len, total });
        }
        if offset != session.received {
            return Err(OtaError::OffsetMismatch {
                expected: session.received,
                received: offset,
            });
        }

        if let Err(err) = session.target.write(offset, data) {
            let _ = self.close(Exit::Discard(Phase::Failed));
            return Err(OtaError::Flash(err));
        }
        session.digest.update(data);
        session.received += len;

        let percent = session.percent();
        let report = percent >= session.last_step.saturating_add(step);
        if report {
            session.last_step = percent;
        }
        let progress = Progress {
            offset: session.received,
            total,
            percent,
        };

        self.phase = Phase::Transferring;
        if report {
            self.feedback.on_progress(percent);
            #[cfg(feature = "log")]
            log::info!("ota: {}% ({}/{} bytes)", percent, progress.offset, total);
        }
        Ok(progress)
    }

    fn verify(&mut self, owner: Owner, checksum: Option<&Checksum>) -> Result<Completion, OtaError> {
        let require_checksum = self.config.require_checksum;
        let session = self.owned_session(owner)?;
        if session.received < session.total {
            return Err(OtaError::Incomplete {
                received: session.received,
                total: session.total,
            });
        }

        let Some(expected) = checksum.copied().or(session.expected) else {
            if require_checksum {
                return Err(OtaError::ChecksumRequired);
            }
            self.phase = Phase::Verifying;
            return self.close(Exit::Commit);
        };

        let actual: [u8; 16] = session.digest.clone().finalize().into();
        self.phase = Phase::Verifying;
        if actual != *expected.as_bytes() {
            let _ = self.close(Exit::Discard(Phase::Failed));
            return Err(OtaError::ChecksumMismatch);
        }
        self.close(Exit::Commit)
    }

    fn abort(&mut self, owner: Owner) -> Result<(), OtaError> {
        self.owned_session(owner)?;
        let _ = self.close(Exit::Discard(Phase::Aborted));
        Ok(())
    }

    fn disconnect(&mut self, owner: Owner) -> bool {
        if self.owned_session(owner).is_err() {
            return false;
        }
        let _ = self.close(Exit::Discard(Phase::Aborted));
        true
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

fn percent_of(received: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = u64::from(received) * 100 / u64::from(total);
    u8::try_from(percent.min(100)).unwrap_or(100)
}
