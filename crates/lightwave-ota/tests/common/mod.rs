//! In-memory doubles for the hardware ports.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use md5::{Digest, Md5};
use smart_leds::RGB8;

use lightwave_ota::ports::{
    EntropySource, FirmwareFlasher, FlashError, FlashTarget, KeyValueStore, LedOutput, Partition,
    RestartScheduler, StoreError, UpdateFeedback,
};
use lightwave_ota::token::constant_time_eq;
use lightwave_ota::{OtaConfig, OtaService, SessionLock, TokenProvider};

pub const TOKEN: &str = "0123456789abcdef0123456789abcdef";
pub const FREE_SPACE: u32 = 64 * 1024;

// -----------------------------------------------------------------------------
// Key-value store
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct StoreState {
    pub values: BTreeMap<(String, String), Vec<u8>>,
    pub unavailable: bool,
    pub fail_writes: bool,
    pub writes: usize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    pub state: Rc<RefCell<StoreState>>,
}

impl MemoryStore {
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.state.borrow_mut().unavailable = true;
        store
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<String> {
        self.state
            .borrow()
            .values
            .get(&(namespace.into(), key.into()))
            .map(|value| String::from_utf8(value.clone()).unwrap())
    }

    pub fn put(&self, namespace: &str, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .values
            .insert((namespace.into(), key.into()), value.as_bytes().to_vec());
    }
}

impl KeyValueStore for MemoryStore {
    fn read(
        &mut self,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<Option<usize>, StoreError> {
        let state = self.state.borrow();
        if state.unavailable {
            return Err(StoreError::Unavailable);
        }
        let Some(value) = state.values.get(&(namespace.into(), key.into())) else {
            return Ok(None);
        };
        if value.len() > buf.len() {
            return Err(StoreError::Capacity);
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(Some(value.len()))
    }

    fn write(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.unavailable {
            return Err(StoreError::Unavailable);
        }
        if state.fail_writes {
            return Err(StoreError::Driver);
        }
        state.writes += 1;
        state
            .values
            .insert((namespace.into(), key.into()), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.unavailable {
            return Err(StoreError::Unavailable);
        }
        state.values.remove(&(namespace.into(), key.into()));
        Ok(())
    }
}

/// Deterministic entropy: an incrementing byte counter.
#[derive(Default)]
pub struct CounterEntropy {
    next: u8,
}

impl EntropySource for CounterEntropy {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        for byte in buf {
            *byte = self.next;
            self.next = self.next.wrapping_add(1);
        }
    }
}

// -----------------------------------------------------------------------------
// Flash
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct FlashState {
    pub free_space: u32,
    pub running_size: u32,
    pub fail_begin: Option<FlashError>,
    pub fail_write_at: Option<u32>,
    pub fail_finalize: bool,
    pub opened: Option<(Partition, u32)>,
    pub written: Vec<u8>,
    pub activated: Option<Vec<u8>>,
    pub discarded: usize,
}

#[derive(Clone)]
pub struct MemoryFlasher {
    pub state: Rc<RefCell<FlashState>>,
}

impl Default for MemoryFlasher {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(FlashState {
                free_space: FREE_SPACE,
                running_size: 1_200_000,
                ..FlashState::default()
            })),
        }
    }
}

impl MemoryFlasher {
    pub fn activated(&self) -> Option<Vec<u8>> {
        self.state.borrow().activated.clone()
    }

    pub fn discarded(&self) -> usize {
        self.state.borrow().discarded
    }
}

pub struct MemoryTarget {
    state: Rc<RefCell<FlashState>>,
}

impl FirmwareFlasher for MemoryFlasher {
    type Target = MemoryTarget;

    fn running_image_size(&mut self) -> u32 {
        self.state.borrow().running_size
    }

    fn free_space(&mut self, _partition: Partition) -> u32 {
        self.state.borrow().free_space
    }

    fn begin(&mut self, partition: Partition, size: u32) -> Result<MemoryTarget, FlashError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.fail_begin {
            return Err(err);
        }
        state.opened = Some((partition, size));
        state.written.clear();
        Ok(MemoryTarget {
            state: Rc::clone(&self.state),
        })
    }
}

impl FlashTarget for MemoryTarget {
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        let mut state = self.state.borrow_mut();
        if state.fail_write_at == Some(offset) {
            return Err(FlashError::Write);
        }
        assert_eq!(offset as usize, state.written.len(), "writes must be sequential");
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn finalize(self) -> Result<(), FlashError> {
        let mut state = self.state.borrow_mut();
        if state.fail_finalize {
            return Err(FlashError::Activate);
        }
        state.activated = Some(state.written.clone());
        Ok(())
    }

    fn discard(self) {
        self.state.borrow_mut().discarded += 1;
    }
}

// -----------------------------------------------------------------------------
// Feedback, restart, token
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shown {
    Progress(u8),
    Success,
    Failure,
}

#[derive(Clone, Default)]
pub struct RecordingFeedback {
    pub shown: Rc<RefCell<Vec<Shown>>>,
}

impl RecordingFeedback {
    pub fn events(&self) -> Vec<Shown> {
        self.shown.borrow().clone()
    }

    pub fn last(&self) -> Option<Shown> {
        self.shown.borrow().last().copied()
    }
}

impl UpdateFeedback for RecordingFeedback {
    fn on_progress(&mut self, percent: u8) {
        self.shown.borrow_mut().push(Shown::Progress(percent));
    }

    fn on_success(&mut self) {
        self.shown.borrow_mut().push(Shown::Success);
    }

    fn on_failure(&mut self) {
        self.shown.borrow_mut().push(Shown::Failure);
    }
}

#[derive(Clone, Default)]
pub struct RecordingRestart {
    pub scheduled: Rc<Cell<Option<Duration>>>,
}

impl RestartScheduler for RecordingRestart {
    fn schedule_restart(&mut self, after: Duration) {
        self.scheduled.set(Some(after));
    }
}

pub struct FixedToken(pub &'static str);

impl TokenProvider for FixedToken {
    fn verify(&self, presented: &str) -> bool {
        constant_time_eq(self.0, presented)
    }
}

// -----------------------------------------------------------------------------
// LEDs
// -----------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingLeds {
    pub frames: Rc<RefCell<Vec<Vec<RGB8>>>>,
}

impl RecordingLeds {
    pub fn last_frame(&self) -> Vec<RGB8> {
        self.frames.borrow().last().cloned().unwrap_or_default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.borrow().len()
    }
}

impl LedOutput for RecordingLeds {
    fn write(&mut self, colors: &[RGB8]) {
        self.frames.borrow_mut().push(colors.to_vec());
    }
}

/// Delay that returns at once and sums the requested time.
#[derive(Clone, Default)]
pub struct NoDelay {
    pub total_ns: Rc<Cell<u64>>,
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.set(self.total_ns.get() + u64::from(ns));
    }
}

// -----------------------------------------------------------------------------
// Service rig
// -----------------------------------------------------------------------------

pub type TestService<'a> =
    OtaService<'a, MemoryFlasher, FixedToken, RecordingFeedback, RecordingRestart>;

pub struct Rig {
    pub lock: SessionLock,
    pub tokens: FixedToken,
    pub flash: MemoryFlasher,
    pub feedback: RecordingFeedback,
    pub restart: RecordingRestart,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            lock: SessionLock::new(),
            tokens: FixedToken(TOKEN),
            flash: MemoryFlasher::default(),
            feedback: RecordingFeedback::default(),
            restart: RecordingRestart::default(),
        }
    }

    pub fn service(&self) -> TestService<'_> {
        self.service_with(OtaConfig::DEFAULT.with_firmware_version("1.2.0"))
    }

    pub fn service_with(&self, config: OtaConfig) -> TestService<'_> {
        OtaService::new(
            config,
            &self.lock,
            &self.tokens,
            self.flash.clone(),
            self.feedback.clone(),
            self.restart.clone(),
        )
    }
}

// -----------------------------------------------------------------------------
// Payload helpers
// -----------------------------------------------------------------------------

pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

pub fn md5_hex(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

pub fn md5_bytes(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

pub fn base64(data: &[u8]) -> String {
    let mut buf = vec![0u8; data.len().div_ceil(3) * 4];
    let len = STANDARD.encode_slice(data, &mut buf).unwrap();
    buf.truncate(len);
    String::from_utf8(buf).unwrap()
}
