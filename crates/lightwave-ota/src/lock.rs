//! Session gate shared by the REST and WebSocket transports.
//!
//! The gate is a single cell behind a critical section. Both transports and
//! the connectivity task read it, so every access is a short load or
//! compare-and-set with no waiting.

use core::cell::Cell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

/// Transport that owns the running update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    None,
    Rest,
    WebSocket,
}

impl Transport {
    pub const fn as_str(self) -> &'static str {
        match self {
            Transport::None => "none",
            Transport::Rest => "rest",
            Transport::WebSocket => "websocket",
        }
    }
}

/// At most one OTA session system-wide.
pub struct SessionLock {
    owner: Mutex<CriticalSectionRawMutex, Cell<Transport>>,
}

impl SessionLock {
    pub const fn new() -> Self {
        Self {
            owner: Mutex::new(Cell::new(Transport::None)),
        }
    }

    /// Claim the gate for `transport`.
    ///
    /// Succeeds only if nobody holds it. A failed claim changes nothing.
    pub fn try_acquire(&self, transport: Transport) -> bool {
        if transport == Transport::None {
            return false;
        }
        self.owner.lock(|owner| {
            if owner.get() == Transport::None {
                owner.set(transport);
                true
            } else {
                false
            }
        })
    }

    /// Free the gate. Safe to call any number of times.
    pub fn release(&self) {
        self.owner.lock(|owner| owner.set(Transport::None));
    }

    pub fn is_active(&self) -> bool {
        self.active_transport() != Transport::None
    }

    pub fn active_transport(&self) -> Transport {
        self.owner.lock(Cell::get)
    }

    /// Claim the gate and tie its release to the returned guard.
    pub fn lease(&self, transport: Transport) -> Option<SessionLease<'_>> {
        self.try_acquire(transport)
            .then(|| SessionLease { lock: self, transport })
    }
}

impl Default for SessionLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of the [`SessionLock`]; releases it when dropped.
#[derive(Debug)]
pub struct SessionLease<'a> {
    lock: &'a SessionLock,
    transport: Transport,
}

impl SessionLease<'_> {
    pub fn transport(&self) -> Transport {
        self.transport
    }
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl core::fmt::Debug for SessionLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionLock")
            .field("owner", &self.active_transport())
            .finish()
    }
}
