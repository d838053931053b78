use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::Duration;
use lightwave_ota::ports::RestartScheduler;

pub(crate) type RestartSignal = Signal<CriticalSectionRawMutex, Duration>;

pub(crate) static RESTART_SIGNAL: RestartSignal = Signal::new();

/// Hands restart requests to `restart_task`, which owns the reset.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DeferredRestart;

impl RestartScheduler for DeferredRestart {
    fn schedule_restart(&mut self, after: Duration) {
        RESTART_SIGNAL.signal(after);
    }
}
