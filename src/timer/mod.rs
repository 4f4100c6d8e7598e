//! One-shot and periodic timers delivered as broker signals.
//!
//! [`TimerManager`] is the process-wide face of the service: it reserves
//! `SIGRTMIN` for timer notifications and routes every expiry to the
//! single dispatch thread, which republishes it as a signal on the
//! timer's label. Applications that use `SIGRTMIN` for their own
//! purposes must not embed this library.

pub mod service;

pub use service::{TimerKind, TimerService};

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::core::broker::shared;
use crate::core::message::Label;
use crate::core::metrics::TimerMetricsSnapshot;

static SERVICE: Mutex<Option<TimerService>> = Mutex::new(None);

fn service() -> MutexGuard<'static, Option<TimerService>> {
    SERVICE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ensure the service exists, spawning it against the shared broker on
/// first use.
fn ensure(guard: &mut Option<TimerService>) -> bool {
    if guard.is_some() {
        return true;
    }
    match TimerService::spawn(shared()) {
        Some(started) => {
            *guard = Some(started);
            true
        }
        None => false,
    }
}

/// Process-wide timer facade over the single [`TimerService`].
pub struct TimerManager;

impl TimerManager {
    /// Reserve the timer signal and start the dispatch thread. Idempotent;
    /// false when the kernel setup fails.
    ///
    /// Call this before spawning application threads so they inherit the
    /// signal mask.
    pub fn init() -> bool {
        ensure(&mut service())
    }

    /// Arm a timer firing after `interval`, delivered as a signal on
    /// `label`. False when a timer is already armed for the label or the
    /// kernel rejects it.
    pub fn start(label: Label, interval: Duration, kind: TimerKind) -> bool {
        let mut guard = service();
        ensure(&mut guard) && guard.as_ref().is_some_and(|s| s.start(label, interval, kind))
    }

    /// [`start`](Self::start) with a POSIX timespec interval.
    pub fn start_timespec(label: Label, time: libc::timespec, kind: TimerKind) -> bool {
        let mut guard = service();
        ensure(&mut guard) && guard.as_ref().is_some_and(|s| s.start_timespec(label, time, kind))
    }

    /// Disarm and remove the timer for `label`. False when none is armed.
    pub fn cancel(label: Label) -> bool {
        service().as_ref().is_some_and(|s| s.cancel(label))
    }

    /// Whether a timer is currently armed for `label`.
    pub fn is_armed(label: Label) -> bool {
        service().as_ref().is_some_and(|s| s.is_armed(label))
    }

    /// Counter snapshot for the running service.
    pub fn metrics() -> Option<TimerMetricsSnapshot> {
        service().as_ref().map(|s| s.metrics().snapshot())
    }
}
