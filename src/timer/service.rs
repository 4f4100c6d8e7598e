//! Kernel-timer binding and the signal dispatch thread.
//!
//! Each armed label owns a POSIX `CLOCK_MONOTONIC` timer whose expiry
//! raises `SIGRTMIN` with the label carried in the signal value. Every
//! notification is targeted at the dispatch thread (`SIGEV_THREAD_ID`),
//! which drains it with `sigtimedwait` and republishes it as a broker
//! signal; the signal stays blocked everywhere so no thread ever takes
//! it asynchronously.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::core::broker::Broker;
use crate::core::message::{Label, LABEL_SPACE};
use crate::core::metrics::TimerMetrics;

/// How a timer behaves after firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TimerKind {
    /// Fire once, then the record is removed.
    #[default]
    OneShot = 0,
    /// Re-arm with the same interval after every firing.
    Periodic = 1,
}

/// Owned kernel timer handle.
struct KernelTimer(libc::timer_t);

// SAFETY: a timer_t is a kernel identifier; the record table hands it
// between the API threads and the dispatch thread under the table mutex.
unsafe impl Send for KernelTimer {}

/// One armed timer.
struct TimerRecord {
    kind: TimerKind,
    timer: KernelTimer,
}

type TimerTable = Box<[Option<TimerRecord>]>;

/// The timer service: the per-label record table plus the dispatch
/// thread. At most one instance should exist per process, since the
/// reserved real-time signal is a process-global resource.
pub struct TimerService {
    table: Arc<Mutex<TimerTable>>,
    metrics: Arc<TimerMetrics>,
    shutdown: Arc<AtomicBool>,
    dispatch_tid: libc::c_int,
    handle: Option<thread::JoinHandle<()>>,
}

impl TimerService {
    /// Mask the timer signal and start the dispatch thread. `None` when
    /// the signal mask cannot be installed or the thread cannot spawn.
    pub fn spawn(broker: &'static Broker) -> Option<Self> {
        if !block_timer_signal() {
            return None;
        }

        let table: Arc<Mutex<TimerTable>> = Arc::new(Mutex::new(
            (0..LABEL_SPACE).map(|_| None).collect::<Vec<_>>().into_boxed_slice(),
        ));
        let metrics = Arc::new(TimerMetrics::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let dispatch_table = table.clone();
        let dispatch_metrics = metrics.clone();
        let dispatch_shutdown = shutdown.clone();
        let (tid_tx, tid_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("timer-dispatch".into())
            .spawn(move || {
                let _ = tid_tx.send(current_tid());
                dispatch_loop(broker, dispatch_table, dispatch_metrics, dispatch_shutdown)
            })
            .ok()?;
        let dispatch_tid = tid_rx.recv().ok()?;

        Some(Self {
            table,
            metrics,
            shutdown,
            dispatch_tid,
            handle: Some(handle),
        })
    }

    /// Arm a timer for `label` firing after `interval`. False when a
    /// timer is already armed for the label or the kernel call fails.
    pub fn start(&self, label: Label, interval: Duration, kind: TimerKind) -> bool {
        self.start_timespec(label, duration_to_timespec(interval), kind)
    }

    /// [`start`](Self::start) with the interval as a POSIX timespec.
    pub fn start_timespec(&self, label: Label, time: libc::timespec, kind: TimerKind) -> bool {
        let mut table = self.lock();
        if table[label as usize].is_some() {
            return false;
        }

        let Some(timer) = create_kernel_timer(label, self.dispatch_tid) else {
            return false;
        };
        if !arm_kernel_timer(&timer, time, kind) {
            // SAFETY: just created above, never armed.
            unsafe { libc::timer_delete(timer.0) };
            return false;
        }

        table[label as usize] = Some(TimerRecord { kind, timer });
        self.metrics.record_started();
        true
    }

    /// Disarm and remove the timer for `label`. False when none is armed.
    ///
    /// A notification already in flight may still publish one final
    /// signal before the removal is observed by the dispatch thread.
    pub fn cancel(&self, label: Label) -> bool {
        let mut table = self.lock();
        match table[label as usize].take() {
            None => false,
            Some(record) => {
                // SAFETY: the record owned this kernel timer.
                unsafe { libc::timer_delete(record.timer.0) };
                self.metrics.record_cancelled();
                true
            }
        }
    }

    /// Whether a timer is currently armed for `label`.
    pub fn is_armed(&self, label: Label) -> bool {
        self.lock()[label as usize].is_some()
    }

    #[inline(always)]
    pub fn metrics(&self) -> &TimerMetrics {
        &self.metrics
    }

    fn lock(&self) -> MutexGuard<'_, TimerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        let mut table = self.lock();
        for slot in table.iter_mut() {
            if let Some(record) = slot.take() {
                // SAFETY: each record owns its kernel timer.
                unsafe { libc::timer_delete(record.timer.0) };
            }
        }
    }
}

/// Wait for timer notifications and republish them as broker signals.
///
/// The 500 ms `sigtimedwait` timeout bounds how long shutdown takes to be
/// observed. A notification whose record is gone is a cancellation race
/// and is dropped.
fn dispatch_loop(
    broker: &'static Broker,
    table: Arc<Mutex<TimerTable>>,
    metrics: Arc<TimerMetrics>,
    shutdown: Arc<AtomicBool>,
) {
    let set = match timer_signal_set() {
        Some(set) => set,
        None => return,
    };
    // The mask is inherited from the spawning thread; re-assert it so the
    // wait below is the only way this signal reaches us.
    // SAFETY: set is a valid initialized sigset.
    unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, core::ptr::null_mut()) };
    let poll = libc::timespec {
        tv_sec: 0,
        tv_nsec: 500_000_000,
    };

    while !shutdown.load(Ordering::Relaxed) {
        // SAFETY: set and info are valid for the duration of the call.
        let mut info: libc::siginfo_t = unsafe { core::mem::zeroed() };
        let signo = unsafe { libc::sigtimedwait(&set, &mut info, &poll) };
        if signo != libc::SIGRTMIN() {
            // Timeout or interruption; re-check shutdown and wait again.
            continue;
        }

        // SAFETY: the signal was queued by timer expiry with the label in
        // its value, as installed by create_kernel_timer.
        let label = unsafe { info.si_value().sival_ptr } as usize as Label;

        let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
        let kind = match table[label as usize].as_ref() {
            None => {
                metrics.record_stale_event();
                continue;
            }
            Some(record) => record.kind,
        };

        // A full subscriber queue means the event is dropped for that
        // subscriber; the service does not retry.
        let _ = broker.publish_signal(label);
        metrics.record_fire();

        if kind == TimerKind::OneShot {
            if let Some(record) = table[label as usize].take() {
                // SAFETY: the record owned this kernel timer.
                unsafe { libc::timer_delete(record.timer.0) };
            }
        }
    }
}

/// Create a disarmed kernel timer whose expiry signal carries `label`
/// and is delivered to the dispatch thread alone.
fn create_kernel_timer(label: Label, dispatch_tid: libc::c_int) -> Option<KernelTimer> {
    // SAFETY: sigevent is fully initialized before timer_create reads it.
    unsafe {
        let mut sev: libc::sigevent = core::mem::zeroed();
        // Thread-targeted delivery: a thread created before the signal
        // mask was installed can never be picked for the notification.
        sev.sigev_notify = libc::SIGEV_THREAD_ID;
        sev.sigev_notify_thread_id = dispatch_tid;
        sev.sigev_signo = libc::SIGRTMIN();
        sev.sigev_value = libc::sigval {
            sival_ptr: label as usize as *mut libc::c_void,
        };

        let mut timer: libc::timer_t = core::mem::zeroed();
        if libc::timer_create(libc::CLOCK_MONOTONIC, &mut sev, &mut timer) != 0 {
            return None;
        }
        Some(KernelTimer(timer))
    }
}

/// Kernel thread id of the calling thread.
fn current_tid() -> libc::c_int {
    // SAFETY: gettid has no preconditions and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as libc::c_int }
}

/// Arm a kernel timer. Periodic timers re-fire at the same interval.
fn arm_kernel_timer(timer: &KernelTimer, time: libc::timespec, kind: TimerKind) -> bool {
    let zero = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // A zero it_value would disarm the timer instead of firing it.
    let value = if time.tv_sec == 0 && time.tv_nsec == 0 {
        libc::timespec {
            tv_sec: 0,
            tv_nsec: 1,
        }
    } else {
        time
    };
    let setting = libc::itimerspec {
        it_interval: match kind {
            TimerKind::Periodic => value,
            TimerKind::OneShot => zero,
        },
        it_value: value,
    };

    // SAFETY: timer is a live kernel timer; setting outlives the call.
    unsafe { libc::timer_settime(timer.0, 0, &setting, core::ptr::null_mut()) == 0 }
}

/// The sigset holding just the reserved timer signal.
fn timer_signal_set() -> Option<libc::sigset_t> {
    // SAFETY: set is initialized by sigemptyset before use.
    unsafe {
        let mut set: libc::sigset_t = core::mem::zeroed();
        if libc::sigemptyset(&mut set) != 0 {
            return None;
        }
        if libc::sigaddset(&mut set, libc::SIGRTMIN()) != 0 {
            return None;
        }
        Some(set)
    }
}

/// Block the timer signal on the calling thread. Threads spawned
/// afterwards inherit the mask, which is what routes every notification
/// to the dispatch thread's `sigtimedwait`.
fn block_timer_signal() -> bool {
    let Some(set) = timer_signal_set() else {
        return false;
    };
    // SAFETY: set is a valid initialized sigset.
    unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, core::ptr::null_mut()) == 0 }
}

/// `Duration` to POSIX timespec.
pub(crate) fn duration_to_timespec(interval: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: interval.as_secs() as libc::time_t,
        tv_nsec: interval.subsec_nanos() as libc::c_long,
    }
}
