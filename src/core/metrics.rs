//! Lightweight broker metrics. No allocations, no locks, just atomics.

use core::sync::atomic::{AtomicU64, Ordering};

/// Publish-path counters. All monotonic.
#[derive(Debug)]
pub struct BrokerMetrics {
    pub publishes: AtomicU64,
    pub signals: AtomicU64,
    pub deliveries: AtomicU64,
    pub payload_rejects: AtomicU64,
    pub pool_exhausted_drops: AtomicU64,
    pub queue_full_drops: AtomicU64,
}

impl BrokerMetrics {
    pub const fn new() -> Self {
        Self {
            publishes: AtomicU64::new(0),
            signals: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            payload_rejects: AtomicU64::new(0),
            pool_exhausted_drops: AtomicU64::new(0),
            queue_full_drops: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_signal(&self) {
        self.signals.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_payload_reject(&self) {
        self.payload_rejects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_pool_exhausted(&self) {
        self.pool_exhausted_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_queue_full(&self) {
        self.queue_full_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BrokerMetricsSnapshot {
        BrokerMetricsSnapshot {
            publishes: self.publishes.load(Ordering::Relaxed),
            signals: self.signals.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            payload_rejects: self.payload_rejects.load(Ordering::Relaxed),
            pool_exhausted_drops: self.pool_exhausted_drops.load(Ordering::Relaxed),
            queue_full_drops: self.queue_full_drops.load(Ordering::Relaxed),
        }
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerMetricsSnapshot {
    pub publishes: u64,
    pub signals: u64,
    pub deliveries: u64,
    pub payload_rejects: u64,
    pub pool_exhausted_drops: u64,
    pub queue_full_drops: u64,
}

/// Timer-service counters.
#[derive(Debug)]
pub struct TimerMetrics {
    pub started: AtomicU64,
    pub cancelled: AtomicU64,
    pub fires: AtomicU64,
    pub stale_events: AtomicU64,
}

impl TimerMetrics {
    pub const fn new() -> Self {
        Self {
            started: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            fires: AtomicU64::new(0),
            stale_events: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_fire(&self) {
        self.fires.fetch_add(1, Ordering::Relaxed);
    }

    /// A kernel notification arrived for a record that was already gone
    /// (cancellation race); the event is dropped.
    #[inline(always)]
    pub fn record_stale_event(&self) {
        self.stale_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fires(&self) -> u64 {
        self.fires.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TimerMetricsSnapshot {
        TimerMetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            fires: self.fires.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for TimerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerMetricsSnapshot {
    pub started: u64,
    pub cancelled: u64,
    pub fires: u64,
    pub stale_events: u64,
}

/// Prometheus text exposition. Scrapes the atomics, spits text format;
/// how the text leaves the process is the embedder's business.
pub struct PrometheusExporter<'a> {
    broker: &'a BrokerMetrics,
    timer: Option<&'a TimerMetrics>,
    prefix: &'static str,
}

impl<'a> PrometheusExporter<'a> {
    pub fn new(broker: &'a BrokerMetrics, prefix: &'static str) -> Self {
        Self {
            broker,
            timer: None,
            prefix,
        }
    }

    /// Include timer counters in the exposition.
    pub fn with_timer(mut self, timer: &'a TimerMetrics) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Format all counters as Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);
        let snap = self.broker.snapshot();

        self.counter(&mut out, "publishes_total", "Typed publishes attempted", snap.publishes);
        self.counter(&mut out, "signals_total", "Signal publishes attempted", snap.signals);
        self.counter(&mut out, "deliveries_total", "Descriptors enqueued to inboxes", snap.deliveries);
        self.counter(
            &mut out,
            "payload_rejects_total",
            "Publishes rejected for exceeding the large block size",
            snap.payload_rejects,
        );
        self.counter(
            &mut out,
            "pool_exhausted_drops_total",
            "Deliveries dropped for lack of a free pool block",
            snap.pool_exhausted_drops,
        );
        self.counter(
            &mut out,
            "queue_full_drops_total",
            "Deliveries dropped on a full inbox",
            snap.queue_full_drops,
        );

        if let Some(timer) = self.timer {
            let snap = timer.snapshot();
            self.counter(&mut out, "timers_started_total", "Timers armed", snap.started);
            self.counter(&mut out, "timers_cancelled_total", "Timers cancelled", snap.cancelled);
            self.counter(&mut out, "timer_fires_total", "Timer expirations dispatched", snap.fires);
            self.counter(
                &mut out,
                "timer_stale_events_total",
                "Expirations dropped in the cancellation race",
                snap.stale_events,
            );
        }

        out
    }

    fn counter(&self, out: &mut String, name: &str, help: &str, value: u64) {
        out.push_str(&format!("# HELP {}_{} {}\n", self.prefix, name, help));
        out.push_str(&format!("# TYPE {}_{} counter\n", self.prefix, name));
        out.push_str(&format!("{}_{} {}\n", self.prefix, name, value));
    }
}
