//! Process-wide counters and latency observations.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit the current values as a single
//! `tracing::info!` event, or [`Metrics::snapshot`] to read them all at once
//! (the HTTP `/metrics` endpoint serves the snapshot).
//!
//! The processor takes a `&'static Metrics`, so tests can hand it a leaked
//! private instance instead of the global [`METRICS`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// A fire-and-forget latency histogram reduced to count, sum and maximum.
pub struct Latency {
    count: AtomicU64,
    sum_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl Latency {
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
            max_ms: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum_ms: self.sum_ms.load(Ordering::Relaxed),
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.sum_ms.store(0, Ordering::Relaxed);
        self.max_ms.store(0, Ordering::Relaxed);
    }
}

impl Default for Latency {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub sum_ms: u64,
    pub max_ms: u64,
}

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub events_not_handled: u64,
    pub events_pre_check_failed: u64,
    pub builds_queued: u64,
    pub no_status_after_25s: u64,
    pub first_initial_status_time: LatencySnapshot,
    pub last_initial_status_time: LatencySnapshot,
}

/// Lightweight atomic counters.
pub struct Metrics {
    events_processed: AtomicU64,
    events_not_handled: AtomicU64,
    events_pre_check_failed: AtomicU64,
    builds_queued: AtomicU64,
    no_status_after_25s: AtomicU64,
    first_initial_status_time: Latency,
    last_initial_status_time: Latency,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_processed: AtomicU64::new(0),
            events_not_handled: AtomicU64::new(0),
            events_pre_check_failed: AtomicU64::new(0),
            builds_queued: AtomicU64::new(0),
            no_status_after_25s: AtomicU64::new(0),
            first_initial_status_time: Latency::new(),
            last_initial_status_time: Latency::new(),
        }
    }

    /// An inbound message was received, handled or not.
    pub fn inc_events_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_processed", "counter incremented");
    }

    /// An inbound message could not be turned into an event.
    pub fn inc_events_not_handled(&self) {
        self.events_not_handled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_not_handled", "counter incremented");
    }

    pub fn inc_events_pre_check_failed(&self) {
        self.events_pre_check_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_pre_check_failed", "counter incremented");
    }

    pub fn inc_builds_queued(&self) {
        self.builds_queued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_queued", "counter incremented");
    }

    pub fn inc_no_status_after_sla(&self) {
        self.no_status_after_25s.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "no_status_after_25s", "counter incremented");
    }

    /// Records how long the first and last "accepted" reports of one event
    /// took, measured from the event's creation.
    pub fn observe_status_feedback(&self, first: Duration, last: Duration) {
        self.first_initial_status_time.observe(first);
        self.last_initial_status_time.observe(last);
    }

    /// Emit all current values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            events_processed = s.events_processed,
            events_not_handled = s.events_not_handled,
            events_pre_check_failed = s.events_pre_check_failed,
            builds_queued = s.builds_queued,
            no_status_after_25s = s.no_status_after_25s,
            first_initial_status_count = s.first_initial_status_time.count,
            first_initial_status_max_ms = s.first_initial_status_time.max_ms,
            last_initial_status_count = s.last_initial_status_time.count,
            last_initial_status_max_ms = s.last_initial_status_time.max_ms,
        );
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn events_not_handled(&self) -> u64 {
        self.events_not_handled.load(Ordering::Relaxed)
    }

    pub fn events_pre_check_failed(&self) -> u64 {
        self.events_pre_check_failed.load(Ordering::Relaxed)
    }

    pub fn builds_queued(&self) -> u64 {
        self.builds_queued.load(Ordering::Relaxed)
    }

    pub fn no_status_after_sla(&self) -> u64 {
        self.no_status_after_25s.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_processed: self.events_processed(),
            events_not_handled: self.events_not_handled(),
            events_pre_check_failed: self.events_pre_check_failed(),
            builds_queued: self.builds_queued(),
            no_status_after_25s: self.no_status_after_sla(),
            first_initial_status_time: self.first_initial_status_time.snapshot(),
            last_initial_status_time: self.last_initial_status_time.snapshot(),
        }
    }

    /// Reset everything to zero (useful in tests).
    pub fn reset(&self) {
        self.events_processed.store(0, Ordering::Relaxed);
        self.events_not_handled.store(0, Ordering::Relaxed);
        self.events_pre_check_failed.store(0, Ordering::Relaxed);
        self.builds_queued.store(0, Ordering::Relaxed);
        self.no_status_after_25s.store(0, Ordering::Relaxed);
        self.first_initial_status_time.reset();
        self.last_initial_status_time.reset();
    }
}
