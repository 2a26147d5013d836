//! Acceptance-latency measurement.
//!
//! While dispatching one event, every "accepted" status report is
//! timestamped. Once the event is dispatched the first and last timestamps
//! are compared against the event's creation time at the origin.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::metrics::Metrics;

/// Thresholds for acceptance latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackThresholds {
    /// Above this the event is logged at error level.
    pub warn_after: Duration,

    /// Above this the `no_status_after_25s` counter is incremented.
    pub sla: Duration,
}

impl FeedbackThresholds {
    pub const DEFAULT: Self = Self {
        warn_after: Duration::from_secs(15),
        sla: Duration::from_secs(25),
    };
}

impl Default for FeedbackThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Timestamps of the "accepted" reports made for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackTimes {
    times: Vec<DateTime<Utc>>,
}

impl FeedbackTimes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one accepted report made at `at`.
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.times.push(at);
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn first(&self) -> Option<DateTime<Utc>> {
        self.times.first().copied()
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.times.last().copied()
    }

    /// Reports latency for an event created at `created_at`.
    ///
    /// Returns the time of the first accepted report, if any was made.
    /// Reports timestamped before the event (clock skew) count as zero.
    pub fn report(
        &self,
        created_at: DateTime<Utc>,
        event_type: &str,
        thresholds: FeedbackThresholds,
        metrics: &Metrics,
    ) -> Option<DateTime<Utc>> {
        let first = self.first()?;
        let last = self.last()?;

        let first_elapsed = elapsed(created_at, first);
        let last_elapsed = elapsed(created_at, last);
        debug!(
            first_ms = first_elapsed.as_millis() as u64,
            last_ms = last_elapsed.as_millis() as u64,
            "initial status feedback"
        );

        metrics.observe_status_feedback(first_elapsed, last_elapsed);
        if first_elapsed > thresholds.sla {
            metrics.inc_no_status_after_sla();
        }
        if first_elapsed > thresholds.warn_after {
            error!(
                event_type,
                elapsed_secs = first_elapsed.as_secs_f64(),
                "event took more than {}s to get an initial status",
                thresholds.warn_after.as_secs()
            );
        }

        Some(first)
    }
}

fn elapsed(begin: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - begin).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ts;

    #[test]
    fn no_reports_means_no_observation() {
        let metrics = Metrics::new();
        let times = FeedbackTimes::new();
        assert_eq!(
            times.report(ts(0), "push", FeedbackThresholds::DEFAULT, &metrics),
            None
        );
        assert_eq!(metrics.snapshot().first_initial_status_time.count, 0);
    }

    #[test]
    fn slow_feedback_is_counted_independently_of_outcome() {
        let metrics = Metrics::new();
        let mut times = FeedbackTimes::new();
        times.record(ts(30));
        times.record(ts(40));

        let accepted = times.report(ts(0), "push", FeedbackThresholds::DEFAULT, &metrics);
        assert_eq!(accepted, Some(ts(30)));

        let s = metrics.snapshot();
        assert_eq!(s.no_status_after_25s, 1);
        assert_eq!(s.first_initial_status_time.max_ms, 30_000);
        assert_eq!(s.last_initial_status_time.max_ms, 40_000);
    }

    #[test]
    fn fast_feedback_is_only_observed() {
        let metrics = Metrics::new();
        let mut times = FeedbackTimes::new();
        times.record(ts(2));

        times.report(ts(0), "push", FeedbackThresholds::DEFAULT, &metrics);
        let s = metrics.snapshot();
        assert_eq!(s.no_status_after_25s, 0);
        assert_eq!(s.first_initial_status_time.count, 1);
        assert_eq!(s.last_initial_status_time.sum_ms, 2_000);
    }

    #[test]
    fn clock_skew_counts_as_zero() {
        let metrics = Metrics::new();
        let mut times = FeedbackTimes::new();
        times.record(ts(5));
        times.report(ts(10), "push", FeedbackThresholds::DEFAULT, &metrics);
        assert_eq!(metrics.snapshot().first_initial_status_time.sum_ms, 0);
    }
}
