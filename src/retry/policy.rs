//! Retry policies for handler tasks.
//!
//! A failed handler run is retried by enqueueing a brand-new task whose
//! signature carries `attempt + 1`. Nothing about the retry lives in shared
//! state, so the decision below is a pure function of the policy, the
//! attempt counter and a stable key used for jitter.
//!
//! # Failure classes
//!
//! | Class | Retries | Delays |
//! |-------|---------|--------|
//! | internal | 2 | 7s, 14s (jittered into the upper half) |
//! | outage | 5 | 1m, 2m, 4m, 8m, 16m |
//!
//! Which class a failure belongs to is declared by the handler when it
//! fails, never inferred from the error.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default retry limit for internal failures.
pub const DEFAULT_RETRY_LIMIT: u32 = 2;

/// Default base backoff for internal failures, in seconds.
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 7;

/// Default retry limit when a third-party service is down.
pub const DEFAULT_RETRY_LIMIT_OUTAGE: u32 = 5;

/// Default base interval for outage retries, in minutes.
pub const BASE_RETRY_INTERVAL_MINS_FOR_OUTAGES: u64 = 1;

/// How a handler classifies its own failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Something went wrong in our own logic or infrastructure.
    Internal,
    /// A third-party service (build system, test farm) is unavailable.
    Outage,
}

/// Exponential backoff with an attempt bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the first run).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    pub backoff_multiplier: f64,

    /// Spread delays over `[d/2, d]` to avoid retry storms.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Internal failures: 2 retries, 7s base, jittered.
    pub const INTERNAL: Self = Self {
        max_retries: DEFAULT_RETRY_LIMIT,
        initial_delay: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
        max_delay: Duration::from_secs(600),
        backoff_multiplier: 2.0,
        jitter: true,
    };

    /// Outages: 5 retries, 1 minute base.
    pub const OUTAGE: Self = Self {
        max_retries: DEFAULT_RETRY_LIMIT_OUTAGE,
        initial_delay: Duration::from_secs(BASE_RETRY_INTERVAL_MINS_FOR_OUTAGES * 60),
        max_delay: Duration::from_secs(3600),
        backoff_multiplier: 2.0,
        jitter: false,
    };

    /// Update creation races the tagging of the build it is created for, so
    /// it gets more attempts and predictable delays.
    pub const BODHI: Self = Self {
        max_retries: 5,
        jitter: false,
        ..Self::INTERNAL
    };

    /// Single attempt, no retries.
    pub const NEVER: Self = Self {
        max_retries: 0,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
        jitter: false,
    };

    /// Forge API calls made inline by the dispatcher: 3 quick retries.
    pub const FORGE: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
        jitter: false,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Internal-failure policy with a configured limit and base backoff.
    pub fn internal(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: backoff,
            ..Self::INTERNAL
        }
    }

    /// Outage policy with a configured limit and base interval.
    pub fn outage(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: interval,
            ..Self::OUTAGE
        }
    }

    /// Upper bound of the delay before retry number `attempt` (0-indexed):
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// The actual delay before retry `attempt` for the unit identified by `key`.
    ///
    /// With jitter enabled the delay is a deterministic point in
    /// `[bound/2, bound]` derived from the key and attempt, so the same task
    /// always waits the same amount of time.
    pub fn jittered_delay<K: Hash + ?Sized>(&self, attempt: u32, key: &K) -> Duration {
        let bound = self.delay_for_attempt(attempt);
        if !self.jitter || bound.is_zero() {
            return bound;
        }

        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        attempt.hash(&mut hasher);
        let fraction = (hasher.finish() % 1001) as f64 / 1000.0;
        Duration::from_secs_f64(bound.as_secs_f64() * (0.5 + fraction / 2.0))
    }

    /// Decides what happens after run number `attempt` (0 = first run) failed.
    pub fn decide<K: Hash + ?Sized>(&self, attempt: u32, key: &K) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::Exhausted {
                attempts: attempt.saturating_add(1),
            };
        }
        RetryDecision::Retry {
            delay: self.jittered_delay(attempt, key),
            next_attempt: attempt + 1,
        }
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::INTERNAL
    }
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Enqueue a new task with `next_attempt` after `delay`.
    Retry { delay: Duration, next_attempt: u32 },

    /// The bound is reached; the task ends with a failed result.
    Exhausted { attempts: u32 },
}

/// A handler's declared policy, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandlerRetryPolicy {
    pub internal: RetryPolicy,
    pub outage: RetryPolicy,
}

impl HandlerRetryPolicy {
    pub const STANDARD: Self = Self {
        internal: RetryPolicy::INTERNAL,
        outage: RetryPolicy::OUTAGE,
    };

    pub const BODHI: Self = Self {
        internal: RetryPolicy::BODHI,
        outage: RetryPolicy::OUTAGE,
    };

    /// Builds a policy from configured limits.
    pub fn configured(
        internal_limit: u32,
        internal_backoff: Duration,
        outage_limit: u32,
        outage_interval: Duration,
    ) -> Self {
        Self {
            internal: RetryPolicy::internal(internal_limit, internal_backoff),
            outage: RetryPolicy::outage(outage_limit, outage_interval),
        }
    }

    pub fn for_class(&self, class: FailureClass) -> &RetryPolicy {
        match class {
            FailureClass::Internal => &self.internal,
            FailureClass::Outage => &self.outage,
        }
    }
}

impl Default for HandlerRetryPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ─── Unit Tests ───────────────────────────────────────────────────────────

    #[test]
    fn internal_defaults() {
        let p = RetryPolicy::INTERNAL;
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.delay_for_attempt(0), Duration::from_secs(7));
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(14));
        assert!(p.jitter);
    }

    #[test]
    fn outage_delays_are_minutes() {
        let delays: Vec<_> = RetryPolicy::OUTAGE.delays().collect();
        let minutes: Vec<u64> = delays.iter().map(|d| d.as_secs() / 60).collect();
        assert_eq!(minutes, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn bodhi_policy_is_not_jittered() {
        let p = RetryPolicy::BODHI;
        assert_eq!(p.max_retries, 5);
        assert_eq!(p.jittered_delay(3, "update"), p.delay_for_attempt(3));
    }

    #[test]
    fn decide_retries_until_the_bound() {
        let p = RetryPolicy::OUTAGE;
        for attempt in 0..5 {
            match p.decide(attempt, "task") {
                RetryDecision::Retry {
                    next_attempt,
                    delay,
                } => {
                    assert_eq!(next_attempt, attempt + 1);
                    assert_eq!(delay, p.delay_for_attempt(attempt));
                }
                other => panic!("attempt {attempt}: expected retry, got {other:?}"),
            }
        }
        assert_eq!(
            p.decide(5, "task"),
            RetryDecision::Exhausted { attempts: 6 }
        );
    }

    #[test]
    fn never_policy_exhausts_immediately() {
        assert_eq!(
            RetryPolicy::NEVER.decide(0, "x"),
            RetryDecision::Exhausted { attempts: 1 }
        );
    }

    #[test]
    fn jitter_is_deterministic_per_key() {
        let p = RetryPolicy::INTERNAL;
        assert_eq!(p.jittered_delay(1, "a"), p.jittered_delay(1, "a"));
    }

    #[test]
    fn handler_policy_picks_by_class() {
        let policy = HandlerRetryPolicy::STANDARD;
        assert_eq!(policy.for_class(FailureClass::Internal).max_retries, 2);
        assert_eq!(policy.for_class(FailureClass::Outage).max_retries, 5);
    }

    // ─── Property Tests ───────────────────────────────────────────────────────

    proptest! {
        /// Outage retry N waits at most base * 2^N, and never retries past the bound.
        #[test]
        fn outage_retry_law(
            base_secs in 1u64..600,
            max_retries in 0u32..10,
            attempt in 0u32..20,
            key in "[a-z]{1,10}",
        ) {
            let policy = RetryPolicy::outage(max_retries, Duration::from_secs(base_secs));
            match policy.decide(attempt, key.as_str()) {
                RetryDecision::Retry { delay, next_attempt } => {
                    prop_assert!(attempt < max_retries);
                    prop_assert_eq!(next_attempt, attempt + 1);
                    let bound = base_secs as f64 * 2f64.powi(attempt as i32);
                    prop_assert!(delay.as_secs_f64() <= bound + 1e-6);
                }
                RetryDecision::Exhausted { .. } => prop_assert!(attempt >= max_retries),
            }
        }

        #[test]
        fn jittered_delay_stays_in_upper_half(
            attempt in 0u32..8,
            key in any::<u64>(),
        ) {
            let p = RetryPolicy::INTERNAL;
            let bound = p.delay_for_attempt(attempt).as_secs_f64();
            let delay = p.jittered_delay(attempt, &key).as_secs_f64();
            prop_assert!(delay <= bound + 1e-6);
            prop_assert!(delay >= bound / 2.0 - 1e-6);
        }

        #[test]
        fn delay_sequence_is_monotonic(
            initial_ms in 1u64..1000,
            max_ms in 1000u64..60000,
            multiplier in 1.5f64..3.0,
            max_retries in 1u32..15,
        ) {
            let policy = RetryPolicy::new(
                max_retries,
                Duration::from_millis(initial_ms),
                Duration::from_millis(max_ms),
                multiplier,
            );
            let delays: Vec<_> = policy.delays().collect();
            for window in delays.windows(2) {
                prop_assert!(window[1] >= window[0]);
            }
            prop_assert!(policy.total_max_wait() <= Duration::from_millis(max_ms * max_retries as u64));
        }
    }
}
