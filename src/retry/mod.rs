//! Retry and feedback control.
//!
//! - [`RetryPolicy`] / [`HandlerRetryPolicy`]: re-enqueue decisions for
//!   failed handler tasks, per [`FailureClass`]
//! - [`retry_with_backoff`]: in-place retry of transient external calls
//! - [`FeedbackTimes`]: acceptance-latency measurement

mod backoff;
mod feedback;
mod policy;

pub use backoff::{Retriable, RetryResult, retry_with_backoff};
pub use feedback::{FeedbackThresholds, FeedbackTimes};
pub use policy::{
    BASE_RETRY_INTERVAL_MINS_FOR_OUTAGES, DEFAULT_RETRY_BACKOFF_SECS, DEFAULT_RETRY_LIMIT,
    DEFAULT_RETRY_LIMIT_OUTAGE, FailureClass, HandlerRetryPolicy, RetryDecision, RetryPolicy,
};
