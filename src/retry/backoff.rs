//! In-place retry with exponential backoff for short external calls.
//!
//! Handler tasks are retried by re-enqueueing (see [`super::RetryPolicy::decide`]);
//! calls made while dispatching an event (forge lookups, status reports) are
//! retried in place by [`retry_with_backoff`], and only for errors that
//! classify themselves as transient.

use std::future::Future;

use super::policy::RetryPolicy;

/// Errors that know whether retrying can help.
pub trait Retriable {
    fn is_transient(&self) -> bool;
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),

    /// A transient error persisted through every retry.
    ExhaustedRetries {
        last_error: E,
        /// Attempts made, including the first one.
        attempts: u32,
    },

    /// A permanent error; not retried.
    PermanentError(E),
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::PermanentError(e) => Err(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Executes an async operation, retrying transient failures per `policy`.
///
/// The operation is called up to `policy.max_retries + 1` times. Delays
/// follow [`RetryPolicy::delay_for_attempt`]; jitter is not applied here.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> RetryResult<T, E>
where
    E: Retriable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_retries + 1;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if !e.is_transient() => return RetryResult::PermanentError(e),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return RetryResult::ExhaustedRetries {
                        last_error: e,
                        attempts: attempt,
                    };
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt - 1)).await;
            }
        }
    }
}
