//! The external systems that actually run builds and jobs.

use std::future::Future;

use thiserror::Error;

use crate::dispatch::TaskSignature;
use crate::retry::FailureClass;
use crate::types::BuildId;

/// A failure reported by an external build/test/sync service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The service itself is down or misbehaving.
    #[error("{service} is unavailable: {message}")]
    Outage { service: String, message: String },

    /// Our request failed in a way a later attempt may not repeat.
    #[error("internal error: {0}")]
    Internal(String),

    /// The service refused the request; retrying cannot help.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ExecutorError {
    pub fn outage(service: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutorError::Outage {
            service: service.into(),
            message: message.into(),
        }
    }

    /// The retry class of the failure, `None` when retrying is pointless.
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            ExecutorError::Outage { .. } => Some(FailureClass::Outage),
            ExecutorError::Internal(_) => Some(FailureClass::Internal),
            ExecutorError::Rejected(_) => None,
        }
    }
}

/// Build services and job runners.
pub trait BuildExecutor: Send + Sync {
    /// Starts the build(s) a build task asks for; one id per started build,
    /// paired with its target when known.
    fn submit_build(
        &self,
        task: &TaskSignature,
    ) -> impl Future<Output = Result<Vec<(BuildId, Option<String>)>, ExecutorError>> + Send;

    fn cancel_build(&self, id: BuildId) -> impl Future<Output = Result<(), ExecutorError>> + Send;

    /// Submits the test run of a tests job and returns its id.
    fn start_test_run(&self, task: &TaskSignature) -> impl Future<Output = Result<BuildId, ExecutorError>> + Send;

    /// Hands a non-build job (tests, downstream sync, update, ...) to its
    /// runner. Returns a short description of what was started.
    fn run_job(&self, task: &TaskSignature) -> impl Future<Output = Result<String, ExecutorError>> + Send;
}
