//! Task dispatch.
//!
//! The [`Dispatcher`] turns admitted (handler, job) pairs of one event into
//! task signatures and hands them to the execution backend as one group:
//!
//! 1. For each admission, report "Task was accepted." to the event's origin
//!    (a pending commit status under the handler's context, or a comment when
//!    the event has no commit). Failures are logged and never stop dispatch.
//! 2. Build a [`TaskSignature`] per admission.
//! 3. Submit all signatures at once. The backend accepts the whole group or
//!    rejects it; a rejection turns every task of the group into a failed
//!    [`TaskResult`].
//!
//! Deduplication is the matcher's job; the dispatcher submits what it is given.

mod result;
mod signature;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::checker::Admission;
use crate::events::{Event, ProjectHandle};
use crate::forge::{CommentTarget, CommitState, CommitStatus, Forge, ForgeError};
use crate::metrics::Metrics;
use crate::registry::{HandlerKind, Registry};
use crate::retry::FeedbackTimes;

pub use result::{TaskDetails, TaskResult};
pub use signature::{Signature, SignatureError, TaskSignature};

/// Description of the initial status reported for accepted tasks.
pub const TASK_ACCEPTED: &str = "Task was accepted.";

/// Message of the result returned for every submitted task.
pub const JOB_CREATED: &str = "Job created.";

/// Why the execution backend refused a group of signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("execution backend is closed")]
    Closed,

    #[error("execution backend is full ({requested} tasks requested, {available} slots free)")]
    Full { requested: usize, available: usize },

    #[error("submission timed out after {0:?}")]
    Timeout(Duration),

    #[error("execution backend rejected the group: {0}")]
    Rejected(String),
}

/// Where task signatures go.
pub trait ExecutionBackend: Send + Sync {
    /// Submits a group of signatures. Either all of them are accepted or
    /// none is.
    fn submit(
        &self,
        group: Vec<Signature>,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl<B: ExecutionBackend> ExecutionBackend for Arc<B> {
    fn submit(
        &self,
        group: Vec<Signature>,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).submit(group)
    }
}

/// Default bound on a single backend submission.
const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates and submits the tasks of one event.
pub struct Dispatcher<F, B> {
    registry: Arc<Registry>,
    forge: Arc<F>,
    backend: B,
    submit_timeout: Duration,
    metrics: &'static Metrics,
}

impl<F: Forge, B: ExecutionBackend> Dispatcher<F, B> {
    pub fn new(registry: Arc<Registry>, forge: Arc<F>, backend: B, metrics: &'static Metrics) -> Self {
        Dispatcher {
            registry,
            forge,
            backend,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            metrics,
        }
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Reports, builds and submits one task per admission.
    ///
    /// Returns one result per admission: `"Job created."` when the group was
    /// accepted, a failure otherwise. Accepted-status reports are timestamped
    /// into `feedback`.
    #[instrument(skip_all, fields(event = %event, tasks = admissions.len()))]
    pub async fn create_tasks(
        &self,
        event: &Event,
        project: &ProjectHandle,
        admissions: Vec<Admission>,
        feedback: &mut FeedbackTimes,
    ) -> Vec<TaskResult> {
        if admissions.is_empty() {
            debug!("nothing to dispatch");
            return Vec::new();
        }

        let mut tasks = Vec::with_capacity(admissions.len());
        for admission in admissions {
            self.report_accepted(event, project, &admission, feedback).await;
            tasks.push(TaskSignature::new(admission, event));
        }

        let group: Vec<Signature> = tasks.iter().map(TaskSignature::to_signature).collect();
        let submitted = match tokio::time::timeout(self.submit_timeout, self.backend.submit(group)).await {
            Ok(submitted) => submitted,
            Err(_) => Err(BackendError::Timeout(self.submit_timeout)),
        };

        match submitted {
            Ok(()) => {
                info!(count = tasks.len(), "task group submitted");
                tasks
                    .iter()
                    .map(|task| {
                        if task.handler() == HandlerKind::CoprBuild {
                            self.metrics.inc_builds_queued();
                        }
                        TaskResult::create_from(true, JOB_CREATED, event, Some(task.job()))
                    })
                    .collect()
            }
            Err(e) => {
                error!(error = %e, count = tasks.len(), "failed to submit task group");
                tasks
                    .iter()
                    .map(|task| {
                        TaskResult::create_from(
                            false,
                            format!("Failed to submit task: {}", e),
                            event,
                            Some(task.job()),
                        )
                    })
                    .collect()
            }
        }
    }

    async fn report_accepted(
        &self,
        event: &Event,
        project: &ProjectHandle,
        admission: &Admission,
        feedback: &mut FeedbackTimes,
    ) {
        let context = self
            .registry
            .descriptor(admission.handler())
            .and_then(|d| d.status_context_for(admission.job().identifier.as_deref()));
        let Some(context) = context else {
            return;
        };

        let reported: Result<(), ForgeError> = match event.commit_sha() {
            Some(sha) => {
                let status = CommitStatus::new(CommitState::Pending, TASK_ACCEPTED, &context);
                self.forge.set_commit_status(project, sha, &status).await
            }
            None => match CommentTarget::for_event(event) {
                Some(target) => {
                    let body = format!("{}: {}", context, TASK_ACCEPTED);
                    self.forge.comment(project, &target, &body).await
                }
                None => return,
            },
        };

        match reported {
            Ok(()) => feedback.record(Utc::now()),
            Err(e) => warn!(%context, error = %e, "failed to report accepted status"),
        }
    }
}
