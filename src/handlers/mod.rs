//! Task execution.
//!
//! [`run_task`] runs one delivered [`TaskSignature`]. Builds and test runs
//! are submitted here and their lifecycle notifications are applied
//! idempotently against the [`BuildStore`]; every other job is handed to its
//! runner through the [`BuildExecutor`].
//!
//! A handler either produces a [`TaskResult`] (success or a failure that
//! retrying cannot fix) or a [`HandlerFailure`] classified for the retry
//! policy of the handler.

mod build;
mod executor;
mod local;
mod store;
mod testing;

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::dispatch::{TaskResult, TaskSignature};
use crate::forge::Forge;
use crate::registry::{HandlerKind, Registry};
use crate::retry::FailureClass;

pub use executor::{BuildExecutor, ExecutorError};
pub use local::{DryRunExecutor, InMemoryBuildStore};
pub use store::{BuildRecord, BuildState, BuildStore, RunKind, StoreError};

/// A recoverable handler failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerFailure {
    pub class: FailureClass,
    pub message: String,
}

impl HandlerFailure {
    pub fn internal(message: impl Into<String>) -> Self {
        HandlerFailure {
            class: FailureClass::Internal,
            message: message.into(),
        }
    }

    pub fn outage(message: impl Into<String>) -> Self {
        HandlerFailure {
            class: FailureClass::Outage,
            message: message.into(),
        }
    }
}

impl From<StoreError> for HandlerFailure {
    fn from(e: StoreError) -> Self {
        HandlerFailure::internal(e.to_string())
    }
}

/// What handlers run against.
pub struct HandlerContext<S, E, F> {
    pub store: Arc<S>,
    pub executor: Arc<E>,
    pub forge: Arc<F>,
    pub registry: Arc<Registry>,
    /// Cancel running builds of the same pull request and target before
    /// submitting new ones.
    pub cancel_running_builds: bool,
}

impl<S, E, F> HandlerContext<S, E, F> {
    pub fn new(store: Arc<S>, executor: Arc<E>, forge: Arc<F>, registry: Arc<Registry>) -> Self {
        HandlerContext {
            store,
            executor,
            forge,
            registry,
            cancel_running_builds: false,
        }
    }

    pub fn with_cancel_running_builds(mut self, enabled: bool) -> Self {
        self.cancel_running_builds = enabled;
        self
    }
}

impl<S, E, F> Clone for HandlerContext<S, E, F> {
    fn clone(&self) -> Self {
        HandlerContext {
            store: Arc::clone(&self.store),
            executor: Arc::clone(&self.executor),
            forge: Arc::clone(&self.forge),
            registry: Arc::clone(&self.registry),
            cancel_running_builds: self.cancel_running_builds,
        }
    }
}

/// Runs one task.
#[instrument(
    skip_all,
    fields(handler = %task.handler(), job = %task.job(), attempt = task.attempt())
)]
pub async fn run_task<S, E, F>(
    task: &TaskSignature,
    ctx: &HandlerContext<S, E, F>,
) -> Result<TaskResult, HandlerFailure>
where
    S: BuildStore,
    E: BuildExecutor,
    F: Forge,
{
    match task.handler() {
        HandlerKind::CoprBuild | HandlerKind::UpstreamKojiBuild | HandlerKind::VmImageBuild => {
            build::start_build(task, ctx).await
        }
        HandlerKind::CoprBuildStart => build::build_started(task, ctx).await,
        HandlerKind::CoprBuildEnd => build::build_finished(task, ctx).await,
        HandlerKind::TestingFarm => testing::start_tests(task, ctx).await,
        HandlerKind::TestingFarmResults => testing::tests_finished(task, ctx).await,
        HandlerKind::ProposeDownstream
        | HandlerKind::PullFromUpstream
        | HandlerKind::DownstreamKojiBuild
        | HandlerKind::RetriggerDownstreamKojiBuild
        | HandlerKind::BodhiUpdate
        | HandlerKind::RetriggerBodhiUpdate
        | HandlerKind::IssueCommentRetriggerBodhiUpdate
        | HandlerKind::KojiBuildTag => match ctx.executor.run_job(task).await {
            Ok(started) => Ok(TaskResult::for_task(true, started, task)),
            Err(e) => executor_failure(task, e),
        },
    }
}

/// Retriable executor failures become a [`HandlerFailure`]; the rest are a
/// final failed result.
fn executor_failure(task: &TaskSignature, error: ExecutorError) -> Result<TaskResult, HandlerFailure> {
    match error.class() {
        Some(class) => Err(HandlerFailure {
            class,
            message: error.to_string(),
        }),
        None => Ok(TaskResult::for_task(false, error.to_string(), task)),
    }
}
