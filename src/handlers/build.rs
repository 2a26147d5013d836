//! Build submission and the idempotent build lifecycle.
//!
//! Start and end notifications may be redelivered, also concurrently. A
//! start reads the stored state first and turns "already there" into a
//! no-op success. An end finishes the run through the store's
//! compare-and-set, so only the winning delivery reports the final status,
//! and the tests that follow a successful build are started under a
//! follow-up claim at most once:
//!
//! | Notification | Stored state | Effect |
//! |---|---|---|
//! | start | start time recorded | none |
//! | start | terminal, no start time | start time only |
//! | start | pending | start time, `running`, status report |
//! | end | terminal | unclaimed follow-up only |
//! | end | otherwise | final state, status report, follow-up |

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::dispatch::{TaskResult, TaskSignature};
use crate::events::{Event, EventKind, ProjectHandle, ReportedStatus};
use crate::forge::{CommitState, CommitStatus, Forge};
use crate::jobs::{JobDefinition, JobType};
use crate::registry::{HandlerKind, Registry};
use crate::types::BuildId;

use super::testing::{HandOff, hand_off_after_build};
use super::{
    BuildExecutor, BuildRecord, BuildState, BuildStore, HandlerContext, HandlerFailure, RunKind,
    executor_failure,
};

/// Submits the build(s) of a build job, cancelling superseded ones first
/// when the deployment asks for it.
pub(super) async fn start_build<S, E, F>(
    task: &TaskSignature,
    ctx: &HandlerContext<S, E, F>,
) -> Result<TaskResult, HandlerFailure>
where
    S: BuildStore,
    E: BuildExecutor,
    F: Forge,
{
    let event = Event::from_record(task.event().clone());
    if ctx.cancel_running_builds {
        cancel_superseded(task, &event, ctx).await;
    }

    let started = match ctx.executor.submit_build(task).await {
        Ok(started) => started,
        Err(e) => return executor_failure(task, e),
    };

    for (id, target) in &started {
        let mut record = BuildRecord::pending(*id, event.project_url().clone());
        if let Some(pr) = event.pull_request() {
            record = record.with_pull_request(pr);
        }
        if let Some(sha) = event.commit_sha() {
            record = record.with_commit_sha(sha.clone());
        }
        if let Some(target) = target {
            record = record.with_target(target.clone());
        }
        ctx.store.insert(record).await?;
    }

    info!(count = started.len(), "builds submitted");
    Ok(TaskResult::for_task(
        true,
        format!("Submitted {} build(s).", started.len()),
        task,
    ))
}

/// Cancels still-running builds of the same pull request and target.
async fn cancel_superseded<S, E, F>(task: &TaskSignature, event: &Event, ctx: &HandlerContext<S, E, F>)
where
    S: BuildStore,
    E: BuildExecutor,
{
    let Some(pr) = event.pull_request() else {
        return;
    };
    let running = match ctx.store.running_builds(event.project_url(), Some(pr)).await {
        Ok(running) => running,
        Err(e) => {
            warn!(error = %e, "cannot list running builds, nothing cancelled");
            return;
        }
    };

    let targets = &task.job().targets;
    let superseded = running.into_iter().filter(|build| {
        targets.is_empty() || build.target.as_ref().is_some_and(|t| targets.contains(t))
    });
    for build in superseded {
        if let Err(e) = ctx.executor.cancel_build(build.id).await {
            warn!(build = %build.id, error = %e, "failed to cancel running build");
            continue;
        }
        match ctx.store.finish(build.id, BuildState::Cancelled, Utc::now()).await {
            Ok(true) => info!(build = %build.id, "cancelled superseded build"),
            Ok(false) => debug!(build = %build.id, "build finished before it was cancelled"),
            Err(e) => warn!(build = %build.id, error = %e, "cancelled build not recorded"),
        }
    }
}

/// Handles a "build started" notification.
pub(super) async fn build_started<S, E, F>(
    task: &TaskSignature,
    ctx: &HandlerContext<S, E, F>,
) -> Result<TaskResult, HandlerFailure>
where
    S: BuildStore,
    F: Forge,
{
    let (id, record) = match stored_build(task, ctx).await? {
        Ok(found) => found,
        Err(result) => return Ok(result),
    };

    if record.started_at.is_some() {
        debug!(build = %id, "start already recorded");
        return Ok(TaskResult::for_task(true, format!("Build {} already started.", id), task));
    }

    let at = task.event().created_at;
    if record.state.is_terminal() {
        ctx.store.record_start(id, at).await?;
        return Ok(TaskResult::for_task(
            true,
            format!("Recorded start of finished build {}.", id),
            task,
        ));
    }

    ctx.store.transition(id, BuildState::Running, at).await?;
    ctx.store.record_start(id, at).await?;
    report(task, &record, BuildState::Running, ctx).await;
    Ok(TaskResult::for_task(true, format!("Build {} started.", id), task))
}

/// Handles a "build finished" notification.
pub(super) async fn build_finished<S, E, F>(
    task: &TaskSignature,
    ctx: &HandlerContext<S, E, F>,
) -> Result<TaskResult, HandlerFailure>
where
    S: BuildStore,
    E: BuildExecutor,
    F: Forge,
{
    let (id, record) = match stored_build(task, ctx).await? {
        Ok(found) => found,
        Err(result) => return Ok(result),
    };
    if record.kind != RunKind::Build {
        return Ok(TaskResult::for_task(false, format!("Run {} is not a build.", id), task));
    }

    let Some(reported) = reported_status(task).and_then(BuildState::finished_from) else {
        let msg = if record.state.is_terminal() {
            format!("Build {} already finished.", id)
        } else {
            format!("Build {} is still running.", id)
        };
        return Ok(TaskResult::for_task(true, msg, task));
    };

    let won = !record.state.is_terminal()
        && ctx.store.finish(id, reported, task.event().created_at).await?;
    let state = if won {
        report(task, &record, reported, ctx).await;
        reported
    } else {
        debug!(build = %id, "already finished");
        match ctx.store.get(id).await? {
            Some(current) => current.state,
            None => record.state,
        }
    };

    let mut msg = if won {
        format!("Build {} finished: {}.", id, state)
    } else {
        format!("Build {} already finished.", id)
    };
    if state == BuildState::Success && runs_tests_after_build(task.handler(), task.job()) {
        match hand_off_after_build(task, ctx, &record).await? {
            HandOff::Started(run) => msg.push_str(&format!(" Started test run {}.", run)),
            HandOff::AlreadyStarted => {}
            HandOff::Refused(result) => return Ok(result),
        }
    }
    Ok(TaskResult::for_task(true, msg, task))
}

pub(super) fn reported_status(task: &TaskSignature) -> Option<ReportedStatus> {
    match &task.event().kind {
        EventKind::Result(result) => result.status,
        _ => None,
    }
}

fn runs_tests_after_build(handler: HandlerKind, job: &JobDefinition) -> bool {
    handler == HandlerKind::CoprBuildEnd && job.job_type == JobType::Tests
}

/// Looks the notified build up. The inner `Err` is the result to return
/// when there is nothing to work on.
pub(super) async fn stored_build<S, E, F>(
    task: &TaskSignature,
    ctx: &HandlerContext<S, E, F>,
) -> Result<Result<(BuildId, BuildRecord), TaskResult>, HandlerFailure>
where
    S: BuildStore,
{
    let Some(id) = task.upstream_build_id() else {
        return Ok(Err(TaskResult::for_task(
            false,
            "Notification does not name a build.",
            task,
        )));
    };
    match ctx.store.get(id).await? {
        Some(record) => Ok(Ok((id, record))),
        None => {
            warn!(build = %id, "notification for unknown build");
            Ok(Err(TaskResult::for_task(
                false,
                format!("Run {} not found.", id),
                task,
            )))
        }
    }
}

/// The commit-status context of a job: the context of the first handler
/// configured for the job's type that reports one.
pub(crate) fn status_context_for_job(registry: &Registry, job: &JobDefinition) -> Option<String> {
    registry
        .handlers_for_job_type(job.job_type)
        .iter()
        .filter_map(|kind| registry.descriptor(*kind))
        .find_map(|d| d.status_context_for(job.identifier.as_deref()))
}

fn commit_state(state: BuildState) -> CommitState {
    match state {
        BuildState::Pending => CommitState::Pending,
        BuildState::Running => CommitState::Running,
        BuildState::Success => CommitState::Success,
        BuildState::Failure => CommitState::Failure,
        BuildState::Error | BuildState::Cancelled => CommitState::Error,
    }
}

fn description(kind: RunKind, state: BuildState) -> &'static str {
    match (kind, state) {
        (RunKind::Build, BuildState::Pending) => "Build is pending.",
        (RunKind::Build, BuildState::Running) => "Build is in progress.",
        (RunKind::Build, BuildState::Success) => "Build succeeded.",
        (RunKind::Build, BuildState::Failure) => "Build failed.",
        (RunKind::Build, BuildState::Error) => "Build errored.",
        (RunKind::Build, BuildState::Cancelled) => "Build was cancelled.",
        (RunKind::TestRun, BuildState::Pending) => "Tests are queued.",
        (RunKind::TestRun, BuildState::Running) => "Tests are running.",
        (RunKind::TestRun, BuildState::Success) => "Tests passed.",
        (RunKind::TestRun, BuildState::Failure) => "Tests failed.",
        (RunKind::TestRun, BuildState::Error) => "Tests errored.",
        (RunKind::TestRun, BuildState::Cancelled) => "Tests were cancelled.",
    }
}

/// Reports a lifecycle transition to the run's commit. Failures are logged.
pub(super) async fn report<S, E, F>(
    task: &TaskSignature,
    record: &BuildRecord,
    state: BuildState,
    ctx: &HandlerContext<S, E, F>,
) where
    F: Forge,
{
    let Some(context) = status_context_for_job(&ctx.registry, task.job()) else {
        return;
    };
    let Some(sha) = record.commit_sha.as_ref().or(task.event().commit_sha.as_ref()) else {
        debug!(build = %record.id, "no commit to report to");
        return;
    };
    let Some(repo) = record.project_url.repo_id() else {
        return;
    };

    let project = ProjectHandle::public(record.project_url.clone(), repo);
    let status = CommitStatus::new(commit_state(state), description(record.kind, state), &context);
    if let Err(e) = ctx.forge.set_commit_status(&project, sha, &status).await {
        warn!(build = %record.id, %context, error = %e, "failed to report run status");
    }
}
