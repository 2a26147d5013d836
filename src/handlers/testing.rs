//! Test runs: submission, the hand-off after a successful build, and result
//! notifications.
//!
//! A test run is stored next to builds as a [`RunKind::TestRun`] record and
//! finished through the same compare-and-set, so redelivered results report
//! once.

use tracing::{debug, info, warn};

use crate::dispatch::{TaskResult, TaskSignature};
use crate::events::Event;
use crate::forge::Forge;
use crate::types::BuildId;

use super::build::{report, reported_status, stored_build};
use super::{
    BuildExecutor, BuildRecord, BuildState, BuildStore, HandlerContext, HandlerFailure, RunKind,
    executor_failure,
};

/// Outcome of handing the tests of a finished build off.
pub(super) enum HandOff {
    Started(BuildId),
    /// An earlier delivery already claimed the tests.
    AlreadyStarted,
    /// The test service refused the run; retrying cannot help.
    Refused(TaskResult),
}

/// Submits a test run for a tests job.
pub(super) async fn start_tests<S, E, F>(
    task: &TaskSignature,
    ctx: &HandlerContext<S, E, F>,
) -> Result<TaskResult, HandlerFailure>
where
    S: BuildStore,
    E: BuildExecutor,
    F: Forge,
{
    let id = match ctx.executor.start_test_run(task).await {
        Ok(id) => id,
        Err(e) => return executor_failure(task, e),
    };
    let record = test_run_record(task, id);
    ctx.store.insert(record.clone()).await?;
    report(task, &record, BuildState::Running, ctx).await;

    info!(run = %id, "test run submitted");
    Ok(TaskResult::for_task(true, format!("Submitted test run {}.", id), task))
}

/// Starts the tests that follow `build`, unless an earlier delivery of the
/// same notification already did.
///
/// The claim is taken before the test run is submitted. It is given back
/// only when submitting failed in a retriable way; once a run exists, a
/// failure to record it must not lead a retry to start a second one.
pub(super) async fn hand_off_after_build<S, E, F>(
    task: &TaskSignature,
    ctx: &HandlerContext<S, E, F>,
    build: &BuildRecord,
) -> Result<HandOff, HandlerFailure>
where
    S: BuildStore,
    E: BuildExecutor,
    F: Forge,
{
    if !ctx.store.claim_follow_up(build.id).await? {
        debug!(build = %build.id, "tests already handed off");
        return Ok(HandOff::AlreadyStarted);
    }

    let run = match ctx.executor.start_test_run(task).await {
        Ok(run) => run,
        Err(e) => {
            if e.class().is_some() {
                if let Err(release) = ctx.store.release_follow_up(build.id).await {
                    warn!(build = %build.id, error = %release, "cannot release tests claim");
                }
            }
            return executor_failure(task, e).map(HandOff::Refused);
        }
    };

    let mut record = test_run_record(task, run);
    if record.commit_sha.is_none() {
        record.commit_sha = build.commit_sha.clone();
    }
    if let Err(e) = ctx.store.insert(record.clone()).await {
        warn!(build = %build.id, %run, error = %e, "test run started but not recorded");
        return Err(e.into());
    }
    report(task, &record, BuildState::Running, ctx).await;

    info!(build = %build.id, %run, "tests handed off");
    Ok(HandOff::Started(run))
}

/// Handles a "tests finished" notification.
pub(super) async fn tests_finished<S, E, F>(
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
    if record.kind != RunKind::TestRun {
        warn!(run = %id, "test result names a build");
        return Ok(TaskResult::for_task(false, format!("Run {} is not a test run.", id), task));
    }

    let Some(state) = reported_status(task).and_then(BuildState::finished_from) else {
        return Ok(TaskResult::for_task(true, format!("Test run {} is still running.", id), task));
    };

    let won = !record.state.is_terminal()
        && ctx.store.finish(id, state, task.event().created_at).await?;
    if !won {
        debug!(run = %id, "already finished");
        return Ok(TaskResult::for_task(true, format!("Test run {} already finished.", id), task));
    }

    report(task, &record, state, ctx).await;
    Ok(TaskResult::for_task(true, format!("Test run {} finished: {}.", id, state), task))
}

fn test_run_record(task: &TaskSignature, id: BuildId) -> BuildRecord {
    let event = Event::from_record(task.event().clone());
    let mut record = BuildRecord::test_run(id, event.project_url().clone());
    if let Some(pr) = event.pull_request() {
        record = record.with_pull_request(pr);
    }
    if let Some(sha) = event.commit_sha() {
        record = record.with_commit_sha(sha.clone());
    }
    record
}
