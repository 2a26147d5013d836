//! Event-to-job matching.
//!
//! [`match_jobs`] is a pure function of the event, the repository's ordered
//! job list and the parsed comment command. It runs three passes:
//!
//! 1. **Base filter**: the job's trigger equals the event's trigger kind;
//!    check reruns also need the job identifier to match; manual-trigger
//!    jobs need a comment, result or check-rerun event; structural
//!    duplicates are dropped.
//! 2. **Label filter**: pull-request jobs with label predicates are checked
//!    against the pull request's labels, for upstream forge events that
//!    carry a pull request.
//! 3. **Explicit re-trigger**: jobs with a different native trigger that the
//!    event type may start anyway, deduplicated against everything matched
//!    so far.
//!
//! The output is the base matches followed by the re-trigger matches, each
//! in configuration order. The dispatcher does no deduplication of its own.

mod retrigger;
mod select;

use tracing::debug;

use crate::commands::Command;
use crate::events::{Event, EventKind};
use crate::jobs::{JobDefinition, PackagesConfig, TriggerKind};

pub use select::{jobs_for_handler, requested_handlers, select_handlers};

/// Jobs the event activates, deduplicated, in configuration order.
pub fn match_jobs(
    event: &Event,
    config: &PackagesConfig,
    command: Option<&Command>,
) -> Vec<JobDefinition> {
    let labels: &[String] = event.labels().unwrap_or_default();
    let mut matched: Vec<JobDefinition> = Vec::new();

    for job in config.job_views() {
        if !matches_trigger(event, job) || matched.contains(job) {
            continue;
        }
        if label_filter_applies(event, job) && !job.labels.is_satisfied_by(labels) {
            debug!(%job, ?labels, "job excluded by label requirements");
            continue;
        }
        matched.push(job.clone());
    }

    let explicit = retrigger::explicit_matches(event, config, command, &matched);
    matched.extend(explicit);

    debug!(
        event = %event,
        jobs = ?matched.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "jobs matching event"
    );
    matched
}

fn matches_trigger(event: &Event, job: &JobDefinition) -> bool {
    if job.trigger != event.trigger_kind() {
        return false;
    }
    if matches!(event.kind(), EventKind::CheckRerun(_))
        && job.identifier.as_deref() != event.check_rerun_identifier()
    {
        return false;
    }
    !job.manual_trigger || event.is_manual_or_result()
}

/// Label predicates only apply to pull-request jobs, and only when the event
/// is an upstream forge event and carries a pull request. Check reruns are
/// never label-filtered.
fn label_filter_applies(event: &Event, job: &JobDefinition) -> bool {
    job.trigger == TriggerKind::PullRequest
        && !job.labels.is_empty()
        && !matches!(event.kind(), EventKind::CheckRerun(_))
        && event.is_forge_event()
        && event.pull_request().is_some()
}
