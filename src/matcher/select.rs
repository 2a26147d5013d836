//! Handler selection for matched jobs.

use std::collections::BTreeSet;

use tracing::debug;

use crate::commands::Command;
use crate::events::Event;
use crate::jobs::JobDefinition;
use crate::registry::{HandlerKind, Registry};

/// Handlers an explicit request (comment command or check rerun) selects.
///
/// `None` when the event is neither a comment nor a check rerun, meaning no
/// restriction applies. A comment without a known command selects nothing.
pub fn requested_handlers(
    event: &Event,
    registry: &Registry,
    command: Option<&Command>,
) -> Option<BTreeSet<HandlerKind>> {
    if event.event_type().is_comment() {
        return Some(
            command
                .map(|c| registry.handlers_for_command(&c.name).clone())
                .unwrap_or_default(),
        );
    }
    event
        .check_name_job()
        .map(|prefix| registry.handlers_for_check_prefix(prefix).clone())
}

/// Handlers to run for the matched jobs.
///
/// Candidates are the handlers of each job's type plus the handlers the job
/// type requires; a candidate is kept if it reacts to the event type and, when
/// `requested` is given, was requested.
pub fn select_handlers(
    event: &Event,
    registry: &Registry,
    matched: &[JobDefinition],
    requested: Option<&BTreeSet<HandlerKind>>,
) -> BTreeSet<HandlerKind> {
    let event_type = event.event_type();
    let reacting = registry.handlers_for_event(event_type);

    let selected: BTreeSet<HandlerKind> = matched
        .iter()
        .flat_map(|job| {
            registry
                .handlers_for_job_type(job.job_type)
                .union(registry.handlers_requiring_job_type(job.job_type))
        })
        .filter(|handler| reacting.contains(handler))
        .filter(|handler| requested.is_none_or(|allowed| allowed.contains(handler)))
        .copied()
        .collect();

    if selected.is_empty() {
        debug!(event_type = %event_type, "no handler for event");
    }
    selected
}

/// The matched jobs a handler runs, in configuration order.
///
/// Jobs of a type the handler is configured for win; otherwise the handler
/// runs for the jobs that require it (a build started for a tests job).
pub fn jobs_for_handler(
    registry: &Registry,
    handler: HandlerKind,
    matched: &[JobDefinition],
) -> Vec<JobDefinition> {
    let configured: Vec<JobDefinition> = matched
        .iter()
        .filter(|job| registry.handlers_for_job_type(job.job_type).contains(&handler))
        .cloned()
        .collect();
    if !configured.is_empty() {
        return configured;
    }

    debug!(%handler, "no job configured for handler, using jobs requiring it");
    matched
        .iter()
        .filter(|job| {
            registry
                .handlers_requiring_job_type(job.job_type)
                .contains(&handler)
        })
        .cloned()
        .collect()
}
