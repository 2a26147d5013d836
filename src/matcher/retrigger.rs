//! Explicit re-trigger matching.
//!
//! Some events may start jobs whose native trigger they do not match:
//!
//! | Event | Re-triggers |
//! |-------|-------------|
//! | dist-git PR comment | `koji_build` / `bodhi_update` on `commit` or `koji_build`; `pull_from_upstream` on `release` |
//! | issue comment | `koji_build` / `bodhi_update` on `commit` or `koji_build` |
//! | tag build | a synthesized `koji_build_tag` job for the tagged package |

use crate::commands::Command;
use crate::events::{Event, EventType};
use crate::jobs::{JobDefinition, JobType, PackagesConfig, TriggerKind};

/// Jobs this event is explicitly permitted to re-trigger, excluding any
/// that duplicate a job in `already_matched` or each other.
pub(super) fn explicit_matches(
    event: &Event,
    config: &PackagesConfig,
    command: Option<&Command>,
    already_matched: &[JobDefinition],
) -> Vec<JobDefinition> {
    let mut matched: Vec<JobDefinition> = Vec::new();

    let candidates: Vec<JobDefinition> = match event.event_type() {
        EventType::DistGitPullRequestComment if event.trigger_kind() == TriggerKind::PullRequest => {
            let koji_tag = command.is_some_and(Command::is_koji_tag);
            config
                .job_views()
                .iter()
                .filter(|job| {
                    if is_downstream_build_or_update(job) {
                        !(koji_tag && job.job_type == JobType::KojiBuild && job.sidetag_group.is_none())
                    } else {
                        job.job_type == JobType::PullFromUpstream && job.trigger == TriggerKind::Release
                    }
                })
                .cloned()
                .collect()
        }
        EventType::IssueComment if event.trigger_kind() == TriggerKind::Release => config
            .job_views()
            .iter()
            .filter(|job| is_downstream_build_or_update(job))
            .cloned()
            .collect(),
        EventType::TagBuild => tag_build_job(event, config).into_iter().collect(),
        _ => Vec::new(),
    };

    for job in candidates {
        let duplicate = already_matched
            .iter()
            .chain(matched.iter())
            .any(|existing| same_identity(config, existing, &job));
        if !duplicate {
            matched.push(job);
        }
    }

    matched
}

fn is_downstream_build_or_update(job: &JobDefinition) -> bool {
    matches!(job.job_type, JobType::KojiBuild | JobType::BodhiUpdate)
        && matches!(job.trigger, TriggerKind::Commit | TriggerKind::KojiBuild)
}

/// Whether two jobs describe the same unit of work for re-triggering.
///
/// Downstream builds are also identified by the downstream package they
/// build, so packages sharing a downstream name build once.
fn same_identity(config: &PackagesConfig, a: &JobDefinition, b: &JobDefinition) -> bool {
    if a.same_except_trigger(b) {
        return true;
    }
    a.job_type == JobType::KojiBuild
        && b.job_type == JobType::KojiBuild
        && a.sidetag_group == b.sidetag_group
        && config.downstream_name_for(a) == config.downstream_name_for(b)
}

/// The virtual job a tag-build notification runs: one per event, for the
/// first package whose downstream name is the tagged package.
fn tag_build_job(event: &Event, config: &PackagesConfig) -> Option<JobDefinition> {
    let tagged = event.tagged_package()?;
    let package = config.package_by_downstream_name(tagged)?;
    Some(JobDefinition::new(
        JobType::KojiBuildTag,
        TriggerKind::KojiBuild,
        package.name.clone(),
    ))
}
