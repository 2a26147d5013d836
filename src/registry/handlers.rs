//! Handler identities and their static metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checker::Checker;
use crate::events::EventType;
use crate::forge::PermissionLevel;
use crate::jobs::JobType;
use crate::retry::HandlerRetryPolicy;

/// The closed set of handlers the service can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    CoprBuild,
    CoprBuildStart,
    CoprBuildEnd,
    TestingFarm,
    TestingFarmResults,
    UpstreamKojiBuild,
    ProposeDownstream,
    PullFromUpstream,
    DownstreamKojiBuild,
    RetriggerDownstreamKojiBuild,
    BodhiUpdate,
    RetriggerBodhiUpdate,
    IssueCommentRetriggerBodhiUpdate,
    KojiBuildTag,
    VmImageBuild,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 15] = [
        HandlerKind::CoprBuild,
        HandlerKind::CoprBuildStart,
        HandlerKind::CoprBuildEnd,
        HandlerKind::TestingFarm,
        HandlerKind::TestingFarmResults,
        HandlerKind::UpstreamKojiBuild,
        HandlerKind::ProposeDownstream,
        HandlerKind::PullFromUpstream,
        HandlerKind::DownstreamKojiBuild,
        HandlerKind::RetriggerDownstreamKojiBuild,
        HandlerKind::BodhiUpdate,
        HandlerKind::RetriggerBodhiUpdate,
        HandlerKind::IssueCommentRetriggerBodhiUpdate,
        HandlerKind::KojiBuildTag,
        HandlerKind::VmImageBuild,
    ];

    /// Name of the backend task that runs this handler.
    pub fn task_name(&self) -> &'static str {
        match self {
            HandlerKind::CoprBuild => "task.run_copr_build_handler",
            HandlerKind::CoprBuildStart => "task.run_copr_build_start_handler",
            HandlerKind::CoprBuildEnd => "task.run_copr_build_end_handler",
            HandlerKind::TestingFarm => "task.run_testing_farm_handler",
            HandlerKind::TestingFarmResults => "task.run_testing_farm_results_handler",
            HandlerKind::UpstreamKojiBuild => "task.run_koji_build_handler",
            HandlerKind::ProposeDownstream => "task.run_propose_downstream_handler",
            HandlerKind::PullFromUpstream => "task.pull_from_upstream",
            HandlerKind::DownstreamKojiBuild => "task.run_downstream_koji_build_handler",
            HandlerKind::RetriggerDownstreamKojiBuild => {
                "task.run_retrigger_downstream_koji_build_handler"
            }
            HandlerKind::BodhiUpdate => "task.bodhi_update",
            HandlerKind::RetriggerBodhiUpdate => "task.retrigger_bodhi_update",
            HandlerKind::IssueCommentRetriggerBodhiUpdate => {
                "task.issue_comment_retrigger_bodhi_update"
            }
            HandlerKind::KojiBuildTag => "task.koji_build_tag",
            HandlerKind::VmImageBuild => "task.run_vm_image_build_handler",
        }
    }

    /// Looks a handler up by its task name.
    pub fn from_task_name(name: &str) -> Option<HandlerKind> {
        HandlerKind::ALL.into_iter().find(|h| h.task_name() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::CoprBuild => "copr_build",
            HandlerKind::CoprBuildStart => "copr_build_start",
            HandlerKind::CoprBuildEnd => "copr_build_end",
            HandlerKind::TestingFarm => "testing_farm",
            HandlerKind::TestingFarmResults => "testing_farm_results",
            HandlerKind::UpstreamKojiBuild => "upstream_koji_build",
            HandlerKind::ProposeDownstream => "propose_downstream",
            HandlerKind::PullFromUpstream => "pull_from_upstream",
            HandlerKind::DownstreamKojiBuild => "downstream_koji_build",
            HandlerKind::RetriggerDownstreamKojiBuild => "retrigger_downstream_koji_build",
            HandlerKind::BodhiUpdate => "bodhi_update",
            HandlerKind::RetriggerBodhiUpdate => "retrigger_bodhi_update",
            HandlerKind::IssueCommentRetriggerBodhiUpdate => {
                "issue_comment_retrigger_bodhi_update"
            }
            HandlerKind::KojiBuildTag => "koji_build_tag",
            HandlerKind::VmImageBuild => "vm_image_build",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata of one handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDescriptor {
    pub kind: HandlerKind,

    /// Job types the handler runs.
    pub job_types: Vec<JobType>,

    /// Job types that presuppose this handler's work (tests need a build).
    pub required_for: Vec<JobType>,

    /// Event types the handler reacts to.
    pub event_types: Vec<EventType>,

    /// Comment commands (without prefix) that select the handler.
    pub comment_commands: Vec<String>,

    /// Check-name prefixes whose rerun selects the handler.
    pub check_prefixes: Vec<String>,

    /// Gates evaluated, in order, before dispatch.
    pub checkers: Vec<Checker>,

    pub retry: HandlerRetryPolicy,

    /// Commit-status context prefix for the "accepted" report. Handlers
    /// without one acknowledge through a comment reaction only.
    pub status_context: Option<&'static str>,
}

impl HandlerDescriptor {
    pub fn new(kind: HandlerKind) -> Self {
        HandlerDescriptor {
            kind,
            job_types: Vec::new(),
            required_for: Vec::new(),
            event_types: Vec::new(),
            comment_commands: Vec::new(),
            check_prefixes: Vec::new(),
            checkers: Vec::new(),
            retry: HandlerRetryPolicy::STANDARD,
            status_context: None,
        }
    }

    pub fn configured_as(mut self, job_types: impl IntoIterator<Item = JobType>) -> Self {
        self.job_types.extend(job_types);
        self
    }

    pub fn required_for(mut self, job_types: impl IntoIterator<Item = JobType>) -> Self {
        self.required_for.extend(job_types);
        self
    }

    pub fn reacts_to(mut self, event_types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types.extend(event_types);
        self
    }

    pub fn run_for_comment<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.comment_commands.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn run_for_check_rerun(mut self, prefix: impl Into<String>) -> Self {
        self.check_prefixes.push(prefix.into());
        self
    }

    pub fn with_checkers(mut self, checkers: impl IntoIterator<Item = Checker>) -> Self {
        self.checkers.extend(checkers);
        self
    }

    pub fn with_retry(mut self, retry: HandlerRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_status_context(mut self, context: &'static str) -> Self {
        self.status_context = Some(context);
        self
    }

    pub fn reacts_to_event(&self, event_type: EventType) -> bool {
        self.event_types.contains(&event_type)
    }

    /// The commit-status context for a job with the given identifier.
    pub fn status_context_for(&self, identifier: Option<&str>) -> Option<String> {
        let prefix = self.status_context?;
        Some(match identifier {
            Some(id) => format!("{}:{}", prefix, id),
            None => prefix.to_string(),
        })
    }
}

// ─── The standard handler set ─────────────────────────────────────────────────

const UPSTREAM_TRIGGERS: [EventType; 5] = [
    EventType::PullRequestAction,
    EventType::Push,
    EventType::Release,
    EventType::PullRequestComment,
    EventType::CheckRerun,
];

fn privileged() -> [Checker; 3] {
    [
        Checker::TriggerMatches,
        Checker::ProjectAllowed,
        Checker::ActorPermission {
            min: PermissionLevel::Write,
        },
    ]
}

/// Descriptors of every handler, in registration order.
pub fn standard_descriptors(retry: HandlerRetryPolicy) -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::new(HandlerKind::CoprBuild)
            .configured_as([JobType::CoprBuild])
            .required_for([JobType::Tests])
            .reacts_to(UPSTREAM_TRIGGERS)
            .reacts_to([EventType::CommitComment])
            .run_for_comment(["build", "copr-build", "rebuild-failed"])
            .run_for_check_rerun("rpm-build")
            .with_checkers(privileged())
            .with_checkers([Checker::CustomProjectAllowed])
            .with_retry(retry)
            .with_status_context("rpm-build"),
        HandlerDescriptor::new(HandlerKind::CoprBuildStart)
            .configured_as([JobType::CoprBuild])
            .required_for([JobType::Tests])
            .reacts_to([EventType::BuildStart])
            .with_checkers([Checker::BuildMatchesJob])
            .with_retry(retry),
        HandlerDescriptor::new(HandlerKind::CoprBuildEnd)
            .configured_as([JobType::CoprBuild])
            .required_for([JobType::Tests])
            .reacts_to([EventType::BuildEnd])
            .with_checkers([Checker::BuildMatchesJob])
            .with_retry(retry),
        HandlerDescriptor::new(HandlerKind::TestingFarm)
            .configured_as([JobType::Tests])
            .reacts_to([
                EventType::PullRequestAction,
                EventType::Push,
                EventType::PullRequestComment,
                EventType::CommitComment,
                EventType::CheckRerun,
            ])
            .run_for_comment(["test", "retest-failed"])
            .run_for_check_rerun("testing-farm")
            .with_checkers(privileged())
            .with_retry(retry)
            .with_status_context("testing-farm"),
        HandlerDescriptor::new(HandlerKind::TestingFarmResults)
            .configured_as([JobType::Tests])
            .reacts_to([EventType::TestResult])
            .with_checkers([Checker::BuildMatchesJob])
            .with_retry(retry),
        HandlerDescriptor::new(HandlerKind::UpstreamKojiBuild)
            .configured_as([JobType::UpstreamKojiBuild])
            .reacts_to(UPSTREAM_TRIGGERS)
            .run_for_comment(["upstream-koji-build"])
            .run_for_check_rerun("koji-build")
            .with_checkers(privileged())
            .with_retry(retry)
            .with_status_context("koji-build"),
        HandlerDescriptor::new(HandlerKind::ProposeDownstream)
            .configured_as([JobType::ProposeDownstream])
            .reacts_to([EventType::Release, EventType::IssueComment, EventType::CheckRerun])
            .run_for_comment(["propose-downstream"])
            .run_for_check_rerun("propose-downstream")
            .with_checkers(privileged())
            .with_retry(retry)
            .with_status_context("propose-downstream"),
        HandlerDescriptor::new(HandlerKind::PullFromUpstream)
            .configured_as([JobType::PullFromUpstream])
            .reacts_to([EventType::Release, EventType::DistGitPullRequestComment])
            .run_for_comment(["pull-from-upstream"])
            .with_checkers([Checker::ActorPermission {
                min: PermissionLevel::Write,
            }])
            .with_retry(retry),
        HandlerDescriptor::new(HandlerKind::DownstreamKojiBuild)
            .configured_as([JobType::KojiBuild])
            .reacts_to([EventType::Push])
            .with_checkers([Checker::TriggerMatches])
            .with_retry(retry),
        HandlerDescriptor::new(HandlerKind::RetriggerDownstreamKojiBuild)
            .configured_as([JobType::KojiBuild])
            .reacts_to([EventType::DistGitPullRequestComment, EventType::IssueComment])
            .run_for_comment(["koji-build", "koji-tag"])
            .with_checkers([Checker::ActorPermission {
                min: PermissionLevel::Write,
            }])
            .with_retry(retry),
        HandlerDescriptor::new(HandlerKind::BodhiUpdate)
            .configured_as([JobType::BodhiUpdate])
            .reacts_to([EventType::BuildEnd])
            .with_checkers([Checker::BuildMatchesJob])
            .with_retry(HandlerRetryPolicy::BODHI),
        HandlerDescriptor::new(HandlerKind::RetriggerBodhiUpdate)
            .configured_as([JobType::BodhiUpdate])
            .reacts_to([EventType::DistGitPullRequestComment])
            .run_for_comment(["create-update"])
            .with_checkers([Checker::ActorPermission {
                min: PermissionLevel::Write,
            }])
            .with_retry(HandlerRetryPolicy::BODHI),
        HandlerDescriptor::new(HandlerKind::IssueCommentRetriggerBodhiUpdate)
            .configured_as([JobType::BodhiUpdate])
            .reacts_to([EventType::IssueComment])
            .run_for_comment(["create-update"])
            .with_checkers([Checker::ActorPermission {
                min: PermissionLevel::Write,
            }])
            .with_retry(HandlerRetryPolicy::BODHI),
        HandlerDescriptor::new(HandlerKind::KojiBuildTag)
            .configured_as([JobType::KojiBuildTag])
            .reacts_to([EventType::TagBuild])
            .with_retry(retry),
        HandlerDescriptor::new(HandlerKind::VmImageBuild)
            .configured_as([JobType::VmImageBuild])
            .reacts_to([EventType::PullRequestComment])
            .run_for_comment(["vm-image-build"])
            .with_checkers(privileged())
            .with_retry(retry),
    ]
}
