//! Event variants.
//!
//! Each variant carries only the fields the dispatcher needs; everything else
//! stays in the original payload, which is out of our hands.

use serde::{Deserialize, Serialize};

use crate::jobs::TriggerKind;
use crate::types::{BuildId, CommentId, PrNumber};

/// The normalized trigger, one variant per event family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Comment(CommentEvent),
    PullRequestAction(PullRequestActionEvent),
    Push(PushEvent),
    Release(ReleaseEvent),
    Result(ResultEvent),
    CheckRerun(CheckRerunEvent),
}

/// Where a comment was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "on", rename_all = "snake_case")]
pub enum CommentScope {
    /// A pull request on an upstream forge.
    PullRequest { number: PrNumber },
    /// A pull request in the downstream dist-git.
    DistGitPullRequest { number: PrNumber },
    /// An issue, usually one opened by the bot after a failed release job.
    Issue { number: u64 },
    /// A commit.
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEvent {
    pub comment_id: CommentId,
    pub body: String,
    #[serde(flatten)]
    pub scope: CommentScope,
}

/// Action performed on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    Opened,
    Reopened,
    Synchronize,
    Edited,
    Closed,
}

impl PrAction {
    /// Actions that (re)start pull-request automation.
    pub fn starts_jobs(&self) -> bool {
        matches!(
            self,
            PrAction::Opened | PrAction::Reopened | PrAction::Synchronize
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestActionEvent {
    pub number: PrNumber,
    pub action: PrAction,
    #[serde(default)]
    pub target_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub git_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEvent {
    pub tag_name: String,
}

/// What kind of outcome a result notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    BuildStarted,
    BuildFinished,
    TestsFinished,
    /// A downstream build was tagged (e.g. into a side tag).
    TagBuild,
}

/// Terminal or in-flight state reported by an external build/test system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Running,
    Success,
    Failure,
    Error,
}

/// A notification from an external build or test system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEvent {
    pub result: ResultKind,

    /// The trigger of the job that started the build, recovered from storage.
    pub trigger: TriggerKind,

    #[serde(default)]
    pub build_id: Option<BuildId>,

    #[serde(default)]
    pub status: Option<ReportedStatus>,

    /// Package name as known by the reporting system.
    #[serde(default)]
    pub package: Option<String>,

    /// Job identifier of the job that started the build.
    #[serde(default)]
    pub identifier: Option<String>,

    /// Build target / chroot.
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub pull_request: Option<PrNumber>,
}

/// A user asked the forge to re-run one of our checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRerunEvent {
    /// Check-name prefix owning the check, e.g. `rpm-build`.
    pub check_name_job: String,

    /// Job identifier encoded in the check name, if any.
    #[serde(default)]
    pub identifier: Option<String>,

    /// Trigger of the job the check belongs to.
    pub trigger: TriggerKind,

    #[serde(default)]
    pub pull_request: Option<PrNumber>,
}
