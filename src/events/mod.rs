//! Normalized trigger events.
//!
//! An [`Event`] is the dispatcher's read-mostly view of one inbound trigger.
//! Payload-specific parsers (outside this crate) produce an [`EventRecord`];
//! [`Event::from_record`] wraps it together with the lazily resolved state the
//! rest of the pipeline needs:
//!
//! - the project handle (visibility, repository id), and
//! - the repository's job configuration.
//!
//! Both are resolved on first access through a [`ConfigResolver`] and
//! memoized in a single-initialization cell. A failed resolution is memoized
//! as well: later accessors see the same error and no second lookup is made.
//!
//! # Event types
//!
//! | Variant | [`EventType`] | Trigger kind |
//! |---------|---------------|--------------|
//! | comment on upstream PR | `PullRequestComment` | `pull_request` |
//! | comment on dist-git PR | `DistGitPullRequestComment` | `pull_request` |
//! | comment on issue | `IssueComment` | `release` |
//! | comment on commit | `CommitComment` | `commit` |
//! | PR action | `PullRequestAction` / `DistGitPullRequestAction` | `pull_request` |
//! | push | `Push` | `commit` |
//! | release | `Release` | `release` |
//! | result | `BuildStart` / `BuildEnd` / `TestResult` / `TagBuild` | carried / `koji_build` |
//! | check rerun | `CheckRerun` | carried |

mod kinds;
mod resolve;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::jobs::{PackagesConfig, TriggerKind};
use crate::types::{CommentId, PrNumber, ProjectUrl, Sha};

pub use kinds::{
    CheckRerunEvent, CommentEvent, CommentScope, EventKind, PrAction, PullRequestActionEvent,
    PushEvent, ReleaseEvent, ReportedStatus, ResultEvent, ResultKind,
};
pub use resolve::{ConfigResolver, ProjectHandle, ResolveError};

/// The forge (or message bus) an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeKind {
    GitHub,
    GitLab,
    Forgejo,
    /// Downstream dist-git.
    Pagure,
    /// Build/test system notifications that are not tied to a forge.
    Bus,
}

/// Fine-grained event type used as the registry key for handler lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PullRequestComment,
    DistGitPullRequestComment,
    IssueComment,
    CommitComment,
    PullRequestAction,
    DistGitPullRequestAction,
    Push,
    Release,
    BuildStart,
    BuildEnd,
    TestResult,
    TagBuild,
    CheckRerun,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: [EventType; 13] = [
        EventType::PullRequestComment,
        EventType::DistGitPullRequestComment,
        EventType::IssueComment,
        EventType::CommitComment,
        EventType::PullRequestAction,
        EventType::DistGitPullRequestAction,
        EventType::Push,
        EventType::Release,
        EventType::BuildStart,
        EventType::BuildEnd,
        EventType::TestResult,
        EventType::TagBuild,
        EventType::CheckRerun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PullRequestComment => "pull_request_comment",
            EventType::DistGitPullRequestComment => "dist_git_pull_request_comment",
            EventType::IssueComment => "issue_comment",
            EventType::CommitComment => "commit_comment",
            EventType::PullRequestAction => "pull_request_action",
            EventType::DistGitPullRequestAction => "dist_git_pull_request_action",
            EventType::Push => "push",
            EventType::Release => "release",
            EventType::BuildStart => "build_start",
            EventType::BuildEnd => "build_end",
            EventType::TestResult => "test_result",
            EventType::TagBuild => "tag_build",
            EventType::CheckRerun => "check_rerun",
        }
    }

    /// Comment-originated event types.
    pub fn is_comment(&self) -> bool {
        matches!(
            self,
            EventType::PullRequestComment
                | EventType::DistGitPullRequestComment
                | EventType::IssueComment
                | EventType::CommitComment
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat, transport-safe form of an event.
///
/// This is what external parsers produce and what travels inside task
/// signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(flatten)]
    pub kind: EventKind,

    pub forge: ForgeKind,

    pub project_url: ProjectUrl,

    #[serde(default)]
    pub commit_sha: Option<Sha>,

    /// Login of the user who caused the event.
    #[serde(default)]
    pub actor: Option<String>,

    /// When the origin system created the event.
    pub created_at: DateTime<Utc>,

    /// Labels of the pull request, when the payload carries them.
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// One normalized trigger plus its lazily resolved context.
#[derive(Debug)]
pub struct Event {
    kind: EventKind,
    forge: ForgeKind,
    project_url: ProjectUrl,
    commit_sha: Option<Sha>,
    actor: Option<String>,
    created_at: DateTime<Utc>,

    labels: OnceCell<Vec<String>>,
    project: OnceCell<Result<ProjectHandle, ResolveError>>,
    packages_config: OnceCell<Result<Option<PackagesConfig>, ResolveError>>,
}

impl Event {
    /// Creates an event with no actor, commit or labels.
    pub fn new(
        kind: EventKind,
        forge: ForgeKind,
        project_url: ProjectUrl,
        created_at: DateTime<Utc>,
    ) -> Self {
        Event {
            kind,
            forge,
            project_url,
            commit_sha: None,
            actor: None,
            created_at,
            labels: OnceCell::new(),
            project: OnceCell::new(),
            packages_config: OnceCell::new(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_commit_sha(mut self, sha: impl Into<Sha>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    pub fn with_labels<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_labels(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn from_record(record: EventRecord) -> Self {
        let EventRecord {
            kind,
            forge,
            project_url,
            commit_sha,
            actor,
            created_at,
            labels,
        } = record;

        let event = Event {
            commit_sha,
            actor,
            ..Event::new(kind, forge, project_url, created_at)
        };
        if let Some(labels) = labels {
            event.set_labels(labels);
        }
        event
    }

    /// Serializes the event into its transport-safe form.
    ///
    /// Resolved labels are included; resolved project/config state is not.
    pub fn to_record(&self) -> EventRecord {
        EventRecord {
            kind: self.kind.clone(),
            forge: self.forge,
            project_url: self.project_url.clone(),
            commit_sha: self.commit_sha.clone(),
            actor: self.actor.clone(),
            created_at: self.created_at,
            labels: self.labels.get().cloned(),
        }
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn forge(&self) -> ForgeKind {
        self.forge
    }

    pub fn project_url(&self) -> &ProjectUrl {
        &self.project_url
    }

    pub fn commit_sha(&self) -> Option<&Sha> {
        self.commit_sha.as_ref()
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn event_type(&self) -> EventType {
        match &self.kind {
            EventKind::Comment(c) => match c.scope {
                CommentScope::PullRequest { .. } => EventType::PullRequestComment,
                CommentScope::DistGitPullRequest { .. } => EventType::DistGitPullRequestComment,
                CommentScope::Issue { .. } => EventType::IssueComment,
                CommentScope::Commit => EventType::CommitComment,
            },
            EventKind::PullRequestAction(_) if self.forge == ForgeKind::Pagure => {
                EventType::DistGitPullRequestAction
            }
            EventKind::PullRequestAction(_) => EventType::PullRequestAction,
            EventKind::Push(_) => EventType::Push,
            EventKind::Release(_) => EventType::Release,
            EventKind::Result(r) => match r.result {
                ResultKind::BuildStarted => EventType::BuildStart,
                ResultKind::BuildFinished => EventType::BuildEnd,
                ResultKind::TestsFinished => EventType::TestResult,
                ResultKind::TagBuild => EventType::TagBuild,
            },
            EventKind::CheckRerun(_) => EventType::CheckRerun,
        }
    }

    /// The trigger this event represents when matched against job definitions.
    pub fn trigger_kind(&self) -> TriggerKind {
        match &self.kind {
            EventKind::Comment(c) => match c.scope {
                CommentScope::PullRequest { .. } | CommentScope::DistGitPullRequest { .. } => {
                    TriggerKind::PullRequest
                }
                CommentScope::Issue { .. } => TriggerKind::Release,
                CommentScope::Commit => TriggerKind::Commit,
            },
            EventKind::PullRequestAction(_) => TriggerKind::PullRequest,
            EventKind::Push(_) => TriggerKind::Commit,
            EventKind::Release(_) => TriggerKind::Release,
            EventKind::Result(r) if r.result == ResultKind::TagBuild => TriggerKind::KojiBuild,
            EventKind::Result(r) => r.trigger,
            EventKind::CheckRerun(c) => c.trigger,
        }
    }

    /// The comment text, for comment events.
    pub fn comment(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Comment(c) => Some(&c.body),
            _ => None,
        }
    }

    pub fn comment_id(&self) -> Option<CommentId> {
        match &self.kind {
            EventKind::Comment(c) => Some(c.comment_id),
            _ => None,
        }
    }

    /// Check-name prefix of a check-rerun request.
    pub fn check_name_job(&self) -> Option<&str> {
        match &self.kind {
            EventKind::CheckRerun(c) => Some(&c.check_name_job),
            _ => None,
        }
    }

    /// Job identifier of a check-rerun request.
    ///
    /// `None` for other events and for reruns of checks without identifier.
    pub fn check_rerun_identifier(&self) -> Option<&str> {
        match &self.kind {
            EventKind::CheckRerun(c) => c.identifier.as_deref(),
            _ => None,
        }
    }

    /// The build/test notification, for result events.
    pub fn result(&self) -> Option<&ResultEvent> {
        match &self.kind {
            EventKind::Result(r) => Some(r),
            _ => None,
        }
    }

    /// Downstream package name of a tag-build notification.
    pub fn tagged_package(&self) -> Option<&str> {
        self.result()
            .filter(|r| r.result == ResultKind::TagBuild)
            .and_then(|r| r.package.as_deref())
    }

    /// The pull request this event refers to, if any.
    pub fn pull_request(&self) -> Option<PrNumber> {
        match &self.kind {
            EventKind::Comment(c) => match c.scope {
                CommentScope::PullRequest { number }
                | CommentScope::DistGitPullRequest { number } => Some(number),
                _ => None,
            },
            EventKind::PullRequestAction(pr) => Some(pr.number),
            EventKind::Result(r) => r.pull_request,
            EventKind::CheckRerun(c) => c.pull_request,
            EventKind::Push(_) | EventKind::Release(_) => None,
        }
    }

    /// Whether this event is an upstream forge event (as opposed to a
    /// dist-git event or a build-system notification).
    pub fn is_forge_event(&self) -> bool {
        !matches!(self.kind, EventKind::Result(_))
            && !matches!(self.forge, ForgeKind::Pagure | ForgeKind::Bus)
    }

    /// Events allowed to match jobs declared with `manual_trigger`.
    pub fn is_manual_or_result(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Comment(_) | EventKind::Result(_) | EventKind::CheckRerun(_)
        )
    }

    /// Labels of the pull request, once known.
    pub fn labels(&self) -> Option<&[String]> {
        self.labels.get().map(Vec::as_slice)
    }

    /// Records the pull request's labels. Ignored if already known.
    pub fn set_labels(&self, labels: Vec<String>) {
        let _ = self.labels.set(labels);
    }

    /// Fast structural admissibility test.
    ///
    /// Events failing it are counted and discarded without any I/O.
    pub fn pre_check(&self) -> bool {
        if self.project_url.repo_id().is_none() {
            return false;
        }

        match &self.kind {
            EventKind::Comment(c) => !c.body.trim().is_empty(),
            EventKind::PullRequestAction(pr) => pr.action.starts_jobs(),
            EventKind::Push(p) => !p.git_ref.is_empty() && self.commit_sha.is_some(),
            EventKind::Release(r) => !r.tag_name.is_empty(),
            EventKind::Result(r) => match r.result {
                ResultKind::TagBuild => r.package.as_deref().is_some_and(|p| !p.is_empty()),
                _ => r.build_id.is_some(),
            },
            EventKind::CheckRerun(c) => !c.check_name_job.is_empty(),
        }
    }

    // ─── Lazy resolution ──────────────────────────────────────────────────────

    /// Resolves (once) the project the event belongs to.
    pub async fn project<R: ConfigResolver>(
        &self,
        resolver: &R,
    ) -> Result<&ProjectHandle, ResolveError> {
        self.project
            .get_or_init(|| resolver.resolve_project(&self.project_url))
            .await
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Resolves (once) the repository's job configuration.
    ///
    /// `Ok(None)` means the repository has no configuration.
    pub async fn packages_config<R: ConfigResolver>(
        &self,
        resolver: &R,
    ) -> Result<Option<&PackagesConfig>, ResolveError> {
        let project = self.project(resolver).await?;
        self.packages_config
            .get_or_init(|| resolver.load_packages_config(project, self.commit_sha.as_ref()))
            .await
            .as_ref()
            .map(Option::as_ref)
            .map_err(Clone::clone)
    }

    /// The job configuration if it has already been resolved successfully.
    pub fn resolved_packages_config(&self) -> Option<&PackagesConfig> {
        self.packages_config.get()?.as_ref().ok()?.as_ref()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.event_type(), self.project_url)?;
        if let Some(pr) = self.pull_request() {
            write!(f, " {}", pr)?;
        }
        Ok(())
    }
}
