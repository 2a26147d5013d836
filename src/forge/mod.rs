//! The forge contract the dispatcher consumes.
//!
//! Forge bindings live outside the dispatch core; this module only states
//! what the core needs from them. Every call may fail transiently and no two
//! calls are assumed to observe a consistent snapshot of the forge.
//!
//! The octocrab-backed implementation lives in [`crate::github`]; tests use
//! `RecordingForge` from the test utilities.

mod error;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::events::{CommentScope, Event, EventKind, ProjectHandle};
use crate::types::{CommentId, PrNumber, Sha};

pub use error::{ForgeError, ForgeErrorKind};

/// An actor's permission on a project, ordered from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    None,
    Read,
    Triage,
    Write,
    Maintain,
    Admin,
}

impl PermissionLevel {
    /// Parses a forge role name; unknown names grant nothing.
    pub fn from_role(role: &str) -> Self {
        match role {
            "admin" | "owner" => PermissionLevel::Admin,
            "maintain" | "maintainer" => PermissionLevel::Maintain,
            "write" | "push" | "developer" | "commit" => PermissionLevel::Write,
            "triage" => PermissionLevel::Triage,
            "read" | "pull" | "reporter" | "ticket" => PermissionLevel::Read,
            _ => PermissionLevel::None,
        }
    }
}

/// State of a commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Pending,
    Running,
    Success,
    Failure,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Running => "running",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A commit status as reported to the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub state: CommitState,
    pub description: String,
    pub context: String,
    pub target_url: Option<String>,
}

impl CommitStatus {
    pub fn new(state: CommitState, description: impl Into<String>, context: impl Into<String>) -> Self {
        CommitStatus {
            state,
            description: description.into(),
            context: context.into(),
            target_url: None,
        }
    }

    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }
}

/// Where a comment is posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "on", rename_all = "snake_case")]
pub enum CommentTarget {
    PullRequest { number: PrNumber },
    Issue { number: u64 },
    Commit { sha: Sha },
}

impl CommentTarget {
    /// Where feedback about an event is posted.
    ///
    /// Comments answer in place; other events fall back to their pull
    /// request, then to their commit. `None` when neither is known.
    pub fn for_event(event: &Event) -> Option<Self> {
        if let EventKind::Comment(c) = event.kind() {
            match c.scope {
                CommentScope::PullRequest { number }
                | CommentScope::DistGitPullRequest { number } => {
                    return Some(CommentTarget::PullRequest { number });
                }
                CommentScope::Issue { number } => return Some(CommentTarget::Issue { number }),
                CommentScope::Commit => {}
            }
        }
        if let Some(number) = event.pull_request() {
            return Some(CommentTarget::PullRequest { number });
        }
        event
            .commit_sha()
            .map(|sha| CommentTarget::Commit { sha: sha.clone() })
    }
}

impl fmt::Display for CommentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentTarget::PullRequest { number } => write!(f, "PR {}", number),
            CommentTarget::Issue { number } => write!(f, "issue #{}", number),
            CommentTarget::Commit { sha } => write!(f, "commit {}", sha.short()),
        }
    }
}

/// Operations the dispatcher needs from a forge.
///
/// All calls are bounded in time by the implementation.
pub trait Forge: Send + Sync {
    /// The permission `actor` holds on the project.
    fn permission_level(
        &self,
        project: &ProjectHandle,
        actor: &str,
    ) -> impl Future<Output = Result<PermissionLevel, ForgeError>> + Send;

    /// Labels currently on a pull request.
    fn pull_request_labels(
        &self,
        project: &ProjectHandle,
        pr: PrNumber,
    ) -> impl Future<Output = Result<Vec<String>, ForgeError>> + Send;

    fn comment(
        &self,
        project: &ProjectHandle,
        target: &CommentTarget,
        body: &str,
    ) -> impl Future<Output = Result<(), ForgeError>> + Send;

    fn set_commit_status(
        &self,
        project: &ProjectHandle,
        sha: &Sha,
        status: &CommitStatus,
    ) -> impl Future<Output = Result<(), ForgeError>> + Send;

    /// Adds a reaction (e.g. `eyes`) to a comment.
    fn add_reaction(
        &self,
        project: &ProjectHandle,
        comment: CommentId,
        reaction: &str,
    ) -> impl Future<Output = Result<(), ForgeError>> + Send;
}
