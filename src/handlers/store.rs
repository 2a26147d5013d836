//! Persistent build/test status, as far as handlers need it.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::ReportedStatus;
use crate::types::{BuildId, PrNumber, ProjectUrl, Sha};

/// Lifecycle state of a build or test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Pending,
    Running,
    Success,
    Failure,
    Error,
    Cancelled,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildState::Success | BuildState::Failure | BuildState::Error | BuildState::Cancelled
        )
    }

    /// The final state a reported status moves a run to; `None` for
    /// in-flight reports.
    pub fn finished_from(status: ReportedStatus) -> Option<Self> {
        match status {
            ReportedStatus::Running => None,
            ReportedStatus::Success => Some(BuildState::Success),
            ReportedStatus::Failure => Some(BuildState::Failure),
            ReportedStatus::Error => Some(BuildState::Error),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::Pending => "pending",
            BuildState::Running => "running",
            BuildState::Success => "success",
            BuildState::Failure => "failure",
            BuildState::Error => "error",
            BuildState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stored run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    #[default]
    Build,
    TestRun,
}

/// A stored build or test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: BuildId,
    #[serde(default)]
    pub kind: RunKind,
    pub project_url: ProjectUrl,
    pub pull_request: Option<PrNumber>,
    pub commit_sha: Option<Sha>,
    /// Build target / chroot.
    pub target: Option<String>,
    pub state: BuildState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set once a follow-up of the finished run (tests after a build) has
    /// been claimed.
    #[serde(default)]
    pub follow_up_claimed: bool,
}

impl BuildRecord {
    pub fn pending(id: BuildId, project_url: ProjectUrl) -> Self {
        BuildRecord {
            id,
            kind: RunKind::Build,
            project_url,
            pull_request: None,
            commit_sha: None,
            target: None,
            state: BuildState::Pending,
            started_at: None,
            finished_at: None,
            follow_up_claimed: false,
        }
    }

    /// A pending test run.
    pub fn test_run(id: BuildId, project_url: ProjectUrl) -> Self {
        BuildRecord {
            kind: RunKind::TestRun,
            ..BuildRecord::pending(id, project_url)
        }
    }

    pub fn with_pull_request(mut self, pr: PrNumber) -> Self {
        self.pull_request = Some(pr);
        self
    }

    pub fn with_commit_sha(mut self, sha: Sha) -> Self {
        self.commit_sha = Some(sha);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_state(mut self, state: BuildState) -> Self {
        self.state = state;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("build store unavailable: {0}")]
    Unavailable(String),

    #[error("build {0} is not stored")]
    Missing(BuildId),
}

/// Read/write access to stored runs.
///
/// The store is the only state workers share. Redelivered notifications may
/// race each other, so finishing a run and claiming its follow-up are
/// compare-and-set operations: exactly one caller wins.
pub trait BuildStore: Send + Sync {
    fn get(&self, id: BuildId) -> impl Future<Output = Result<Option<BuildRecord>, StoreError>> + Send;

    fn insert(&self, record: BuildRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn record_start(
        &self,
        id: BuildId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Moves a run to `state`; terminal states also record `at` as the
    /// finish time.
    fn transition(
        &self,
        id: BuildId,
        state: BuildState,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Moves a non-terminal run to the terminal `state`, recording `at`.
    /// Returns `false`, writing nothing, when the run already finished.
    fn finish(
        &self,
        id: BuildId,
        state: BuildState,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Claims the follow-up of a run. Returns `false` when it was already
    /// claimed.
    fn claim_follow_up(&self, id: BuildId) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Gives a claimed follow-up back so a retry can start it.
    fn release_follow_up(&self, id: BuildId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Non-terminal builds (not test runs) of a project, optionally limited
    /// to one pull request.
    fn running_builds(
        &self,
        project: &ProjectUrl,
        pull_request: Option<PrNumber>,
    ) -> impl Future<Output = Result<Vec<BuildRecord>, StoreError>> + Send;
}
