//! Octocrab-backed [`Forge`] implementation.
//!
//! Every call is bounded by a timeout and retried in place on transient
//! failures (see [`RetryPolicy::FORGE`]). Errors are classified by
//! [`classify`](super::error::classify).

use std::future::Future;
use std::time::Duration;

use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::events::ProjectHandle;
use crate::forge::{CommentTarget, CommitState, CommitStatus, Forge, ForgeError, PermissionLevel};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::types::{CommentId, PrNumber, Sha};

use super::error::classify;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub API client implementing the forge contract.
#[derive(Clone)]
pub struct GitHubForge {
    client: Octocrab,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GitHubForge {
    pub fn new(client: Octocrab) -> Self {
        GitHubForge {
            client,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::FORGE,
        }
    }

    /// Creates a client authenticated with a personal access token.
    pub fn from_token(token: impl Into<String>) -> Result<Self, octocrab::Error> {
        let client = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self::new(client))
    }

    /// Creates an unauthenticated client (public data only, low rate limit).
    pub fn anonymous() -> Result<Self, octocrab::Error> {
        Ok(Self::new(Octocrab::builder().build()?))
    }

    /// Bounds every single request (not the whole retry loop).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn inner(&self) -> &Octocrab {
        &self.client
    }

    /// Runs one request with timeout, classification and in-place retry.
    pub(crate) async fn call<T, F, Fut>(&self, operation: &'static str, mut request: F) -> Result<T, ForgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, octocrab::Error>>,
    {
        let timeout = self.timeout;
        retry_with_backoff(self.retry, move || {
            let pending = request();
            async move {
                match tokio::time::timeout(timeout, pending).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(classify(operation, e)),
                    Err(_) => Err(ForgeError::timeout(operation, timeout)),
                }
            }
        })
        .await
        .into_result()
    }
}

impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

// ─── Request and response shapes ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    #[serde(default)]
    permission: Option<String>,
    #[serde(default)]
    role_name: Option<String>,
}

impl PermissionResponse {
    /// `role_name` distinguishes maintain/triage; `permission` is the
    /// legacy read/write/admin view.
    fn level(&self) -> PermissionLevel {
        self.role_name
            .as_deref()
            .or(self.permission.as_deref())
            .map(PermissionLevel::from_role)
            .unwrap_or(PermissionLevel::None)
    }
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    state: &'static str,
    description: &'a str,
    context: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
}

#[derive(Serialize)]
struct BodyRequest<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct ReactionRequest<'a> {
    content: &'a str,
}

/// GitHub has no "running" state; in-flight work is reported as pending.
fn github_state(state: CommitState) -> &'static str {
    match state {
        CommitState::Pending | CommitState::Running => "pending",
        CommitState::Success => "success",
        CommitState::Failure => "failure",
        CommitState::Error => "error",
    }
}

// ─── Forge ────────────────────────────────────────────────────────────────────

impl Forge for GitHubForge {
    #[instrument(skip(self, project), fields(repo = %project.repo))]
    async fn permission_level(
        &self,
        project: &ProjectHandle,
        actor: &str,
    ) -> Result<PermissionLevel, ForgeError> {
        let route = format!(
            "/repos/{}/{}/collaborators/{}/permission",
            project.repo.owner, project.repo.repo, actor
        );
        let (client, route) = (&self.client, route.as_str());

        let response: PermissionResponse = self
            .call("permission_level", move || client.get(route, None::<&()>))
            .await?;
        let level = response.level();
        debug!(?level, "resolved permission");
        Ok(level)
    }

    #[instrument(skip(self, project), fields(repo = %project.repo, pr = %pr))]
    async fn pull_request_labels(
        &self,
        project: &ProjectHandle,
        pr: PrNumber,
    ) -> Result<Vec<String>, ForgeError> {
        let route = format!(
            "/repos/{}/{}/issues/{}/labels?per_page=100",
            project.repo.owner, project.repo.repo, pr.0
        );
        let (client, route) = (&self.client, route.as_str());

        let labels: Vec<LabelResponse> = self
            .call("pull_request_labels", move || client.get(route, None::<&()>))
            .await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    #[instrument(skip(self, project, body), fields(repo = %project.repo, target = %target))]
    async fn comment(
        &self,
        project: &ProjectHandle,
        target: &CommentTarget,
        body: &str,
    ) -> Result<(), ForgeError> {
        let (owner, repo) = (project.repo.owner.as_str(), project.repo.repo.as_str());
        let client = &self.client;

        match target {
            CommentTarget::PullRequest { number: PrNumber(number) }
            | CommentTarget::Issue { number } => {
                let number = *number;
                self.call("comment", move || async move {
                    client.issues(owner, repo).create_comment(number, body).await
                })
                .await?;
            }
            CommentTarget::Commit { sha } => {
                let route = format!("/repos/{}/{}/commits/{}/comments", owner, repo, sha);
                let route = route.as_str();
                let request = BodyRequest { body };
                let request = &request;
                let _: serde_json::Value = self
                    .call("commit_comment", move || client.post(route, Some(request)))
                    .await?;
            }
        }
        Ok(())
    }

    #[instrument(
        skip(self, project, status),
        fields(repo = %project.repo, sha = %sha.short(), context = %status.context, state = %status.state)
    )]
    async fn set_commit_status(
        &self,
        project: &ProjectHandle,
        sha: &Sha,
        status: &CommitStatus,
    ) -> Result<(), ForgeError> {
        let route = format!(
            "/repos/{}/{}/statuses/{}",
            project.repo.owner, project.repo.repo, sha
        );
        let request = StatusRequest {
            state: github_state(status.state),
            description: &status.description,
            context: &status.context,
            target_url: status.target_url.as_deref(),
        };
        let (client, route, request) = (&self.client, route.as_str(), &request);

        let _: serde_json::Value = self
            .call("set_commit_status", move || client.post(route, Some(request)))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, project), fields(repo = %project.repo, comment = %comment))]
    async fn add_reaction(
        &self,
        project: &ProjectHandle,
        comment: CommentId,
        reaction: &str,
    ) -> Result<(), ForgeError> {
        let route = format!(
            "/repos/{}/{}/issues/comments/{}/reactions",
            project.repo.owner, project.repo.repo, comment.0
        );
        let request = ReactionRequest { content: reaction };
        let (client, route, request) = (&self.client, route.as_str(), &request);

        let _: serde_json::Value = self
            .call("add_reaction", move || client.post(route, Some(request)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_name_wins_over_legacy_permission() {
        let response: PermissionResponse =
            serde_json::from_value(serde_json::json!({"permission": "write", "role_name": "maintain"}))
                .unwrap();
        assert_eq!(response.level(), PermissionLevel::Maintain);

        let legacy: PermissionResponse =
            serde_json::from_value(serde_json::json!({"permission": "read"})).unwrap();
        assert_eq!(legacy.level(), PermissionLevel::Read);

        let empty: PermissionResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(empty.level(), PermissionLevel::None);
    }

    #[test]
    fn running_is_reported_as_pending() {
        assert_eq!(github_state(CommitState::Running), "pending");
        assert_eq!(github_state(CommitState::Pending), "pending");
        assert_eq!(github_state(CommitState::Failure), "failure");
    }

    #[test]
    fn status_request_omits_missing_url() {
        let request = StatusRequest {
            state: "pending",
            description: "Task was accepted.",
            context: "rpm-build",
            target_url: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["context"], "rpm-build");
        assert!(json.get("target_url").is_none());
    }
}
