//! Resolution of an event's project and job configuration.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::PackagesConfig;
use crate::types::{ProjectUrl, RepoId, Sha};

/// Why an event's context could not be resolved.
///
/// Cloneable so the memoized failure can be handed out on every access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The project URL does not name a repository.
    #[error("cannot derive a repository from {0}")]
    InvalidProjectUrl(ProjectUrl),

    /// The forge could not be reached or refused the request.
    #[error("project lookup failed: {0}")]
    Project(String),

    /// The configuration exists but could not be loaded or parsed.
    #[error("configuration could not be loaded: {0}")]
    Config(String),
}

/// A resolved project on a forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHandle {
    pub url: ProjectUrl,
    pub repo: RepoId,
    pub is_private: bool,
}

impl ProjectHandle {
    pub fn public(url: ProjectUrl, repo: RepoId) -> Self {
        ProjectHandle {
            url,
            repo,
            is_private: false,
        }
    }

    /// The namespace of the project including the forge host,
    /// e.g. `github.com/packit`.
    pub fn namespace_path(&self) -> String {
        match self.url.host() {
            Some(host) => format!("{}/{}", host, self.repo.owner),
            None => self.repo.owner.clone(),
        }
    }

    /// `host/owner/repo`, the form build-project allowlists use.
    pub fn forge_path(&self) -> String {
        format!("{}/{}", self.namespace_path(), self.repo.repo)
    }
}

/// Looks up projects and their job configuration.
///
/// Implementations talk to forges; the event memoizes whatever they return.
pub trait ConfigResolver: Send + Sync {
    fn resolve_project(
        &self,
        url: &ProjectUrl,
    ) -> impl Future<Output = Result<ProjectHandle, ResolveError>> + Send;

    /// Loads the job configuration at the given commit (or the default branch).
    ///
    /// Returns `Ok(None)` when the repository has no configuration file.
    fn load_packages_config(
        &self,
        project: &ProjectHandle,
        commit: Option<&Sha>,
    ) -> impl Future<Output = Result<Option<PackagesConfig>, ResolveError>> + Send;
}
