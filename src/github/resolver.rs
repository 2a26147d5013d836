//! Project and job-configuration lookup on GitHub.
//!
//! The configuration is read from `.packit.json` at the event's commit (or
//! the default branch). The file holds the already-normalized job list; the
//! richer user-facing configuration format is converted before it is
//! committed there.

use tracing::{debug, instrument};

use crate::events::{ConfigResolver, ProjectHandle, ResolveError};
use crate::jobs::PackagesConfig;
use crate::types::{ProjectUrl, Sha};

use super::GitHubForge;

/// Path of the configuration file inside the repository.
pub const CONFIG_FILE: &str = ".packit.json";

/// [`ConfigResolver`] backed by the GitHub API.
#[derive(Debug, Clone)]
pub struct GitHubConfigResolver {
    forge: GitHubForge,
}

impl GitHubConfigResolver {
    pub fn new(forge: GitHubForge) -> Self {
        GitHubConfigResolver { forge }
    }
}

/// Parses the configuration file contents.
pub fn parse_packages_config(raw: &str) -> Result<PackagesConfig, ResolveError> {
    serde_json::from_str(raw).map_err(|e| ResolveError::Config(format!("{}: {}", CONFIG_FILE, e)))
}

impl ConfigResolver for GitHubConfigResolver {
    #[instrument(skip(self), fields(url = %url))]
    async fn resolve_project(&self, url: &ProjectUrl) -> Result<ProjectHandle, ResolveError> {
        let repo = url
            .repo_id()
            .ok_or_else(|| ResolveError::InvalidProjectUrl(url.clone()))?;
        let (client, owner, name) = (self.forge.inner(), repo.owner.as_str(), repo.repo.as_str());

        let fetched = self
            .forge
            .call("resolve_project", move || async move {
                client.repos(owner, name).get().await
            })
            .await
            .map_err(|e| ResolveError::Project(e.to_string()))?;

        let is_private = fetched.private.unwrap_or(false);
        debug!(is_private, "resolved project");
        Ok(ProjectHandle {
            url: url.clone(),
            repo,
            is_private,
        })
    }

    #[instrument(skip(self, project), fields(repo = %project.repo))]
    async fn load_packages_config(
        &self,
        project: &ProjectHandle,
        commit: Option<&Sha>,
    ) -> Result<Option<PackagesConfig>, ResolveError> {
        let client = self.forge.inner();
        let (owner, name) = (project.repo.owner.as_str(), project.repo.repo.as_str());
        let reference = commit.map(Sha::as_str);

        let fetched = self
            .forge
            .call("load_packages_config", move || async move {
                let repos = client.repos(owner, name);
                let request = repos.get_content().path(CONFIG_FILE);
                match reference {
                    Some(r) => request.r#ref(r).send().await,
                    None => request.send().await,
                }
            })
            .await;

        let items = match fetched {
            Ok(items) => items,
            Err(e) if e.status_code == Some(404) => {
                debug!("no configuration file");
                return Ok(None);
            }
            Err(e) => return Err(ResolveError::Config(e.to_string())),
        };

        let raw = items
            .items
            .first()
            .and_then(|item| item.decoded_content())
            .ok_or_else(|| ResolveError::Config(format!("{} has no content", CONFIG_FILE)))?;
        parse_packages_config(&raw).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobType, TriggerKind};

    #[test]
    fn normalized_configuration_parses() {
        let raw = r#"{
            "packages": [{"name": "ogr", "downstream_package_name": "python-ogr"}],
            "jobs": [
                {"job": "copr_build", "trigger": "pull_request", "package": "ogr"},
                {"job": "tests", "trigger": "pull_request", "package": "ogr",
                 "identifier": "fedora", "require_labels": {"absent": ["wip"]}}
            ]
        }"#;

        let config = parse_packages_config(raw).unwrap();
        assert_eq!(config.packages[0].downstream_name(), "python-ogr");
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].job_type, JobType::CoprBuild);
        assert_eq!(config.jobs[1].trigger, TriggerKind::PullRequest);
        assert_eq!(config.jobs[1].labels.absent, vec!["wip".to_string()]);
    }

    #[test]
    fn malformed_configuration_names_the_file() {
        let err = parse_packages_config("{\"jobs\": 3}").unwrap_err();
        assert!(matches!(&err, ResolveError::Config(msg) if msg.contains(CONFIG_FILE)));
    }
}
