//! Service configuration.
//!
//! Defaults suit a production deployment; [`ServiceConfig::from_env`] reads
//! overrides from `PACKIT_*` environment variables:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `PACKIT_COMMENT_PREFIX` | `comment_command_prefix` | `/packit` |
//! | `PACKIT_DEPLOYMENT` | `deployment` | `prod` |
//! | `PACKIT_CANCEL_RUNNING_JOBS` | `cancel_running_builds` | `false` |
//! | `PACKIT_PRIVATE_NAMESPACES` | `enabled_private_namespaces` | empty |
//! | `PACKIT_CUSTOM_BUILD_PROJECTS` | `custom_build_projects` | empty |
//! | `PACKIT_RETRY_LIMIT` | `internal_retry_limit` | 2 |
//! | `PACKIT_RETRY_BACKOFF` | `internal_retry_backoff` (seconds) | 7 |
//! | `PACKIT_RETRY_LIMIT_OUTAGE` | `outage_retry_limit` | 5 |
//! | `PACKIT_RETRY_INTERVAL_OUTAGE_MINS` | `outage_retry_interval` | 1 |
//! | `PACKIT_FORGE_TIMEOUT_SECS` | `forge_timeout` | 30 |
//! | `PACKIT_WORKERS` | `worker_count` | 4 |
//! | `PACKIT_QUEUE_CAPACITY` | `queue_capacity` | 1024 |
//! | `PACKIT_LISTEN_ADDR` | `listen_addr` | `0.0.0.0:8080` |
//! | `GITHUB_TOKEN` | `github_token` | none |
//! | `PACKIT_LOG_JSON` | `log_json` | `false` |
//! | `PACKIT_LOG_LEVEL` | `log_level` | `info` |
//!
//! `PACKIT_CUSTOM_BUILD_PROJECTS` lists which forge projects may build in
//! which custom build projects, as
//! `owner/project=host/ns/repo,host/ns/repo;owner2/project2=...`.
//!
//! Malformed values are reported, not silently replaced by defaults.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::retry::{
    BASE_RETRY_INTERVAL_MINS_FOR_OUTAGES, DEFAULT_RETRY_BACKOFF_SECS, DEFAULT_RETRY_LIMIT,
    DEFAULT_RETRY_LIMIT_OUTAGE, FeedbackThresholds, HandlerRetryPolicy,
};

const DEFAULT_COMMENT_PREFIX: &str = "/packit";
const DEFAULT_FORGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Which deployment this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Prod,
    Stg,
    Dev,
}

impl FromStr for Deployment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prod" => Ok(Deployment::Prod),
            "stg" => Ok(Deployment::Stg),
            "dev" => Ok(Deployment::Dev),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub comment_command_prefix: String,
    pub deployment: Deployment,

    /// Cancel still-running builds for the same target before starting a
    /// new one.
    pub cancel_running_builds: bool,

    /// Private namespaces (`host/namespace`) the service may act in.
    pub enabled_private_namespaces: Vec<String>,

    /// Custom build projects (`owner/project`) and the forge projects
    /// (`host/namespace/repo`) allowed to build in each.
    pub custom_build_projects: BTreeMap<String, Vec<String>>,

    pub internal_retry_limit: u32,
    pub internal_retry_backoff: Duration,
    pub outage_retry_limit: u32,
    pub outage_retry_interval: Duration,

    pub feedback: FeedbackThresholds,
    pub forge_timeout: Duration,

    pub worker_count: usize,
    pub queue_capacity: usize,
    pub listen_addr: SocketAddr,
    pub github_token: Option<String>,

    /// Emit logs as JSON lines.
    pub log_json: bool,
    /// Level for this crate when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            comment_command_prefix: DEFAULT_COMMENT_PREFIX.to_string(),
            deployment: Deployment::Prod,
            cancel_running_builds: false,
            enabled_private_namespaces: Vec::new(),
            custom_build_projects: BTreeMap::new(),
            internal_retry_limit: DEFAULT_RETRY_LIMIT,
            internal_retry_backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
            outage_retry_limit: DEFAULT_RETRY_LIMIT_OUTAGE,
            outage_retry_interval: Duration::from_secs(BASE_RETRY_INTERVAL_MINS_FOR_OUTAGES * 60),
            feedback: FeedbackThresholds::DEFAULT,
            forge_timeout: Duration::from_secs(DEFAULT_FORGE_TIMEOUT_SECS),
            worker_count: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            github_token: None,
            log_json: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup` (the environment, or a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let prefix = lookup("PACKIT_COMMENT_PREFIX")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(defaults.comment_command_prefix);

        let namespaces = lookup("PACKIT_PRIVATE_NAMESPACES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|ns| !ns.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let custom_build_projects = match lookup("PACKIT_CUSTOM_BUILD_PROJECTS") {
            Some(raw) => parse_build_projects(&raw).ok_or(ConfigError::Invalid {
                var: "PACKIT_CUSTOM_BUILD_PROJECTS",
                value: raw,
            })?,
            None => BTreeMap::new(),
        };

        Ok(ServiceConfig {
            comment_command_prefix: prefix,
            deployment: parse(&lookup, "PACKIT_DEPLOYMENT")?.unwrap_or(defaults.deployment),
            cancel_running_builds: parse_flag(&lookup, "PACKIT_CANCEL_RUNNING_JOBS")?
                .unwrap_or(defaults.cancel_running_builds),
            enabled_private_namespaces: namespaces,
            custom_build_projects,
            internal_retry_limit: parse(&lookup, "PACKIT_RETRY_LIMIT")?
                .unwrap_or(defaults.internal_retry_limit),
            internal_retry_backoff: parse(&lookup, "PACKIT_RETRY_BACKOFF")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.internal_retry_backoff),
            outage_retry_limit: parse(&lookup, "PACKIT_RETRY_LIMIT_OUTAGE")?
                .unwrap_or(defaults.outage_retry_limit),
            outage_retry_interval: parse(&lookup, "PACKIT_RETRY_INTERVAL_OUTAGE_MINS")?
                .map(|mins: u64| Duration::from_secs(mins * 60))
                .unwrap_or(defaults.outage_retry_interval),
            feedback: defaults.feedback,
            forge_timeout: parse(&lookup, "PACKIT_FORGE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.forge_timeout),
            worker_count: parse(&lookup, "PACKIT_WORKERS")?
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.worker_count),
            queue_capacity: parse(&lookup, "PACKIT_QUEUE_CAPACITY")?
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.queue_capacity),
            listen_addr: parse(&lookup, "PACKIT_LISTEN_ADDR")?.unwrap_or(defaults.listen_addr),
            github_token: lookup("GITHUB_TOKEN").filter(|t| !t.is_empty()),
            log_json: parse_flag(&lookup, "PACKIT_LOG_JSON")?.unwrap_or(defaults.log_json),
            log_level: lookup("PACKIT_LOG_LEVEL")
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .unwrap_or(defaults.log_level),
        })
    }

    pub fn with_comment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.comment_command_prefix = prefix.into();
        self
    }

    pub fn with_cancel_running_builds(mut self, cancel: bool) -> Self {
        self.cancel_running_builds = cancel;
        self
    }

    pub fn with_private_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_private_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Allows `forge_projects` to build in the custom `project`.
    pub fn with_custom_build_project<I, S>(mut self, project: impl Into<String>, forge_projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_build_projects
            .entry(project.into())
            .or_default()
            .extend(forge_projects.into_iter().map(Into::into));
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackThresholds) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_forge_timeout(mut self, timeout: Duration) -> Self {
        self.forge_timeout = timeout;
        self
    }

    /// The retry policy handlers get unless they declare their own.
    pub fn handler_retry_policy(&self) -> HandlerRetryPolicy {
        HandlerRetryPolicy::configured(
            self.internal_retry_limit,
            self.internal_retry_backoff,
            self.outage_retry_limit,
            self.outage_retry_interval,
        )
    }

    /// Whether the service may act in the given private namespace.
    pub fn private_namespace_enabled(&self, namespace: &str) -> bool {
        self.enabled_private_namespaces.iter().any(|ns| ns == namespace)
    }

    /// Whether `forge_project` may build in the custom build `project`.
    pub fn custom_build_project_allows(&self, project: &str, forge_project: &str) -> bool {
        self.custom_build_projects
            .get(project)
            .is_some_and(|allowed| allowed.iter().any(|p| p == forge_project))
    }
}

/// `None` when any entry lacks a `project=` part or names no project.
fn parse_build_projects(raw: &str) -> Option<BTreeMap<String, Vec<String>>> {
    let mut projects: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (project, allowed) = entry.split_once('=')?;
        let project = project.trim();
        if project.is_empty() || !project.contains('/') {
            return None;
        }
        projects.entry(project.to_string()).or_default().extend(
            allowed
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
        );
    }
    Some(projects)
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(var).as_deref().map(str::trim) {
        None => Ok(None),
        Some("1" | "true" | "yes") => Ok(Some(true)),
        Some("0" | "false" | "no" | "") => Ok(Some(false)),
        Some(other) => Err(ConfigError::Invalid {
            var,
            value: other.to_string(),
        }),
    }
}
