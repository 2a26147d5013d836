//! Repository job configuration as seen by the dispatcher.
//!
//! Parsing the repository configuration file happens elsewhere; this module
//! only models its result: an ordered list of [`JobDefinition`] views (one
//! per job and package) plus the per-package settings they refer to.
//!
//! Job definitions are never mutated after loading. Two definitions that are
//! structurally equal describe the same unit of work, and two definitions
//! that differ only in their trigger describe the same work started from
//! different places (see [`JobDefinition::same_except_trigger`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Owner of custom build projects that name no owner.
const DEFAULT_BUILD_OWNER: &str = "packit";

/// The kind of automation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// RPM build in the package build service.
    CoprBuild,
    /// Tests in the test farm (require a build unless `skip_build`).
    Tests,
    /// Upstream scratch build in the downstream build system.
    UpstreamKojiBuild,
    /// Open dist-git pull requests for a new upstream release.
    ProposeDownstream,
    /// Same as `ProposeDownstream`, but driven from dist-git.
    PullFromUpstream,
    /// Downstream production build.
    KojiBuild,
    /// Reaction to a build being tagged into a side tag.
    KojiBuildTag,
    /// Create an update in the update system.
    BodhiUpdate,
    /// Build a VM image.
    VmImageBuild,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CoprBuild => "copr_build",
            JobType::Tests => "tests",
            JobType::UpstreamKojiBuild => "upstream_koji_build",
            JobType::ProposeDownstream => "propose_downstream",
            JobType::PullFromUpstream => "pull_from_upstream",
            JobType::KojiBuild => "koji_build",
            JobType::KojiBuildTag => "koji_build_tag",
            JobType::BodhiUpdate => "bodhi_update",
            JobType::VmImageBuild => "vm_image_build",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What makes an event eligible to match a job.
///
/// Jobs declare the trigger they run on; events report the trigger they
/// represent via [`crate::events::Event::trigger_kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    PullRequest,
    Commit,
    Release,
    KojiBuild,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::PullRequest => "pull_request",
            TriggerKind::Commit => "commit",
            TriggerKind::Release => "release",
            TriggerKind::KojiBuild => "koji_build",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label predicates a pull-request job places on its pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelRequirement {
    /// At least one of these must be on the pull request (if non-empty).
    #[serde(default)]
    pub present: Vec<String>,

    /// None of these may be on the pull request.
    #[serde(default)]
    pub absent: Vec<String>,
}

impl LabelRequirement {
    /// Returns true if the job declares no label predicates at all.
    pub fn is_empty(&self) -> bool {
        self.present.is_empty() && self.absent.is_empty()
    }

    /// Checks the predicates against the labels currently on a pull request.
    pub fn is_satisfied_by<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        let has = |wanted: &String| labels.iter().any(|l| l.as_ref() == wanted);

        let present_ok = self.present.is_empty() || self.present.iter().any(has);
        let absent_ok = !self.absent.iter().any(has);
        present_ok && absent_ok
    }
}

/// One configured automation unit, viewed for a single package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(rename = "job")]
    pub job_type: JobType,

    pub trigger: TriggerKind,

    /// The package (from the repository configuration) this view belongs to.
    pub package: String,

    /// Distinguishes several jobs of the same type and trigger; also used to
    /// match check-rerun requests.
    #[serde(default)]
    pub identifier: Option<String>,

    #[serde(default, rename = "require_labels")]
    pub labels: LabelRequirement,

    /// Only run when explicitly requested (comment, check rerun) or as the
    /// reaction to a result.
    #[serde(default)]
    pub manual_trigger: bool,

    #[serde(default)]
    pub sidetag_group: Option<String>,

    #[serde(default)]
    pub targets: Vec<String>,

    /// Owner of a custom build project; the service's own account when unset.
    #[serde(default, rename = "owner")]
    pub build_owner: Option<String>,

    /// A custom build project instead of the per-PR default one.
    #[serde(default, rename = "project")]
    pub build_project: Option<String>,
}

impl JobDefinition {
    /// Creates a job with no identifier, labels, targets or flags.
    pub fn new(job_type: JobType, trigger: TriggerKind, package: impl Into<String>) -> Self {
        JobDefinition {
            job_type,
            trigger,
            package: package.into(),
            identifier: None,
            labels: LabelRequirement::default(),
            manual_trigger: false,
            sidetag_group: None,
            targets: Vec::new(),
            build_owner: None,
            build_project: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_labels(mut self, labels: LabelRequirement) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_manual_trigger(mut self) -> Self {
        self.manual_trigger = true;
        self
    }

    pub fn with_sidetag_group(mut self, group: impl Into<String>) -> Self {
        self.sidetag_group = Some(group.into());
        self
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_build_project(mut self, owner: impl Into<String>, project: impl Into<String>) -> Self {
        self.build_owner = Some(owner.into());
        self.build_project = Some(project.into());
        self
    }

    /// `owner/project` of the custom build project the job names, if any.
    pub fn custom_build_project(&self) -> Option<String> {
        let project = self.build_project.as_deref()?;
        let owner = self.build_owner.as_deref().unwrap_or(DEFAULT_BUILD_OWNER);
        Some(format!("{}/{}", owner, project))
    }

    /// Structural equality ignoring `trigger`.
    pub fn same_except_trigger(&self, other: &JobDefinition) -> bool {
        let JobDefinition {
            job_type,
            trigger: _,
            package,
            identifier,
            labels,
            manual_trigger,
            sidetag_group,
            targets,
            build_owner,
            build_project,
        } = self;

        *job_type == other.job_type
            && *package == other.package
            && *identifier == other.identifier
            && *labels == other.labels
            && *manual_trigger == other.manual_trigger
            && *sidetag_group == other.sidetag_group
            && *targets == other.targets
            && *build_owner == other.build_owner
            && *build_project == other.build_project
    }
}

impl fmt::Display for JobDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.job_type, self.trigger, self.package)?;
        if let Some(identifier) = &self.identifier {
            write!(f, ":{}", identifier)?;
        }
        Ok(())
    }
}

/// Per-package settings from the repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub name: String,

    /// Name of the package in the downstream distribution, if different.
    #[serde(default)]
    pub downstream_package_name: Option<String>,
}

impl PackageConfig {
    pub fn new(name: impl Into<String>) -> Self {
        PackageConfig {
            name: name.into(),
            downstream_package_name: None,
        }
    }

    pub fn with_downstream_name(mut self, name: impl Into<String>) -> Self {
        self.downstream_package_name = Some(name.into());
        self
    }

    /// The downstream identity of the package (falls back to its own name).
    pub fn downstream_name(&self) -> &str {
        self.downstream_package_name.as_deref().unwrap_or(&self.name)
    }
}

/// The resolved configuration of one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagesConfig {
    /// Packages in configuration order.
    pub packages: Vec<PackageConfig>,

    /// Job views in configuration order.
    pub jobs: Vec<JobDefinition>,
}

impl PackagesConfig {
    pub fn new(packages: Vec<PackageConfig>, jobs: Vec<JobDefinition>) -> Self {
        PackagesConfig { packages, jobs }
    }

    /// The ordered job views.
    pub fn job_views(&self) -> &[JobDefinition] {
        &self.jobs
    }

    /// The package configuration a job view refers to.
    pub fn package_config_for(&self, job: &JobDefinition) -> Option<&PackageConfig> {
        self.packages.iter().find(|p| p.name == job.package)
    }

    /// The first package (in configuration order) with the given downstream name.
    pub fn package_by_downstream_name(&self, name: &str) -> Option<&PackageConfig> {
        self.packages.iter().find(|p| p.downstream_name() == name)
    }

    /// The downstream identity of the package a job belongs to.
    pub fn downstream_name_for<'a>(&'a self, job: &'a JobDefinition) -> &'a str {
        self.package_config_for(job)
            .map(PackageConfig::downstream_name)
            .unwrap_or(&job.package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_job_definition, arb_label};
    use proptest::prelude::*;

    fn labels(present: &[&str], absent: &[&str]) -> LabelRequirement {
        LabelRequirement {
            present: present.iter().map(|s| s.to_string()).collect(),
            absent: absent.iter().map(|s| s.to_string()).collect(),
        }
    }

    // ─── Label predicates ─────────────────────────────────────────────────────

    #[test]
    fn empty_requirement_is_always_satisfied() {
        let req = LabelRequirement::default();
        assert!(req.is_empty());
        assert!(req.is_satisfied_by::<&str>(&[]));
        assert!(req.is_satisfied_by(&["wip", "anything"]));
    }

    #[test]
    fn absent_label_excludes_when_present_on_pr() {
        let req = labels(&[], &["wip"]);
        assert!(!req.is_satisfied_by(&["wip"]));
        assert!(!req.is_satisfied_by(&["bug", "wip"]));
        assert!(req.is_satisfied_by(&["bug"]));
        assert!(req.is_satisfied_by::<&str>(&[]));
    }

    #[test]
    fn present_labels_need_at_least_one_match() {
        let req = labels(&["build", "ready"], &[]);
        assert!(req.is_satisfied_by(&["ready"]));
        assert!(req.is_satisfied_by(&["build", "other"]));
        assert!(!req.is_satisfied_by(&["other"]));
        assert!(!req.is_satisfied_by::<&str>(&[]));
    }

    #[test]
    fn present_and_absent_combine() {
        let req = labels(&["build"], &["wip"]);
        assert!(req.is_satisfied_by(&["build"]));
        assert!(!req.is_satisfied_by(&["build", "wip"]));
        assert!(!req.is_satisfied_by(&["wip"]));
    }

    proptest! {
        /// An absent-label predicate decides on that label alone.
        #[test]
        fn absent_label_law(
            label in arb_label(),
            others in prop::collection::vec(arb_label(), 0..5),
        ) {
            let req = LabelRequirement { present: vec![], absent: vec![label.clone()] };
            let without: Vec<String> = others.iter().filter(|l| **l != label).cloned().collect();
            let mut with = without.clone();
            with.push(label);

            prop_assert!(req.is_satisfied_by(&without));
            prop_assert!(!req.is_satisfied_by(&with));
        }
    }

    // ─── Job identity ─────────────────────────────────────────────────────────

    #[test]
    fn trigger_is_ignored_by_same_except_trigger() {
        let a = JobDefinition::new(JobType::KojiBuild, TriggerKind::Commit, "pkg");
        let b = JobDefinition::new(JobType::KojiBuild, TriggerKind::KojiBuild, "pkg");
        assert_ne!(a, b);
        assert!(a.same_except_trigger(&b));
    }

    #[test]
    fn other_fields_are_not_ignored() {
        let a = JobDefinition::new(JobType::KojiBuild, TriggerKind::Commit, "pkg");
        assert!(!a.same_except_trigger(&a.clone().with_sidetag_group("f40")));
        assert!(!a.same_except_trigger(&a.clone().with_identifier("x")));
        assert!(!a.same_except_trigger(&a.clone().with_targets(["fedora-rawhide"])));
        let other_pkg = JobDefinition::new(JobType::KojiBuild, TriggerKind::Commit, "other");
        assert!(!a.same_except_trigger(&other_pkg));
    }

    proptest! {
        #[test]
        fn equality_implies_same_except_trigger(job in arb_job_definition()) {
            prop_assert!(job.same_except_trigger(&job.clone()));
        }
    }

    #[test]
    fn job_definition_deserializes_with_defaults() {
        let job: JobDefinition = serde_json::from_str(
            r#"{"job": "copr_build", "trigger": "pull_request", "package": "ogr"}"#,
        )
        .unwrap();
        assert_eq!(
            job,
            JobDefinition::new(JobType::CoprBuild, TriggerKind::PullRequest, "ogr")
        );
    }

    #[test]
    fn display_includes_identifier() {
        let job = JobDefinition::new(JobType::Tests, TriggerKind::PullRequest, "ogr")
            .with_identifier("fedora");
        assert_eq!(job.to_string(), "tests[pull_request]@ogr:fedora");
    }

    // ─── Package lookups ──────────────────────────────────────────────────────

    #[test]
    fn downstream_name_falls_back_to_package_name() {
        let config = PackagesConfig::new(
            vec![
                PackageConfig::new("python-ogr").with_downstream_name("ogr"),
                PackageConfig::new("packit"),
            ],
            vec![],
        );
        assert_eq!(
            config.package_by_downstream_name("ogr").map(|p| p.name.as_str()),
            Some("python-ogr")
        );
        assert_eq!(
            config.package_by_downstream_name("packit").map(|p| p.name.as_str()),
            Some("packit")
        );
        assert!(config.package_by_downstream_name("python-ogr").is_none());
    }

    #[test]
    fn downstream_name_for_unknown_package_is_the_job_package() {
        let config = PackagesConfig::new(
            vec![PackageConfig::new("python-ogr").with_downstream_name("ogr")],
            vec![],
        );
        let known = JobDefinition::new(JobType::KojiBuild, TriggerKind::Commit, "python-ogr");
        let unknown = JobDefinition::new(JobType::KojiBuild, TriggerKind::Commit, "packit");
        assert_eq!(config.downstream_name_for(&known), "ogr");
        assert_eq!(config.downstream_name_for(&unknown), "packit");
    }

    #[test]
    fn custom_build_project_defaults_owner() {
        let job = JobDefinition::new(JobType::CoprBuild, TriggerKind::PullRequest, "ogr");
        assert_eq!(job.custom_build_project(), None);

        let mut ownerless = job.clone();
        ownerless.build_project = Some("nightly".into());
        assert_eq!(ownerless.custom_build_project().as_deref(), Some("packit/nightly"));

        let custom = job.with_build_project("alice", "nightly");
        assert_eq!(custom.custom_build_project().as_deref(), Some("alice/nightly"));

        let parsed: JobDefinition = serde_json::from_str(
            r#"{"job": "copr_build", "trigger": "pull_request", "package": "ogr", "project": "nightly"}"#,
        )
        .unwrap();
        assert_eq!(parsed.custom_build_project().as_deref(), Some("packit/nightly"));
    }

    #[test]
    fn first_package_wins_for_shared_downstream_name() {
        let config = PackagesConfig::new(
            vec![
                PackageConfig::new("a").with_downstream_name("shared"),
                PackageConfig::new("b").with_downstream_name("shared"),
            ],
            vec![],
        );
        assert_eq!(
            config.package_by_downstream_name("shared").map(|p| p.name.as_str()),
            Some("a")
        );
    }
}
