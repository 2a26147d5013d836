//! Shared test utilities: event builders, recording test doubles and
//! arbitrary generators for property-based testing.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use crate::checker::Admission;
use crate::dispatch::{BackendError, ExecutionBackend, Signature, TaskSignature};
use crate::events::{
    CheckRerunEvent, CommentEvent, CommentScope, ConfigResolver, Event, EventKind, ForgeKind,
    PrAction, ProjectHandle, PullRequestActionEvent, PushEvent, ReportedStatus, ResolveError,
    ResultEvent, ResultKind,
};
use crate::forge::{CommentTarget, CommitStatus, Forge, ForgeError, PermissionLevel};
use crate::handlers::{
    BuildExecutor, BuildRecord, BuildState, BuildStore, ExecutorError, RunKind, StoreError,
};
use crate::jobs::{
    JobDefinition, JobType, LabelRequirement, PackageConfig, PackagesConfig, TriggerKind,
};
use crate::metrics::Metrics;
use crate::registry::{HandlerKind, Registry};
use crate::types::{BuildId, CommentId, PrNumber, ProjectUrl, RepoId, Sha};

// ─── Generators ───

pub fn arb_label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,11}".prop_map(String::from)
}

pub fn arb_job_type() -> impl Strategy<Value = JobType> {
    prop_oneof![
        Just(JobType::CoprBuild),
        Just(JobType::Tests),
        Just(JobType::UpstreamKojiBuild),
        Just(JobType::ProposeDownstream),
        Just(JobType::PullFromUpstream),
        Just(JobType::KojiBuild),
        Just(JobType::BodhiUpdate),
        Just(JobType::VmImageBuild),
    ]
}

pub fn arb_trigger() -> impl Strategy<Value = TriggerKind> {
    prop_oneof![
        Just(TriggerKind::PullRequest),
        Just(TriggerKind::Commit),
        Just(TriggerKind::Release),
        Just(TriggerKind::KojiBuild),
    ]
}

pub fn arb_label_requirement() -> impl Strategy<Value = LabelRequirement> {
    (
        prop::collection::vec(arb_label(), 0..2),
        prop::collection::vec(arb_label(), 0..2),
    )
        .prop_map(|(present, absent)| LabelRequirement { present, absent })
}

pub fn arb_job_definition() -> impl Strategy<Value = JobDefinition> {
    (
        arb_job_type(),
        arb_trigger(),
        prop_oneof![Just("ogr"), Just("packit")],
        prop::option::of(prop_oneof![Just("fedora"), Just("centos")]),
        arb_label_requirement(),
        any::<bool>(),
    )
        .prop_map(|(job_type, trigger, package, identifier, labels, manual)| {
            let mut job = JobDefinition::new(job_type, trigger, package).with_labels(labels);
            if let Some(identifier) = identifier {
                job = job.with_identifier(identifier);
            }
            if manual {
                job = job.with_manual_trigger();
            }
            job
        })
}

// ─── Fixtures ───

/// A UTC timestamp `secs` seconds after the epoch.
pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn project_url() -> ProjectUrl {
    ProjectUrl::new("https://github.com/packit/ogr")
}

fn dist_git_url() -> ProjectUrl {
    ProjectUrl::new("https://src.fedoraproject.org/rpms/ogr")
}

pub fn test_sha() -> Sha {
    Sha::new("0123456789abcdef0123456789abcdef01234567")
}

/// The `github.com/packit/ogr` project.
pub fn project_handle(is_private: bool) -> ProjectHandle {
    ProjectHandle {
        url: project_url(),
        repo: RepoId::new("packit", "ogr"),
        is_private,
    }
}

pub fn admit(handler: HandlerKind, job: JobDefinition) -> Admission {
    Admission::for_test(handler, job)
}

/// A private metrics instance that lives for the rest of the test run.
pub fn leaked_metrics() -> &'static Metrics {
    Box::leak(Box::new(Metrics::new()))
}

pub fn standard_registry() -> Arc<Registry> {
    Arc::new(Registry::standard().unwrap())
}

// ─── Event builders ───

/// A comment on `packit/ogr` (or its dist-git repository for dist-git
/// scopes), carrying a commit and no actor.
pub fn comment_event(body: &str, scope: CommentScope) -> Event {
    let (forge, url) = match scope {
        CommentScope::DistGitPullRequest { .. } => (ForgeKind::Pagure, dist_git_url()),
        _ => (ForgeKind::GitHub, project_url()),
    };
    Event::new(
        EventKind::Comment(CommentEvent {
            comment_id: CommentId(1001),
            body: body.to_string(),
            scope,
        }),
        forge,
        url,
        ts(1_700_000_000),
    )
    .with_commit_sha(test_sha())
}

/// An opened pull request without actor, commit or labels.
pub fn pr_action_event(number: PrNumber) -> Event {
    Event::new(
        EventKind::PullRequestAction(PullRequestActionEvent {
            number,
            action: PrAction::Opened,
            target_branch: Some("main".to_string()),
        }),
        ForgeKind::GitHub,
        project_url(),
        ts(1_700_000_000),
    )
}

pub fn push_event(git_ref: &str) -> Event {
    Event::new(
        EventKind::Push(PushEvent {
            git_ref: git_ref.to_string(),
        }),
        ForgeKind::GitHub,
        project_url(),
        ts(1_700_000_000),
    )
    .with_commit_sha(test_sha())
}

/// A re-run request for a pull-request check of PR #1.
pub fn check_rerun_event(check_name_job: &str, identifier: Option<&str>) -> Event {
    Event::new(
        EventKind::CheckRerun(CheckRerunEvent {
            check_name_job: check_name_job.to_string(),
            identifier: identifier.map(String::from),
            trigger: TriggerKind::PullRequest,
            pull_request: Some(PrNumber(1)),
        }),
        ForgeKind::GitHub,
        project_url(),
        ts(1_700_000_000),
    )
    .with_commit_sha(test_sha())
}

/// A rerun of a check reported on a release (tag) commit.
pub fn release_check_rerun_event(check_name_job: &str) -> Event {
    Event::new(
        EventKind::CheckRerun(CheckRerunEvent {
            check_name_job: check_name_job.to_string(),
            identifier: None,
            trigger: TriggerKind::Release,
            pull_request: None,
        }),
        ForgeKind::GitHub,
        project_url(),
        ts(1_700_000_000),
    )
    .with_commit_sha(test_sha())
}

/// A downstream build of `package` was tagged.
pub fn tag_build_event(package: &str) -> Event {
    Event::new(
        EventKind::Result(ResultEvent {
            result: ResultKind::TagBuild,
            trigger: TriggerKind::KojiBuild,
            build_id: None,
            status: None,
            package: Some(package.to_string()),
            identifier: None,
            target: None,
            pull_request: None,
        }),
        ForgeKind::Bus,
        dist_git_url(),
        ts(1_700_000_000),
    )
}

fn build_result(result: ResultKind, id: u64, package: &str, identifier: Option<&str>) -> Event {
    let status = match result {
        ResultKind::BuildStarted => ReportedStatus::Running,
        _ => ReportedStatus::Success,
    };
    Event::new(
        EventKind::Result(ResultEvent {
            result,
            trigger: TriggerKind::PullRequest,
            build_id: Some(BuildId(id)),
            status: Some(status),
            package: Some(package.to_string()),
            identifier: identifier.map(String::from),
            target: None,
            pull_request: Some(PrNumber(42)),
        }),
        ForgeKind::Bus,
        project_url(),
        ts(1_700_000_100),
    )
    .with_commit_sha(test_sha())
}

/// A successful "build finished" notification for a PR #42 build.
pub fn build_end_event(id: u64, package: &str, identifier: Option<&str>) -> Event {
    build_result(ResultKind::BuildFinished, id, package, identifier)
}

/// A successful "tests finished" notification for test run `id`.
pub fn test_result_event(id: u64) -> Event {
    build_result(ResultKind::TestsFinished, id, "ogr", None)
}

pub fn build_start_event(id: u64) -> Event {
    build_result(ResultKind::BuildStarted, id, "ogr", None)
}

/// The same result notification reporting `status` instead.
pub fn result_with_status(event: Event, status: ReportedStatus) -> Event {
    let mut record = event.to_record();
    if let EventKind::Result(result) = &mut record.kind {
        result.status = Some(status);
    }
    Event::from_record(record)
}

// ─── Resolver ───

/// Resolves every URL to `packit/ogr` with a fixed configuration.
pub struct StaticResolver {
    project: Result<ProjectHandle, ResolveError>,
    config: Option<PackagesConfig>,
    project_calls: AtomicUsize,
    config_calls: AtomicUsize,
}

impl StaticResolver {
    fn new(project: Result<ProjectHandle, ResolveError>, config: Option<PackagesConfig>) -> Self {
        StaticResolver {
            project,
            config,
            project_calls: AtomicUsize::new(0),
            config_calls: AtomicUsize::new(0),
        }
    }

    fn ogr_config(jobs: Vec<JobDefinition>) -> PackagesConfig {
        PackagesConfig::new(vec![PackageConfig::new("ogr")], jobs)
    }

    pub fn public_with_jobs(jobs: Vec<JobDefinition>) -> Self {
        Self::new(Ok(project_handle(false)), Some(Self::ogr_config(jobs)))
    }

    pub fn private_with_jobs(jobs: Vec<JobDefinition>) -> Self {
        Self::new(Ok(project_handle(true)), Some(Self::ogr_config(jobs)))
    }

    pub fn without_config() -> Self {
        Self::new(Ok(project_handle(false)), None)
    }

    /// Project lookups fail with `message`.
    pub fn failing(message: &str) -> Self {
        Self::new(Err(ResolveError::Project(message.to_string())), None)
    }

    pub fn project_calls(&self) -> usize {
        self.project_calls.load(Ordering::SeqCst)
    }

    pub fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }
}

impl ConfigResolver for StaticResolver {
    async fn resolve_project(&self, _url: &ProjectUrl) -> Result<ProjectHandle, ResolveError> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);
        self.project.clone()
    }

    async fn load_packages_config(
        &self,
        _project: &ProjectHandle,
        _commit: Option<&Sha>,
    ) -> Result<Option<PackagesConfig>, ResolveError> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.config.clone())
    }
}

// ─── Forge ───

/// A forge that records every write and answers reads from fixed data.
#[derive(Default)]
pub struct RecordingForge {
    permissions: HashMap<String, PermissionLevel>,
    labels: Vec<String>,
    failing_statuses: bool,
    permission_calls: AtomicUsize,
    comments: Mutex<Vec<(CommentTarget, String)>>,
    statuses: Mutex<Vec<(Sha, CommitStatus)>>,
    reactions: Mutex<Vec<(CommentId, String)>>,
}

impl RecordingForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permission(mut self, actor: &str, level: PermissionLevel) -> Self {
        self.permissions.insert(actor.to_string(), level);
        self
    }

    /// Labels reported for every pull request.
    pub fn with_labels<const N: usize>(mut self, labels: [&str; N]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Every commit-status call fails.
    pub fn with_failing_statuses(mut self) -> Self {
        self.failing_statuses = true;
        self
    }

    pub fn comments(&self) -> Vec<(CommentTarget, String)> {
        self.comments.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<(Sha, CommitStatus)> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn reactions(&self) -> Vec<(CommentId, String)> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn permission_calls(&self) -> usize {
        self.permission_calls.load(Ordering::SeqCst)
    }
}

impl Forge for RecordingForge {
    async fn permission_level(
        &self,
        _project: &ProjectHandle,
        actor: &str,
    ) -> Result<PermissionLevel, ForgeError> {
        self.permission_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .permissions
            .get(actor)
            .copied()
            .unwrap_or(PermissionLevel::None))
    }

    async fn pull_request_labels(
        &self,
        _project: &ProjectHandle,
        _pr: PrNumber,
    ) -> Result<Vec<String>, ForgeError> {
        Ok(self.labels.clone())
    }

    async fn comment(
        &self,
        _project: &ProjectHandle,
        target: &CommentTarget,
        body: &str,
    ) -> Result<(), ForgeError> {
        self.comments
            .lock()
            .unwrap()
            .push((target.clone(), body.to_string()));
        Ok(())
    }

    async fn set_commit_status(
        &self,
        _project: &ProjectHandle,
        sha: &Sha,
        status: &CommitStatus,
    ) -> Result<(), ForgeError> {
        if self.failing_statuses {
            return Err(ForgeError::transient("status API unavailable").with_status(502));
        }
        self.statuses
            .lock()
            .unwrap()
            .push((sha.clone(), status.clone()));
        Ok(())
    }

    async fn add_reaction(
        &self,
        _project: &ProjectHandle,
        comment: CommentId,
        reaction: &str,
    ) -> Result<(), ForgeError> {
        self.reactions
            .lock()
            .unwrap()
            .push((comment, reaction.to_string()));
        Ok(())
    }
}

// ─── Execution backend ───

/// Records submitted groups, or rejects all of them.
#[derive(Default)]
pub struct RecordingBackend {
    rejection: Option<BackendError>,
    groups: Mutex<Vec<Vec<Signature>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(error: BackendError) -> Self {
        RecordingBackend {
            rejection: Some(error),
            groups: Mutex::new(Vec::new()),
        }
    }

    pub fn groups(&self) -> Vec<Vec<Signature>> {
        self.groups.lock().unwrap().clone()
    }
}

impl ExecutionBackend for RecordingBackend {
    async fn submit(&self, group: Vec<Signature>) -> Result<(), BackendError> {
        if let Some(error) = &self.rejection {
            return Err(error.clone());
        }
        self.groups.lock().unwrap().push(group);
        Ok(())
    }
}

// ─── Build store ───

/// An in-memory build store.
#[derive(Default)]
pub struct MemoryBuildStore {
    records: Mutex<BTreeMap<BuildId, BuildRecord>>,
    unavailable: bool,
    failing_inserts: AtomicUsize,
}

impl MemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I: IntoIterator<Item = BuildRecord>>(records: I) -> Self {
        MemoryBuildStore {
            records: Mutex::new(records.into_iter().map(|r| (r.id, r)).collect()),
            ..Self::default()
        }
    }

    /// Every operation fails.
    pub fn unavailable() -> Self {
        MemoryBuildStore {
            unavailable: true,
            ..Self::default()
        }
    }

    /// The next `n` inserts fail; everything else works.
    pub fn failing_inserts(self, n: usize) -> Self {
        self.failing_inserts.store(n, Ordering::SeqCst);
        self
    }

    pub fn get_record(&self, id: BuildId) -> Option<BuildRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn test_runs(&self) -> Vec<BuildRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.kind == RunKind::TestRun)
            .cloned()
            .collect()
    }

    pub fn records(&self) -> Vec<BuildRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    pub fn state(&self, id: BuildId) -> Option<BuildState> {
        self.records.lock().unwrap().get(&id).map(|r| r.state)
    }

    pub fn started_at(&self, id: BuildId) -> Option<DateTime<Utc>> {
        self.records.lock().unwrap().get(&id).and_then(|r| r.started_at)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("database is down".to_string()));
        }
        Ok(())
    }

    fn update(&self, id: BuildId, f: impl FnOnce(&mut BuildRecord)) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        f(record);
        Ok(())
    }
}

impl BuildStore for MemoryBuildStore {
    async fn get(&self, id: BuildId) -> Result<Option<BuildRecord>, StoreError> {
        self.check()?;
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn insert(&self, record: BuildRecord) -> Result<(), StoreError> {
        self.check()?;
        let failing = self
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Unavailable("insert failed".to_string()));
        }
        self.records.lock().unwrap().insert(record.id, record);
        Ok(())
    }

    async fn record_start(&self, id: BuildId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.update(id, |record| record.started_at = Some(at))
    }

    async fn transition(
        &self,
        id: BuildId,
        state: BuildState,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(id, |record| {
            record.state = state;
            if state.is_terminal() {
                record.finished_at = Some(at);
            }
        })
    }

    async fn finish(&self, id: BuildId, state: BuildState, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        if record.state.is_terminal() {
            return Ok(false);
        }
        record.state = state;
        record.finished_at = Some(at);
        Ok(true)
    }

    async fn claim_follow_up(&self, id: BuildId) -> Result<bool, StoreError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        Ok(!std::mem::replace(&mut record.follow_up_claimed, true))
    }

    async fn release_follow_up(&self, id: BuildId) -> Result<(), StoreError> {
        self.update(id, |record| record.follow_up_claimed = false)
    }

    async fn running_builds(
        &self,
        project: &ProjectUrl,
        pull_request: Option<PrNumber>,
    ) -> Result<Vec<BuildRecord>, StoreError> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.kind == RunKind::Build && &r.project_url == project)
            .filter(|r| pull_request.is_none() || r.pull_request == pull_request)
            .filter(|r| !r.state.is_terminal())
            .cloned()
            .collect())
    }
}

// ─── Executor ───

/// Starts builds and test runs with increasing ids from 1000 and fails
/// `run_job` and `start_test_run` calls with the scripted errors, in order,
/// before succeeding.
pub struct ScriptedExecutor {
    failures: Mutex<VecDeque<ExecutorError>>,
    next_id: AtomicU64,
    submitted: AtomicUsize,
    jobs_run: AtomicUsize,
    cancelled: Mutex<Vec<BuildId>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        ScriptedExecutor {
            failures: Mutex::default(),
            next_id: AtomicU64::new(1000),
            submitted: AtomicUsize::new(0),
            jobs_run: AtomicUsize::new(0),
            cancelled: Mutex::default(),
        }
    }

    pub fn failing_jobs<I: IntoIterator<Item = ExecutorError>>(self, errors: I) -> Self {
        self.failures.lock().unwrap().extend(errors);
        self
    }

    /// Builds started so far.
    pub fn submitted_builds(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> Vec<BuildId> {
        self.cancelled.lock().unwrap().clone()
    }

    /// `run_job` and `start_test_run` calls so far, failed ones included.
    pub fn jobs_run(&self) -> usize {
        self.jobs_run.load(Ordering::SeqCst)
    }
}

impl BuildExecutor for ScriptedExecutor {
    async fn submit_build(
        &self,
        task: &TaskSignature,
    ) -> Result<Vec<(BuildId, Option<String>)>, ExecutorError> {
        let targets: Vec<Option<String>> = if task.job().targets.is_empty() {
            vec![None]
        } else {
            task.job().targets.iter().cloned().map(Some).collect()
        };
        let started: Vec<_> = targets
            .into_iter()
            .map(|target| (BuildId(self.next_id.fetch_add(1, Ordering::SeqCst)), target))
            .collect();
        self.submitted.fetch_add(started.len(), Ordering::SeqCst);
        Ok(started)
    }

    async fn cancel_build(&self, id: BuildId) -> Result<(), ExecutorError> {
        self.cancelled.lock().unwrap().push(id);
        Ok(())
    }

    async fn start_test_run(&self, _task: &TaskSignature) -> Result<BuildId, ExecutorError> {
        self.jobs_run.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(BuildId(self.next_id.fetch_add(1, Ordering::SeqCst))),
        }
    }

    async fn run_job(&self, task: &TaskSignature) -> Result<String, ExecutorError> {
        self.jobs_run.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(format!("{} started", task.job())),
        }
    }
}
