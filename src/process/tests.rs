use super::*;
use crate::events::CommentScope;
use crate::forge::{CommitState, PermissionLevel};
use crate::jobs::{JobDefinition, JobType, LabelRequirement, TriggerKind};
use crate::test_utils::{
    RecordingBackend, RecordingForge, StaticResolver, comment_event, leaked_metrics,
    pr_action_event, standard_registry,
};
use crate::types::PrNumber;

type Processor = EventProcessor<StaticResolver, RecordingForge, Arc<RecordingBackend>>;

struct Harness {
    processor: Processor,
    resolver: Arc<StaticResolver>,
    forge: Arc<RecordingForge>,
    backend: Arc<RecordingBackend>,
    metrics: &'static Metrics,
}

fn harness(resolver: StaticResolver, forge: RecordingForge) -> Harness {
    harness_with(ServiceConfig::default(), resolver, forge)
}

fn harness_with(config: ServiceConfig, resolver: StaticResolver, forge: RecordingForge) -> Harness {
    let (resolver, forge) = (Arc::new(resolver), Arc::new(forge));
    let backend = Arc::new(RecordingBackend::new());
    let metrics = leaked_metrics();
    let processor = EventProcessor::new(
        config,
        standard_registry(),
        Arc::clone(&resolver),
        Arc::clone(&forge),
        Arc::clone(&backend),
        metrics,
    );
    Harness {
        processor,
        resolver,
        forge,
        backend,
        metrics,
    }
}

fn pr_build() -> JobDefinition {
    JobDefinition::new(JobType::CoprBuild, TriggerKind::PullRequest, "ogr")
}

fn on_pr(n: u64) -> CommentScope {
    CommentScope::PullRequest {
        number: PrNumber(n),
    }
}

fn maintainer() -> RecordingForge {
    RecordingForge::new().with_permission("maintainer", PermissionLevel::Write)
}

// ─── End to end ───

#[tokio::test]
async fn build_comment_on_pull_request_dispatches_one_build() {
    let h = harness(StaticResolver::public_with_jobs(vec![pr_build()]), maintainer());
    let event = comment_event("/packit build", on_pr(42)).with_actor("maintainer");

    let results = h.processor.process_message(Some(event.to_record())).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].msg(), "Job created.");
    assert_eq!(results[0].details.job_config, Some(pr_build()));

    let statuses = h.forge.statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].1.context, "rpm-build");
    assert_eq!(statuses[0].1.state, CommitState::Pending);

    let groups = h.backend.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 1);
    assert_eq!(groups[0][0].target, "task.run_copr_build_handler");
    assert_eq!(groups[0][0].kwargs["job_config"]["job"], "copr_build");

    assert_eq!(h.forge.reactions().len(), 1);
    assert_eq!(h.metrics.events_processed(), 1);
    assert_eq!(h.metrics.builds_queued(), 1);
    assert_eq!(h.metrics.snapshot().first_initial_status_time.count, 1);
}

#[tokio::test]
async fn duplicated_configuration_still_yields_one_task() {
    let h = harness(
        StaticResolver::public_with_jobs(vec![pr_build(), pr_build()]),
        maintainer(),
    );
    let event = comment_event("/packit build", on_pr(42)).with_actor("maintainer");

    let first = h.processor.process(&event).await;
    assert_eq!(first.len(), 1);
    assert_eq!(h.backend.groups()[0].len(), 1);
}

// ─── Early exits ───

#[tokio::test]
async fn comment_without_command_is_informational() {
    let h = harness(StaticResolver::public_with_jobs(vec![pr_build()]), maintainer());
    let event = comment_event("Looks good to me!\n/packit-stg build", on_pr(42));

    let results = h.processor.process(&event).await;

    assert_eq!(results, vec![TaskResult::new(true, NO_COMMAND)]);
    assert!(h.backend.groups().is_empty());
    assert_eq!(h.resolver.project_calls(), 0);
    assert!(h.forge.reactions().is_empty());
}

#[tokio::test]
async fn unknown_command_is_informational() {
    let h = harness(StaticResolver::public_with_jobs(vec![pr_build()]), maintainer());
    let event = comment_event("/packit dance", on_pr(42));

    let results = h.processor.process(&event).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].msg(), NO_COMMAND);
}

#[tokio::test]
async fn missing_configuration_is_informational() {
    let h = harness(StaticResolver::without_config(), maintainer());

    let results = h.processor.process(&pr_action_event(PrNumber(1))).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].msg(), NO_CONFIG);
    assert!(h.backend.groups().is_empty());
}

#[tokio::test]
async fn resolution_failure_is_a_failed_result() {
    let h = harness(StaticResolver::failing("forge unreachable"), maintainer());

    let results = h.processor.process(&pr_action_event(PrNumber(1))).await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0].msg().contains("forge unreachable"));
}

#[tokio::test]
async fn unrecognized_and_malformed_messages_are_counted() {
    let h = harness(StaticResolver::public_with_jobs(vec![pr_build()]), maintainer());

    assert!(h.processor.process_message(None).await.is_empty());

    let blank = comment_event("   ", on_pr(1));
    assert!(h.processor.process_message(Some(blank.to_record())).await.is_empty());

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.events_processed, 2);
    assert_eq!(snapshot.events_not_handled, 1);
    assert_eq!(snapshot.events_pre_check_failed, 1);
    assert_eq!(h.resolver.project_calls(), 0);
}

#[tokio::test]
async fn jobs_without_reacting_handler_dispatch_nothing() {
    let vm = JobDefinition::new(JobType::VmImageBuild, TriggerKind::PullRequest, "ogr");
    let h = harness(StaticResolver::public_with_jobs(vec![vm]), maintainer());

    let results = h.processor.process(&pr_action_event(PrNumber(1))).await;
    assert!(results.is_empty());
    assert!(h.backend.groups().is_empty());
}

// ─── Labels ───

#[tokio::test]
async fn labels_are_fetched_when_a_job_filters_on_them() {
    let job = pr_build().with_labels(LabelRequirement {
        present: vec![],
        absent: vec!["wip".to_string()],
    });

    let wip = harness(
        StaticResolver::public_with_jobs(vec![job.clone()]),
        RecordingForge::new().with_labels(["wip"]),
    );
    assert!(wip.processor.process(&pr_action_event(PrNumber(1))).await.is_empty());
    assert!(wip.backend.groups().is_empty());

    let ready = harness(
        StaticResolver::public_with_jobs(vec![job]),
        RecordingForge::new().with_labels(["ready"]),
    );
    let results = ready.processor.process(&pr_action_event(PrNumber(1))).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
}

#[tokio::test]
async fn labels_are_not_fetched_without_label_filters() {
    let h = harness(
        StaticResolver::public_with_jobs(vec![pr_build()]),
        RecordingForge::new().with_labels(["wip"]),
    );

    let event = pr_action_event(PrNumber(1));
    h.processor.process(&event).await;
    assert_eq!(event.labels(), None);
}

// ─── Checkers ───

#[tokio::test]
async fn private_projects_outside_enabled_namespaces_are_refused() {
    let h = harness(StaticResolver::private_with_jobs(vec![pr_build()]), maintainer());

    let results = h.processor.process(&pr_action_event(PrNumber(1))).await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0].msg().contains("private"));
    assert!(h.backend.groups().is_empty());
}

#[tokio::test]
async fn enabled_private_namespaces_are_served() {
    let config = ServiceConfig::default().with_private_namespaces(["github.com/packit"]);
    let h = harness_with(config, StaticResolver::private_with_jobs(vec![pr_build()]), maintainer());

    let results = h.processor.process(&pr_action_event(PrNumber(1))).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
}

#[tokio::test]
async fn actors_without_permission_get_an_explanation_and_a_failed_result() {
    let forge = RecordingForge::new().with_permission("visitor", PermissionLevel::Read);
    let h = harness(StaticResolver::public_with_jobs(vec![pr_build()]), forge);
    let event = comment_event("/packit build", on_pr(42)).with_actor("visitor");

    let results = h.processor.process(&event).await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(h.backend.groups().is_empty());
    assert_eq!(h.forge.comments().len(), 1);
}

// ─── Reactions ───

#[tokio::test]
async fn dist_git_comments_get_no_reaction() {
    let koji = JobDefinition::new(JobType::KojiBuild, TriggerKind::Commit, "ogr");
    let h = harness(StaticResolver::public_with_jobs(vec![koji]), maintainer());
    let event = comment_event(
        "/packit koji-build",
        CommentScope::DistGitPullRequest {
            number: PrNumber(3),
        },
    )
    .with_actor("maintainer");

    let results = h.processor.process(&event).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert!(h.forge.reactions().is_empty());
    assert_eq!(
        h.backend.groups()[0][0].target,
        "task.run_retrigger_downstream_koji_build_handler"
    );
}
