//! Event processing.
//!
//! [`EventProcessor`] runs one normalized event through the whole pipeline:
//!
//! ```text
//! EventRecord ─► pre_check ─► comment command ─► project + config
//!             ─► labels ─► match_jobs ─► select_handlers
//!             ─► run_checkers (per handler, job) ─► Dispatcher::create_tasks
//!             ─► acceptance-latency report
//! ```
//!
//! Every event yields a (possibly empty) list of [`TaskResult`]s. Nothing
//! in here returns an error or panics; failures become failed results or
//! log lines.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::checker::{CheckContext, CheckOutcome, Checker, run_checkers};
use crate::commands::parse_command;
use crate::config::ServiceConfig;
use crate::dispatch::{Dispatcher, ExecutionBackend, TaskResult};
use crate::events::{ConfigResolver, Event, EventRecord, EventType, ProjectHandle};
use crate::forge::Forge;
use crate::jobs::PackagesConfig;
use crate::matcher::{jobs_for_handler, match_jobs, requested_handlers, select_handlers};
use crate::metrics::Metrics;
use crate::registry::{HandlerKind, Registry};
use crate::retry::FeedbackTimes;

/// Reaction added to comments that selected at least one handler.
pub const COMMENT_REACTION: &str = "eyes";

pub const NO_COMMAND: &str = "No Packit command found in the comment.";
pub const NO_CONFIG: &str = "No packit config found in the repository.";

/// The event pipeline with its collaborators.
pub struct EventProcessor<R, F, B> {
    config: ServiceConfig,
    registry: Arc<Registry>,
    resolver: Arc<R>,
    forge: Arc<F>,
    dispatcher: Dispatcher<F, B>,
    metrics: &'static Metrics,
}

impl<R, F, B> EventProcessor<R, F, B>
where
    R: ConfigResolver,
    F: Forge,
    B: ExecutionBackend,
{
    pub fn new(
        config: ServiceConfig,
        registry: Arc<Registry>,
        resolver: Arc<R>,
        forge: Arc<F>,
        backend: B,
        metrics: &'static Metrics,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&forge), backend, metrics)
            .with_submit_timeout(config.forge_timeout);
        EventProcessor {
            config,
            registry,
            resolver,
            forge,
            dispatcher,
            metrics,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Processes one inbound message. `None` stands for a payload no parser
    /// recognized.
    #[instrument(skip_all)]
    pub async fn process_message(&self, record: Option<EventRecord>) -> Vec<TaskResult> {
        self.metrics.inc_events_processed();

        let Some(record) = record else {
            self.metrics.inc_events_not_handled();
            debug!("message not handled");
            return Vec::new();
        };

        let event = Event::from_record(record);
        if !event.pre_check() {
            self.metrics.inc_events_pre_check_failed();
            debug!(event = %event, "pre-check failed");
            return Vec::new();
        }

        self.process(&event).await
    }

    /// Matches, checks and dispatches an admitted event.
    #[instrument(skip_all, fields(event = %event, event_type = %event.event_type()))]
    pub async fn process(&self, event: &Event) -> Vec<TaskResult> {
        let event_type = event.event_type();
        if self.registry.handlers_for_event(event_type).is_empty() {
            debug!("no handler reacts to this event type");
            return Vec::new();
        }

        let command = event
            .comment()
            .and_then(|body| parse_command(body, &self.config.comment_command_prefix));
        let requested = requested_handlers(event, &self.registry, command.as_ref());
        if event_type.is_comment() && requested.as_ref().is_some_and(BTreeSet::is_empty) {
            debug!("comment carries no known command");
            return vec![TaskResult::new(true, NO_COMMAND)];
        }

        let project = match event.project(&*self.resolver).await {
            Ok(project) => project,
            Err(e) => {
                warn!(error = %e, "cannot resolve project");
                return vec![TaskResult::create_from(false, e.to_string(), event, None)];
            }
        };
        let packages = match event.packages_config(&*self.resolver).await {
            Ok(Some(packages)) => packages,
            Ok(None) => return vec![TaskResult::create_from(true, NO_CONFIG, event, None)],
            Err(e) => {
                warn!(error = %e, "cannot load job configuration");
                return vec![TaskResult::create_from(false, e.to_string(), event, None)];
            }
        };

        if requested.is_some() && reacts_to_comment(event_type) {
            self.acknowledge_comment(event, project).await;
        }
        self.resolve_labels(event, project, packages).await;

        let matched = match_jobs(event, packages, command.as_ref());
        let handlers = select_handlers(event, &self.registry, &matched, requested.as_ref());
        if handlers.is_empty() {
            debug!("no handler for the matched jobs");
            return Vec::new();
        }

        let mut results = Vec::new();
        let mut admissions = Vec::new();
        for handler in handlers {
            let Some(descriptor) = self.registry.descriptor(handler) else {
                continue;
            };
            for job in jobs_for_handler(&self.registry, handler, &matched) {
                let ctx = CheckContext {
                    handler,
                    event,
                    project,
                    job: &job,
                    package: packages.package_config_for(&job),
                    forge: &*self.forge,
                    config: &self.config,
                };
                match run_checkers(descriptor, &ctx).await {
                    CheckOutcome::Admitted(admission) => admissions.push(admission),
                    CheckOutcome::Rejected { by } if by.reports_rejection() => {
                        results.push(TaskResult::create_from(
                            false,
                            rejection_message(handler, by),
                            event,
                            Some(&job),
                        ));
                    }
                    CheckOutcome::Rejected { .. } => {}
                }
            }
        }

        let mut feedback = FeedbackTimes::new();
        results.extend(
            self.dispatcher
                .create_tasks(event, project, admissions, &mut feedback)
                .await,
        );
        feedback.report(
            event.created_at(),
            event_type.as_str(),
            self.config.feedback,
            self.metrics,
        );
        results
    }

    async fn acknowledge_comment(&self, event: &Event, project: &ProjectHandle) {
        let Some(comment) = event.comment_id() else {
            return;
        };
        if let Err(e) = self.forge.add_reaction(project, comment, COMMENT_REACTION).await {
            warn!(%comment, error = %e, "failed to react to comment");
        }
    }

    /// Fetches the pull request's labels when a job filters on them and the
    /// payload did not carry them. Labels that cannot be fetched count as none.
    async fn resolve_labels(&self, event: &Event, project: &ProjectHandle, packages: &PackagesConfig) {
        if event.labels().is_some() || !event.is_forge_event() {
            return;
        }
        let Some(pr) = event.pull_request() else {
            return;
        };
        if packages.job_views().iter().all(|job| job.labels.is_empty()) {
            return;
        }

        match self.forge.pull_request_labels(project, pr).await {
            Ok(labels) => event.set_labels(labels),
            Err(e) => {
                warn!(%pr, error = %e, "cannot fetch pull request labels");
                event.set_labels(Vec::new());
            }
        }
    }
}

/// Comments on dist-git pull requests and commits get no reaction.
fn reacts_to_comment(event_type: EventType) -> bool {
    matches!(
        event_type,
        EventType::PullRequestComment | EventType::IssueComment
    )
}

fn rejection_message(handler: HandlerKind, by: Checker) -> String {
    match by {
        Checker::ProjectAllowed => format!(
            "{} not run: the project is private and its namespace is not enabled.",
            handler
        ),
        Checker::ActorPermission { min } => format!(
            "{} not run: the triggering user lacks {:?} permission.",
            handler, min
        ),
        Checker::CustomProjectAllowed => format!(
            "{} not run: the project may not use the configured build project.",
            handler
        ),
        other => format!("{} not run: rejected by {}.", handler, other),
    }
}

#[cfg(test)]
mod tests;
