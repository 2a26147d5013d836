//! Pre-dispatch gates.
//!
//! Every handler declares an ordered list of [`Checker`]s. For each
//! (handler, job) pair [`run_checkers`] evaluates them in order and stops at
//! the first rejection, so later (more expensive) checks such as permission
//! lookups are skipped.
//!
//! Passing the whole list yields an [`Admission`], the only way to construct
//! a task signature.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::events::{Event, ProjectHandle};
use crate::forge::{CommentTarget, Forge, PermissionLevel};
use crate::jobs::{JobDefinition, PackageConfig};
use crate::registry::{HandlerDescriptor, HandlerKind};

/// A gate evaluated before dispatching a handler for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "checker", rename_all = "snake_case")]
pub enum Checker {
    /// The job's trigger matches the event's trigger kind.
    TriggerMatches,

    /// The project is public, or its private namespace is enabled.
    /// Result notifications skip the gate.
    ProjectAllowed,

    /// The triggering actor holds at least `min` on the project. Events
    /// without an actor (bus notifications) pass. Rejection is explained to
    /// the actor in a comment.
    ActorPermission { min: PermissionLevel },

    /// A result notification belongs to this job (package and identifier).
    BuildMatchesJob,

    /// A job building in a custom build project names one the project may
    /// use. Rejection is explained in a comment.
    CustomProjectAllowed,
}

impl Checker {
    pub fn name(&self) -> &'static str {
        match self {
            Checker::TriggerMatches => "trigger_matches",
            Checker::ProjectAllowed => "project_allowed",
            Checker::ActorPermission { .. } => "actor_permission",
            Checker::BuildMatchesJob => "build_matches_job",
            Checker::CustomProjectAllowed => "custom_project_allowed",
        }
    }

    /// Rejections by this checker are reported as failed task results.
    pub fn reports_rejection(&self) -> bool {
        matches!(
            self,
            Checker::ProjectAllowed | Checker::ActorPermission { .. } | Checker::CustomProjectAllowed
        )
    }

    /// Evaluates the gate.
    pub async fn evaluate<F: Forge>(&self, ctx: &CheckContext<'_, F>) -> bool {
        match self {
            Checker::TriggerMatches => ctx.job.trigger == ctx.event.trigger_kind(),
            Checker::ProjectAllowed => project_allowed(ctx),
            Checker::ActorPermission { min } => actor_permitted(ctx, *min).await,
            Checker::BuildMatchesJob => build_matches_job(ctx),
            Checker::CustomProjectAllowed => custom_project_allowed(ctx).await,
        }
    }
}

impl fmt::Display for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a checker may look at.
pub struct CheckContext<'a, F> {
    pub handler: HandlerKind,
    pub event: &'a Event,
    pub project: &'a ProjectHandle,
    pub job: &'a JobDefinition,
    pub package: Option<&'a PackageConfig>,
    pub forge: &'a F,
    pub config: &'a ServiceConfig,
}

fn project_allowed<F>(ctx: &CheckContext<'_, F>) -> bool {
    if ctx.event.result().is_some() || !ctx.project.is_private {
        return true;
    }
    let namespace = ctx.project.namespace_path();
    let allowed = ctx.config.private_namespace_enabled(&namespace);
    if !allowed {
        warn!(%namespace, "private namespace is not enabled");
    }
    allowed
}

async fn actor_permitted<F: Forge>(ctx: &CheckContext<'_, F>, min: PermissionLevel) -> bool {
    let Some(actor) = ctx.event.actor() else {
        return true;
    };

    let level = match ctx.forge.permission_level(ctx.project, actor).await {
        Ok(level) => level,
        Err(e) => {
            warn!(actor, error = %e, "permission lookup failed");
            return false;
        }
    };
    if level >= min {
        return true;
    }

    if let Some(target) = CommentTarget::for_event(ctx.event) {
        let body = format!(
            "User `{}` is not allowed to run `{}` jobs for this project.",
            actor, ctx.job.job_type
        );
        if let Err(e) = ctx.forge.comment(ctx.project, &target, &body).await {
            warn!(%target, error = %e, "failed to explain permission rejection");
        }
    }
    false
}

async fn custom_project_allowed<F: Forge>(ctx: &CheckContext<'_, F>) -> bool {
    let Some(build_project) = ctx.job.custom_build_project() else {
        return true;
    };
    let forge_project = ctx.project.forge_path();
    if ctx.config.custom_build_project_allows(&build_project, &forge_project) {
        return true;
    }

    warn!(%build_project, %forge_project, "forge project may not use custom build project");
    if let Some(target) = CommentTarget::for_event(ctx.event) {
        let body = format!(
            "Your git-forge project is not allowed to use the configured `{}` build project.\n\n\
             Please ask its owner to add `{}` to the forge projects allowed to build in it.",
            build_project, forge_project
        );
        if let Err(e) = ctx.forge.comment(ctx.project, &target, &body).await {
            warn!(%target, error = %e, "failed to explain build project rejection");
        }
    }
    false
}

fn build_matches_job<F>(ctx: &CheckContext<'_, F>) -> bool {
    let Some(result) = ctx.event.result() else {
        return true;
    };

    let package_matches = match result.package.as_deref() {
        None => true,
        Some(name) => {
            name == ctx.job.package
                || ctx
                    .package
                    .is_some_and(|p| p.downstream_name() == name)
        }
    };
    package_matches && result.identifier == ctx.job.identifier
}

/// Proof that a (handler, job) pair passed its checker pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    handler: HandlerKind,
    job: JobDefinition,
}

impl Admission {
    pub fn handler(&self) -> HandlerKind {
        self.handler
    }

    pub fn job(&self) -> &JobDefinition {
        &self.job
    }

    pub(crate) fn into_parts(self) -> (HandlerKind, JobDefinition) {
        (self.handler, self.job)
    }

    #[cfg(test)]
    pub(crate) fn for_test(handler: HandlerKind, job: JobDefinition) -> Self {
        Admission { handler, job }
    }
}

/// Outcome of a checker pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Admitted(Admission),
    Rejected { by: Checker },
}

/// Runs the handler's checkers in order, stopping at the first rejection.
pub async fn run_checkers<F: Forge>(
    descriptor: &HandlerDescriptor,
    ctx: &CheckContext<'_, F>,
) -> CheckOutcome {
    for checker in &descriptor.checkers {
        if !checker.evaluate(ctx).await {
            debug!(
                handler = %descriptor.kind,
                job = %ctx.job,
                checker = checker.name(),
                "checker rejected job"
            );
            return CheckOutcome::Rejected { by: *checker };
        }
    }
    CheckOutcome::Admitted(Admission {
        handler: descriptor.kind,
        job: ctx.job.clone(),
    })
}
