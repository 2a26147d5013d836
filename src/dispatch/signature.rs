//! Task signatures.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::checker::Admission;
use crate::events::{Event, EventRecord};
use crate::jobs::{JobDefinition, PackageConfig};
use crate::registry::HandlerKind;
use crate::types::BuildId;

/// Why a backend signature could not be turned back into a task.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("unknown task name: {0}")]
    UnknownTask(String),

    #[error("malformed task arguments: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// What the execution backend transports: a task name and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub target: String,
    pub kwargs: Map<String, Value>,
}

#[derive(Deserialize)]
struct TaskArgs {
    job_config: JobDefinition,
    package_config: Option<PackageConfig>,
    event: EventRecord,
    #[serde(default)]
    upstream_build_id: Option<BuildId>,
    #[serde(default)]
    attempt: u32,
}

/// One pending handler run for one job.
///
/// Only constructible from an [`Admission`], so a signature always stands
/// for a (handler, job) pair that passed its checkers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSignature {
    handler: HandlerKind,
    job: JobDefinition,
    package: Option<PackageConfig>,
    event: EventRecord,
    upstream_build_id: Option<BuildId>,
    attempt: u32,
}

impl TaskSignature {
    pub fn new(admission: Admission, event: &Event) -> Self {
        let (handler, job) = admission.into_parts();
        let package = event
            .resolved_packages_config()
            .and_then(|config| config.package_config_for(&job))
            .cloned();
        let upstream_build_id = event.result().and_then(|r| r.build_id);

        TaskSignature {
            handler,
            job,
            package,
            event: event.to_record(),
            upstream_build_id,
            attempt: 0,
        }
    }

    pub fn handler(&self) -> HandlerKind {
        self.handler
    }

    pub fn job(&self) -> &JobDefinition {
        &self.job
    }

    pub fn package(&self) -> Option<&PackageConfig> {
        self.package.as_ref()
    }

    pub fn event(&self) -> &EventRecord {
        &self.event
    }

    pub fn upstream_build_id(&self) -> Option<BuildId> {
        self.upstream_build_id
    }

    /// Zero for the first run.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The same unit of work as a fresh task for the next attempt.
    pub fn retried(&self) -> Self {
        TaskSignature {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    pub fn to_signature(&self) -> Signature {
        let mut kwargs = Map::new();
        kwargs.insert("job_config".to_string(), json!(self.job));
        kwargs.insert("package_config".to_string(), json!(self.package));
        kwargs.insert("event".to_string(), json!(self.event));
        kwargs.insert("upstream_build_id".to_string(), json!(self.upstream_build_id));
        kwargs.insert("attempt".to_string(), json!(self.attempt));

        Signature {
            target: self.handler.task_name().to_string(),
            kwargs,
        }
    }

    /// Rebuilds a task from what the backend delivered.
    pub fn from_signature(signature: &Signature) -> Result<Self, SignatureError> {
        let handler = HandlerKind::from_task_name(&signature.target)
            .ok_or_else(|| SignatureError::UnknownTask(signature.target.clone()))?;
        let args: TaskArgs = serde_json::from_value(Value::Object(signature.kwargs.clone()))?;

        Ok(TaskSignature {
            handler,
            job: args.job_config,
            package: args.package_config,
            event: args.event,
            upstream_build_id: args.upstream_build_id,
            attempt: args.attempt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CommentScope;
    use crate::test_utils::{admit, build_end_event, comment_event};
    use crate::jobs::{JobType, TriggerKind};
    use crate::types::PrNumber;

    fn build_job() -> JobDefinition {
        JobDefinition::new(JobType::CoprBuild, TriggerKind::PullRequest, "ogr")
    }

    #[test]
    fn signature_targets_the_handler_task() {
        let event = comment_event("/packit build", CommentScope::PullRequest { number: PrNumber(42) });
        let task = TaskSignature::new(admit(HandlerKind::CoprBuild, build_job()), &event);
        let signature = task.to_signature();

        assert_eq!(signature.target, "task.run_copr_build_handler");
        assert_eq!(signature.kwargs["job_config"]["job"], "copr_build");
        assert_eq!(signature.kwargs["event"]["kind"], "comment");
        assert_eq!(signature.kwargs["attempt"], 0);
    }

    #[test]
    fn result_events_carry_the_upstream_build() {
        let event = build_end_event(7, "ogr", None);
        let task = TaskSignature::new(admit(HandlerKind::CoprBuildEnd, build_job()), &event);
        assert_eq!(task.upstream_build_id(), Some(BuildId(7)));
    }

    #[test]
    fn backend_signatures_rebuild_the_task() {
        let event = build_end_event(7, "ogr", Some("fedora"));
        let task = TaskSignature::new(admit(HandlerKind::CoprBuildEnd, build_job()), &event).retried();

        let back = TaskSignature::from_signature(&task.to_signature()).unwrap();
        assert_eq!(back, task);
        assert_eq!(back.attempt(), 1);
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let signature = Signature {
            target: "task.nope".to_string(),
            kwargs: Map::new(),
        };
        assert!(matches!(
            TaskSignature::from_signature(&signature),
            Err(SignatureError::UnknownTask(t)) if t == "task.nope"
        ));
    }

    #[test]
    fn missing_arguments_are_malformed() {
        let signature = Signature {
            target: HandlerKind::CoprBuild.task_name().to_string(),
            kwargs: Map::new(),
        };
        assert!(matches!(
            TaskSignature::from_signature(&signature),
            Err(SignatureError::Malformed(_))
        ));
    }
}
