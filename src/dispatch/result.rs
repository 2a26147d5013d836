use serde::{Deserialize, Serialize};

use crate::events::{Event, EventRecord};
use crate::jobs::{JobDefinition, JobType, PackageConfig};

use super::TaskSignature;

/// Structured context of a [`TaskResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub msg: String,

    #[serde(default)]
    pub event: Option<EventRecord>,

    #[serde(default)]
    pub job: Option<JobType>,

    #[serde(default)]
    pub job_config: Option<JobDefinition>,

    #[serde(default)]
    pub package_config: Option<PackageConfig>,
}

/// Outcome of processing an event or running a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub details: TaskDetails,
}

impl TaskResult {
    /// A bare result carrying only a message.
    pub fn new(success: bool, msg: impl Into<String>) -> Self {
        TaskResult {
            success,
            details: TaskDetails {
                msg: msg.into(),
                event: None,
                job: None,
                job_config: None,
                package_config: None,
            },
        }
    }

    /// A result describing `event` and, optionally, the job it concerns.
    pub fn create_from(
        success: bool,
        msg: impl Into<String>,
        event: &Event,
        job: Option<&JobDefinition>,
    ) -> Self {
        let package_config = job.and_then(|job| {
            event
                .resolved_packages_config()?
                .package_config_for(job)
                .cloned()
        });

        TaskResult {
            success,
            details: TaskDetails {
                msg: msg.into(),
                event: Some(event.to_record()),
                job: job.map(|j| j.job_type),
                job_config: job.cloned(),
                package_config,
            },
        }
    }

    /// A result describing a running task.
    pub fn for_task(success: bool, msg: impl Into<String>, task: &TaskSignature) -> Self {
        TaskResult {
            success,
            details: TaskDetails {
                msg: msg.into(),
                event: Some(task.event().clone()),
                job: Some(task.job().job_type),
                job_config: Some(task.job().clone()),
                package_config: task.package().cloned(),
            },
        }
    }

    pub fn msg(&self) -> &str {
        &self.details.msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::TriggerKind;
    use crate::test_utils::{StaticResolver, pr_action_event};
    use crate::types::PrNumber;

    #[tokio::test]
    async fn results_describe_event_job_and_package() {
        let job = JobDefinition::new(JobType::CoprBuild, TriggerKind::PullRequest, "ogr");
        let resolver = StaticResolver::public_with_jobs(vec![job.clone()]);
        let event = pr_action_event(PrNumber(42));
        event.packages_config(&resolver).await.unwrap();

        let result = TaskResult::create_from(true, "Job created.", &event, Some(&job));

        assert!(result.success);
        assert_eq!(result.msg(), "Job created.");
        assert_eq!(result.details.job, Some(JobType::CoprBuild));
        assert_eq!(result.details.event, Some(event.to_record()));
        assert_eq!(
            result.details.package_config.map(|p| p.name),
            Some("ogr".to_string())
        );
    }

    #[test]
    fn results_without_job_only_describe_the_event() {
        let event = pr_action_event(PrNumber(1));
        let result = TaskResult::create_from(true, "No packit config found in the repository.", &event, None);
        assert_eq!(result.details.job, None);
        assert_eq!(result.details.package_config, None);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["details"]["msg"], "No packit config found in the repository.");
    }
}
