//! The handler registry.
//!
//! Built once at startup from explicit [`RegistryBuilder::register`] calls,
//! one per handler. Building validates the static metadata and fails fast;
//! after that the registry is immutable and answers lookups from five
//! tables:
//!
//! | Table | Key | Answers |
//! |-------|-----|---------|
//! | events | [`EventType`] | handlers reacting to the event type |
//! | commands | comment command | handlers a comment command selects |
//! | check prefixes | check-name prefix | handlers a check rerun selects |
//! | job types | [`JobType`] | handlers running the job type |
//! | required | [`JobType`] | handlers the job type presupposes |
//!
//! Lookups with unknown keys return an empty set. Building does no I/O.
//!
//! The process-wide instance is installed by [`init`] before the first event
//! is accepted and read with [`global`].

mod handlers;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::info;

use crate::events::EventType;
use crate::jobs::JobType;
use crate::retry::HandlerRetryPolicy;

pub use handlers::{HandlerDescriptor, HandlerKind, standard_descriptors};

/// Invalid static handler metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("handler {0} reacts to no event type")]
    NoEventTypes(HandlerKind),

    #[error("handler {0} runs no job type")]
    NoJobTypes(HandlerKind),

    #[error("handler {0} is registered twice")]
    Duplicate(HandlerKind),

    #[error("handler {handler} declares invalid command {command:?}")]
    InvalidCommand {
        handler: HandlerKind,
        command: String,
    },

    #[error("handler {handler} runs for command {command:?} but reacts to no comment event")]
    CommandWithoutCommentEvent {
        handler: HandlerKind,
        command: String,
    },

    #[error("handler {handler} owns check prefix {prefix:?} but does not react to check reruns")]
    PrefixWithoutCheckRerun {
        handler: HandlerKind,
        prefix: String,
    },

    #[error("the handler registry has not been initialized")]
    NotInitialized,
}

/// Collects handler descriptors and validates them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<HandlerDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, descriptor: HandlerDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut registry = Registry::default();

        for descriptor in self.descriptors {
            validate(&descriptor)?;
            let kind = descriptor.kind;
            if registry.descriptors.contains_key(&kind) {
                return Err(RegistryError::Duplicate(kind));
            }

            for event_type in &descriptor.event_types {
                insert(&mut registry.by_event, *event_type, kind);
            }
            for command in &descriptor.comment_commands {
                insert(&mut registry.by_command, command.clone(), kind);
            }
            for prefix in &descriptor.check_prefixes {
                insert(&mut registry.by_check_prefix, prefix.clone(), kind);
            }
            for job_type in &descriptor.job_types {
                insert(&mut registry.by_job_type, *job_type, kind);
            }
            for job_type in &descriptor.required_for {
                insert(&mut registry.requiring_job_type, *job_type, kind);
            }

            registry.descriptors.insert(kind, descriptor);
        }

        Ok(registry)
    }
}

fn validate(descriptor: &HandlerDescriptor) -> Result<(), RegistryError> {
    let handler = descriptor.kind;

    if descriptor.event_types.is_empty() {
        return Err(RegistryError::NoEventTypes(handler));
    }
    if descriptor.job_types.is_empty() {
        return Err(RegistryError::NoJobTypes(handler));
    }

    let reacts_to_comments = descriptor.event_types.iter().any(EventType::is_comment);
    for command in &descriptor.comment_commands {
        if command.is_empty() || command.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidCommand {
                handler,
                command: command.clone(),
            });
        }
        if !reacts_to_comments {
            return Err(RegistryError::CommandWithoutCommentEvent {
                handler,
                command: command.clone(),
            });
        }
    }

    for prefix in &descriptor.check_prefixes {
        if !descriptor.reacts_to_event(EventType::CheckRerun) {
            return Err(RegistryError::PrefixWithoutCheckRerun {
                handler,
                prefix: prefix.clone(),
            });
        }
    }

    Ok(())
}

fn insert<K: Eq + Hash>(table: &mut HashMap<K, BTreeSet<HandlerKind>>, key: K, kind: HandlerKind) {
    table.entry(key).or_default().insert(kind);
}

static EMPTY: BTreeSet<HandlerKind> = BTreeSet::new();

/// Immutable lookup tables over the registered handlers.
#[derive(Debug, Default)]
pub struct Registry {
    descriptors: BTreeMap<HandlerKind, HandlerDescriptor>,
    by_event: HashMap<EventType, BTreeSet<HandlerKind>>,
    by_command: HashMap<String, BTreeSet<HandlerKind>>,
    by_check_prefix: HashMap<String, BTreeSet<HandlerKind>>,
    by_job_type: HashMap<JobType, BTreeSet<HandlerKind>>,
    requiring_job_type: HashMap<JobType, BTreeSet<HandlerKind>>,
}

impl Registry {
    /// The full handler set with default retry policies.
    pub fn standard() -> Result<Registry, RegistryError> {
        Self::standard_with_retry(HandlerRetryPolicy::STANDARD)
    }

    /// The full handler set; `retry` replaces the policy of every handler
    /// that does not declare a dedicated one.
    pub fn standard_with_retry(retry: HandlerRetryPolicy) -> Result<Registry, RegistryError> {
        standard_descriptors(retry)
            .into_iter()
            .fold(RegistryBuilder::new(), RegistryBuilder::register)
            .build()
    }

    pub fn handlers_for_event(&self, event_type: EventType) -> &BTreeSet<HandlerKind> {
        self.by_event.get(&event_type).unwrap_or(&EMPTY)
    }

    pub fn handlers_for_command(&self, command: &str) -> &BTreeSet<HandlerKind> {
        self.by_command.get(command).unwrap_or(&EMPTY)
    }

    pub fn handlers_for_check_prefix(&self, prefix: &str) -> &BTreeSet<HandlerKind> {
        self.by_check_prefix.get(prefix).unwrap_or(&EMPTY)
    }

    pub fn handlers_for_job_type(&self, job_type: JobType) -> &BTreeSet<HandlerKind> {
        self.by_job_type.get(&job_type).unwrap_or(&EMPTY)
    }

    pub fn handlers_requiring_job_type(&self, job_type: JobType) -> &BTreeSet<HandlerKind> {
        self.requiring_job_type.get(&job_type).unwrap_or(&EMPTY)
    }

    pub fn descriptor(&self, kind: HandlerKind) -> Option<&HandlerDescriptor> {
        self.descriptors.get(&kind)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Builds and installs the process-wide registry.
///
/// Idempotent: once installed, later calls return the existing registry.
pub fn init(retry: HandlerRetryPolicy) -> Result<Arc<Registry>, RegistryError> {
    if let Some(existing) = GLOBAL.get() {
        return Ok(Arc::clone(existing));
    }
    let built = Arc::new(Registry::standard_with_retry(retry)?);
    let installed = GLOBAL.get_or_init(|| built);
    info!(handlers = installed.len(), "handler registry initialized");
    Ok(Arc::clone(installed))
}

/// The process-wide registry installed by [`init`].
pub fn global() -> Result<Arc<Registry>, RegistryError> {
    GLOBAL.get().cloned().ok_or(RegistryError::NotInitialized)
}
