//! packit-dispatch - routes forge and build-system events to the jobs a
//! project configured for them.
//!
//! An incoming [`events::Event`] is resolved against the project's
//! configuration, matched to [`jobs::JobDefinition`]s, filtered through the
//! handler [`registry`] and pre-checks, and the surviving tasks are handed to
//! a [`worker::WorkerPool`] through the [`dispatch`] layer.

pub mod checker;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod forge;
pub mod github;
pub mod handlers;
pub mod jobs;
pub mod matcher;
pub mod metrics;
pub mod process;
pub mod registry;
pub mod retry;
pub mod server;
pub mod telemetry;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_utils;
