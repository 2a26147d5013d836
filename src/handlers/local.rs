//! Process-local collaborators for running the service without external
//! build systems.
//!
//! [`InMemoryBuildStore`] keeps build records for the lifetime of the
//! process. [`DryRunExecutor`] accepts every request, hands out build ids
//! and logs what a real executor would have started. Together they let the
//! binary exercise the whole pipeline (matching, checks, status reports,
//! retries) against a live forge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::dispatch::TaskSignature;
use crate::types::{BuildId, PrNumber, ProjectUrl};

use super::{BuildExecutor, BuildRecord, BuildState, BuildStore, ExecutorError, RunKind, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryBuildStore {
    records: RwLock<HashMap<BuildId, BuildRecord>>,
}

impl InMemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

impl BuildStore for InMemoryBuildStore {
    async fn get(&self, id: BuildId) -> Result<Option<BuildRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn insert(&self, record: BuildRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn record_start(&self, id: BuildId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        record.started_at = Some(at);
        Ok(())
    }

    async fn transition(
        &self,
        id: BuildId,
        state: BuildState,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        record.state = state;
        if state.is_terminal() {
            record.finished_at = Some(at);
        }
        Ok(())
    }

    async fn finish(&self, id: BuildId, state: BuildState, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        if record.state.is_terminal() {
            return Ok(false);
        }
        record.state = state;
        record.finished_at = Some(at);
        Ok(true)
    }

    async fn claim_follow_up(&self, id: BuildId) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        Ok(!std::mem::replace(&mut record.follow_up_claimed, true))
    }

    async fn release_follow_up(&self, id: BuildId) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::Missing(id))?;
        record.follow_up_claimed = false;
        Ok(())
    }

    async fn running_builds(
        &self,
        project: &ProjectUrl,
        pull_request: Option<PrNumber>,
    ) -> Result<Vec<BuildRecord>, StoreError> {
        let records = self.records.read().await;
        let mut running: Vec<BuildRecord> = records
            .values()
            .filter(|r| r.kind == RunKind::Build && &r.project_url == project && !r.state.is_terminal())
            .filter(|r| pull_request.is_none() || r.pull_request == pull_request)
            .cloned()
            .collect();
        running.sort_by_key(|r| r.id);
        Ok(running)
    }
}

/// An executor that only logs.
#[derive(Debug)]
pub struct DryRunExecutor {
    next_id: AtomicU64,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        DryRunExecutor {
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate(&self) -> BuildId {
        BuildId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for DryRunExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildExecutor for DryRunExecutor {
    async fn submit_build(
        &self,
        task: &TaskSignature,
    ) -> Result<Vec<(BuildId, Option<String>)>, ExecutorError> {
        let targets = &task.job().targets;
        let started: Vec<(BuildId, Option<String>)> = if targets.is_empty() {
            vec![(self.allocate(), None)]
        } else {
            targets
                .iter()
                .map(|t| (self.allocate(), Some(t.clone())))
                .collect()
        };
        for (id, target) in &started {
            info!(build = %id, target = target.as_deref().unwrap_or("default"), job = %task.job(), "dry run: build submitted");
        }
        Ok(started)
    }

    async fn cancel_build(&self, id: BuildId) -> Result<(), ExecutorError> {
        info!(build = %id, "dry run: build cancelled");
        Ok(())
    }

    async fn start_test_run(&self, task: &TaskSignature) -> Result<BuildId, ExecutorError> {
        let id = self.allocate();
        info!(run = %id, job = %task.job(), "dry run: tests submitted");
        Ok(id)
    }

    async fn run_job(&self, task: &TaskSignature) -> Result<String, ExecutorError> {
        info!(handler = %task.handler(), job = %task.job(), "dry run: job started");
        Ok(format!("dry run of {}", task.job()))
    }
}
