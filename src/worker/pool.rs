//! Task workers.
//!
//! Each worker pulls one signature at a time from the shared
//! [`TaskReceiver`], rebuilds the [`TaskSignature`] and runs it. A failed
//! run is classified by the handler; the handler's retry policy then either
//! schedules a fresh signature with `attempt + 1` after the computed delay
//! or ends the task with a failed [`TaskResult`].
//!
//! Workers share nothing but the handler context. A scheduled retry is a
//! new, independent submission to the queue.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::dispatch::{ExecutionBackend, Signature, TaskResult, TaskSignature};
use crate::forge::Forge;
use crate::handlers::{BuildExecutor, BuildStore, HandlerContext, HandlerFailure, run_task};
use crate::retry::RetryDecision;

use super::queue::{TaskQueue, TaskReceiver};

/// Running workers and their shutdown handle.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawns `count` workers (at least one) on the current runtime.
    ///
    /// `queue` is where retries are re-submitted. Final task results are
    /// sent to `results` when given; they are always logged.
    pub fn spawn<S, E, F>(
        count: usize,
        queue: TaskQueue,
        receiver: TaskReceiver,
        ctx: HandlerContext<S, E, F>,
        results: Option<mpsc::UnboundedSender<TaskResult>>,
    ) -> WorkerPool
    where
        S: BuildStore + 'static,
        E: BuildExecutor + 'static,
        F: Forge + 'static,
    {
        let shutdown = CancellationToken::new();
        let workers = (0..count.max(1))
            .map(|id| {
                let worker = Worker {
                    queue: queue.clone(),
                    receiver: receiver.clone(),
                    ctx: ctx.clone(),
                    results: results.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run().instrument(info_span!("worker", id)))
            })
            .collect();

        info!(workers = count.max(1), "worker pool started");
        WorkerPool { workers, shutdown }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops the workers and waits for them. A task already running is
    /// finished first; pending retries are dropped.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker panicked");
            }
        }
        info!("worker pool stopped");
    }
}

struct Worker<S, E, F> {
    queue: TaskQueue,
    receiver: TaskReceiver,
    ctx: HandlerContext<S, E, F>,
    results: Option<mpsc::UnboundedSender<TaskResult>>,
    shutdown: CancellationToken,
}

impl<S, E, F> Worker<S, E, F>
where
    S: BuildStore + 'static,
    E: BuildExecutor + 'static,
    F: Forge + 'static,
{
    async fn run(self) {
        debug!("worker started");
        loop {
            let signature = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(signature) => signature,
                    None => {
                        debug!("task queue closed");
                        break;
                    }
                },
            };
            self.execute(signature).await;
        }
        debug!("worker stopped");
    }

    async fn execute(&self, signature: Signature) {
        let task = match TaskSignature::from_signature(&signature) {
            Ok(task) => task,
            Err(e) => {
                error!(target_task = %signature.target, error = %e, "undeliverable task dropped");
                return;
            }
        };

        let result = match run_task(&task, &self.ctx).await {
            Ok(result) => result,
            Err(failure) => match self.on_failure(&task, &failure) {
                Some(result) => result,
                None => return,
            },
        };

        if result.success {
            info!(handler = %task.handler(), msg = result.msg(), "task finished");
        } else {
            warn!(handler = %task.handler(), msg = result.msg(), "task failed");
        }
        if let Some(results) = &self.results {
            let _ = results.send(result);
        }
    }

    /// Applies the handler's retry policy. Returns the terminal result when
    /// no retry is scheduled.
    fn on_failure(&self, task: &TaskSignature, failure: &HandlerFailure) -> Option<TaskResult> {
        let retry = self
            .ctx
            .registry
            .descriptor(task.handler())
            .map(|d| d.retry)
            .unwrap_or_default();
        let policy = retry.for_class(failure.class);
        let key = (task.handler().task_name(), task.job().to_string(), task.event().created_at);

        match policy.decide(task.attempt(), &key) {
            RetryDecision::Retry {
                delay,
                next_attempt,
            } => {
                warn!(
                    handler = %task.handler(),
                    class = ?failure.class,
                    next_attempt,
                    delay_secs = delay.as_secs_f64(),
                    error = %failure,
                    "task failed, retry scheduled"
                );
                self.schedule_retry(task.retried(), delay);
                None
            }
            RetryDecision::Exhausted { attempts } => {
                error!(
                    handler = %task.handler(),
                    class = ?failure.class,
                    attempts,
                    error = %failure,
                    "task failed, retries exhausted"
                );
                Some(TaskResult::for_task(
                    false,
                    format!("Task failed after {} attempt(s): {}", attempts, failure),
                    task,
                ))
            }
        }
    }

    fn schedule_retry(&self, task: TaskSignature, delay: Duration) {
        let (queue, shutdown) = (self.queue.clone(), self.shutdown.clone());
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(handler = %task.handler(), "pending retry dropped on shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = queue.submit(vec![task.to_signature()]).await {
                        error!(handler = %task.handler(), error = %e, "failed to re-enqueue retry");
                    }
                }
            }
        });
    }
}
