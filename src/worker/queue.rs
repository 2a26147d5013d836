//! In-process execution backend.
//!
//! A bounded channel of [`Signature`]s. A group is enqueued only if every
//! signature of it fits; otherwise nothing is enqueued and the caller gets a
//! [`BackendError`].

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dispatch::{BackendError, ExecutionBackend, Signature};

/// Sending half of the task queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Signature>,
}

/// Receiving half, shared by all workers of a pool.
///
/// The worker waiting in [`recv`](Self::recv) holds the channel lock, so
/// closing goes through `closing` to wake it instead of queueing behind it.
#[derive(Debug, Clone)]
pub struct TaskReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Signature>>>,
    closing: CancellationToken,
}

impl TaskQueue {
    /// Creates a queue holding at most `capacity` pending signatures.
    pub fn bounded(capacity: usize) -> (TaskQueue, TaskReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            TaskQueue { tx },
            TaskReceiver {
                rx: Arc::new(Mutex::new(rx)),
                closing: CancellationToken::new(),
            },
        )
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl ExecutionBackend for TaskQueue {
    async fn submit(&self, group: Vec<Signature>) -> Result<(), BackendError> {
        if group.is_empty() {
            return Ok(());
        }
        let requested = group.len();
        let permits = self.tx.try_reserve_many(requested).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(()) => BackendError::Closed,
            mpsc::error::TrySendError::Full(()) => BackendError::Full {
                requested,
                available: self.tx.capacity(),
            },
        })?;

        for (permit, signature) in permits.zip(group) {
            trace!(target_task = %signature.target, "enqueued");
            permit.send(signature);
        }
        debug!(count = requested, "group enqueued");
        Ok(())
    }
}

impl TaskReceiver {
    /// Waits for the next signature. `None` once every sender is gone and
    /// the queue is drained.
    pub async fn recv(&self) -> Option<Signature> {
        let mut rx = self.rx.lock().await;
        if !self.closing.is_cancelled() {
            tokio::select! {
                next = rx.recv() => return next,
                _ = self.closing.cancelled() => {}
            }
        }
        rx.close();
        rx.recv().await
    }

    /// Stops accepting new signatures; queued ones can still be received.
    /// A worker blocked in [`recv`](Self::recv) wakes up and sees the queue
    /// closed.
    pub async fn close(&self) {
        self.closing.cancel();
        self.rx.lock().await.close();
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }
}
