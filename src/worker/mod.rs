//! Asynchronous task execution.
//!
//! The dispatcher hands task groups to an [`ExecutionBackend`]; in a single
//! process that backend is the [`TaskQueue`], drained by a [`WorkerPool`].
//!
//! ```text
//! Dispatcher ──submit(group)──► TaskQueue ──► worker 1 ─┐
//!                                   ▲     └─► worker N ─┤ run_task
//!                                   │                   │
//!                                   └── retry (attempt+1, after delay)
//! ```
//!
//! - [`queue`]: the bounded all-or-nothing queue
//! - [`pool`]: workers, retry scheduling, shutdown
//!
//! [`ExecutionBackend`]: crate::dispatch::ExecutionBackend

mod pool;
mod queue;

pub use pool::WorkerPool;
pub use queue::{TaskQueue, TaskReceiver};
