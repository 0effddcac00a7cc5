//! Worker pool abstraction.
//!
//! A `WorkerPool` runs submitted closures on a fixed set of OS threads,
//! keeping recv/dispatch/send work off the reactor threads.
//!
//! **Contract:**
//! - `submit()` blocks the caller while the pool's bounded queue is full,
//!   and fails with `PoolStopped` once the pool is stopped. It never drops
//!   a task silently.
//! - Tasks run in FIFO order of successful submission.
//! - `stop()` wakes every waiter and joins the workers.
//!
//! # Implementors
//!
//! - `ThreadPool` (default): N threads, condvar wakeups, `BoundedQueue`.

use std::sync::Arc;

use crate::error::Result;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait WorkerPool: Send + Sync {
    /// Spawn the worker threads.
    fn run(&self) -> Result<()>;

    /// Queue a task, waiting for a free slot if necessary.
    fn submit(&self, task: Task) -> Result<()>;

    /// Stop accepting work, wake all waiters, join the workers.
    fn stop(&self);

    /// Tasks waiting in the queue (not counting running ones).
    fn queued(&self) -> usize;

    fn total_workers(&self) -> usize;
}

pub trait PoolFactory: Send + Sync {
    fn build(&self) -> Arc<dyn WorkerPool>;
}
