//! `ThreadPool` — default `WorkerPool` implementation.
//!
//! N OS threads drain one [`BoundedQueue`] of boxed closures. Producers
//! block on `not_full` while the queue is at capacity; workers block on
//! `not_empty` while it is empty. Both condvars share one mutex that also
//! guards the stop flag, so a wakeup is never missed between the check and
//! the wait.
//!
//! After `stop()`, workers finish whatever is already queued, then exit.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use wirekit_core::config::ServerConfig;
use wirekit_core::error::{Error, QueueFull, Result};
use wirekit_core::pool::{PoolFactory, Task, WorkerPool};
use wirekit_core::queue::BoundedQueue;

struct PoolState {
    stopped: bool,
}

struct PoolInner {
    queue: BoundedQueue<Task>,
    state: Mutex<PoolState>,
    not_empty: Condvar,
    not_full: Condvar,
}

pub struct ThreadPool {
    inner: Arc<PoolInner>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    total: usize,
}

impl ThreadPool {
    /// `workers` threads over a queue of `queue_size` slots. Threads start
    /// on [`run`](WorkerPool::run).
    pub fn new(workers: usize, queue_size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                queue: BoundedQueue::new(queue_size.max(1)),
                state: Mutex::new(PoolState { stopped: false }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
            handles: Mutex::new(Vec::new()),
            total: workers.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.queue.capacity()
    }
}

impl WorkerPool for ThreadPool {
    fn run(&self) -> Result<()> {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return Ok(());
        }
        if self.inner.state.lock().stopped {
            return Err(Error::PoolStopped);
        }
        for worker_id in 0..self.total {
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name(format!("wirekit-worker-{}", worker_id))
                .spawn(move || worker_loop(inner, worker_id))
                .map_err(|source| Error::Io {
                    op: "spawn worker",
                    source,
                })?;
            handles.push(handle);
        }
        debug!(workers = self.total, capacity = self.capacity(), "thread pool running");
        Ok(())
    }

    fn submit(&self, task: Task) -> Result<()> {
        let mut task = task;
        let mut state = self.inner.state.lock();
        loop {
            if state.stopped {
                return Err(Error::PoolStopped);
            }
            match self.inner.queue.push(task) {
                Ok(()) => {
                    drop(state);
                    self.inner.not_empty.notify_one();
                    return Ok(());
                }
                Err(QueueFull(rejected)) => {
                    task = rejected;
                    self.inner.not_full.wait(&mut state);
                }
            }
        }
    }

    fn stop(&self) {
        self.inner.state.lock().stopped = true;
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let joined = handles.len();
        for handle in handles {
            // last reference dropped from inside a task
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            if handle.join().is_err() {
                error!("worker thread panicked outside a task");
            }
        }
        if joined > 0 {
            debug!(workers = joined, "thread pool stopped");
        }
    }

    fn queued(&self) -> usize {
        self.inner.queue.size()
    }

    fn total_workers(&self) -> usize {
        self.total
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(inner: Arc<PoolInner>, worker_id: usize) {
    loop {
        let task = {
            let mut state = inner.state.lock();
            loop {
                if let Some(task) = inner.queue.pop() {
                    break Some(task);
                }
                if state.stopped {
                    break None;
                }
                inner.not_empty.wait(&mut state);
            }
        };

        let Some(task) = task else {
            debug!(worker_id, "worker exiting");
            return;
        };
        inner.not_full.notify_one();

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(worker_id, "task panicked");
        }
    }
}

/// Builds a `ThreadPool` sized from the server configuration.
#[derive(Debug, Clone)]
pub struct ThreadPoolFactory {
    workers: usize,
    queue_size: usize,
}

impl ThreadPoolFactory {
    pub fn new(workers: usize, queue_size: usize) -> Self {
        Self { workers, queue_size }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.worker_thread_num, config.worker_queue_size)
    }
}

impl PoolFactory for ThreadPoolFactory {
    fn build(&self) -> Arc<dyn WorkerPool> {
        Arc::new(ThreadPool::new(self.workers, self.queue_size))
    }
}
