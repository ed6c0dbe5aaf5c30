//! Thread pools able to run a self-expanding set of tasks to completion.

use crate::Result;
use slog::{error, Logger};
use std::{
    any::Any,
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Condvar, Mutex, PoisonError,
    },
};

mod rayon;
mod share_queue;
mod task_pool;

pub use self::rayon::RayonThreadPool;
pub use share_queue::SharedQueueThreadPool;
pub use task_pool::{PoolConfig, TaskPool};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A pool of worker threads executing submitted jobs.
///
/// Jobs may submit further jobs to the same pool while they run;
/// [`ThreadPool::wait_until_idle`] returns only after all of them,
/// transitively, have completed.
pub trait ThreadPool: Send + Sync + 'static {
    /// Short name of the implementation, as accepted by `--pool`.
    const NAME: &'static str;

    /// Create a pool with `threads` workers, or one per CPU when zero.
    fn new(threads: usize) -> Result<Self>
    where
        Self: Sized;

    /// Submit a job. Never blocks on queue capacity.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;

    /// Block until every submitted job has finished.
    ///
    /// Must not be called from inside a job.
    fn wait_until_idle(&self);

    /// Drain, stop all workers and restart with `threads` workers.
    fn resize(&self, threads: usize) -> Result<()>;

    /// Number of live worker threads.
    fn threads(&self) -> usize;
}

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    // pool this thread works for; zero on threads outside any pool
    static WORKER_OF: Cell<usize> = const { Cell::new(0) };
}

/// Identity of one pool, known to each of its worker threads.
///
/// A pool dropped by one of its own tasks must not wait for itself to
/// drain nor join the thread it is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolId(usize);

impl PoolId {
    pub fn next() -> PoolId {
        PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Mark the calling thread as a worker of this pool.
    pub fn enter(self) {
        WORKER_OF.with(|pool| pool.set(self.0));
    }

    /// Whether the calling thread is a worker of this pool.
    pub fn is_current(self) -> bool {
        WORKER_OF.with(|pool| pool.get() == self.0)
    }
}

/// Number of workers to use when asked for `threads`.
pub(crate) fn worker_count(threads: usize) -> usize {
    if threads == 0 {
        num_cpus::get()
    } else {
        threads
    }
}

/// Submitted-minus-completed job counter.
///
/// `increment` must happen before the job is visible to any worker and
/// `decrement` only after the job has run, so that a job submitted from a
/// running job is counted before its parent is uncounted.
#[derive(Default)]
pub(crate) struct TaskCounter {
    count: AtomicUsize,
    lock: Mutex<()>,
    idle: Condvar,
}

impl TaskCounter {
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        assert!(previous > 0, "outstanding task count underflow");
        if previous == 1 {
            // take the lock so the notification cannot slip in between a
            // waiter's check and its call to `wait`
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.idle.notify_all();
        }
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Block until the count drops to zero.
    pub fn wait_idle(&self) {
        if self.get() == 0 {
            return;
        }
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while self.get() != 0 {
            guard = self
                .idle
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Run `job`, catching a panic so the worker survives it.
///
/// Returns `false` if the job panicked.
pub(crate) fn run_guarded<F: FnOnce()>(job: F, logger: &Logger) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => true,
        Err(payload) => {
            error!(logger, "task panicked: {}", panic_message(payload.as_ref()));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
