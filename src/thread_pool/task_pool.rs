use crate::{
    thread_pool::{run_guarded, worker_count, Job, PoolId, TaskCounter, ThreadPool},
    Result,
};
use slog::{debug, error, o, Logger};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

const DEFAULT_SLEEP: Duration = Duration::from_micros(1000);

/// Settings for a [`TaskPool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Worker count; zero means one per CPU.
    pub threads: usize,
    /// How long an idle worker or a waiting caller sleeps between polls.
    /// Zero makes them yield instead.
    pub sleep: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            threads: 0,
            sleep: DEFAULT_SLEEP,
        }
    }
}

struct Shared {
    id: PoolId,
    queue: Mutex<VecDeque<Job>>,
    running: AtomicBool,
    // set when the pool is gone: workers leave once the queue is empty
    closing: AtomicBool,
    paused: AtomicBool,
    outstanding: TaskCounter,
    // dequeued but not yet finished
    active: AtomicUsize,
    panicked: AtomicUsize,
    sleep: Duration,
    logger: Logger,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        // jobs run outside the lock, so a poisoned queue is still consistent
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop_task(&self) -> Option<Job> {
        let mut queue = self.queue();
        if self.paused.load(Ordering::SeqCst) {
            return None;
        }
        let job = queue.pop_front()?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Some(job)
    }

    fn sleep_or_yield(&self) {
        if self.sleep.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep);
        }
    }

    fn run_worker(&self) {
        self.id.enter();
        while self.running.load(Ordering::SeqCst) {
            match self.pop_task() {
                Some(job) => {
                    if !run_guarded(job, &self.logger) {
                        self.panicked.fetch_add(1, Ordering::SeqCst);
                    }
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    self.outstanding.decrement();
                }
                None if self.closing.load(Ordering::SeqCst) => break,
                None => self.sleep_or_yield(),
            }
        }
    }

    /// Drop every queued task unrun, uncounting each.
    fn discard_queue(&self) -> usize {
        // dropped after the queue lock is released
        let discarded: Vec<Job> = self.queue().drain(..).collect();
        for _ in &discarded {
            self.outstanding.decrement();
        }
        discarded.len()
    }

    fn is_idle(&self) -> bool {
        let queue = self.queue();
        let outstanding = self.outstanding.get();
        if self.paused.load(Ordering::SeqCst) {
            // read under the queue lock: nothing can be dequeued meanwhile,
            // and a concurrent submit is counted before it is queued
            outstanding.saturating_sub(queue.len()) == 0
        } else {
            outstanding == 0
        }
    }
}

/// A pool of worker threads polling one shared FIFO queue.
///
/// Jobs may submit more jobs while running. [`TaskPool::wait_until_idle`]
/// polls the outstanding job count, which is raised before a job is queued
/// and lowered after it has run, so it cannot observe zero while a chain of
/// nested submissions is still in flight.
///
/// Dropping the pool drains it and joins the workers. If the last handle
/// is dropped by one of its own tasks, the workers instead finish what is
/// queued and exit on their own; tasks still queued in a paused pool are
/// then discarded.
///
/// # Examples
///
/// ```rust
/// # use dirstat::thread_pool::TaskPool;
/// # use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
/// let pool = Arc::new(TaskPool::new(4).unwrap());
/// let done = Arc::new(AtomicUsize::new(0));
///
/// let (p, d) = (Arc::clone(&pool), Arc::clone(&done));
/// pool.submit(move || {
///     d.fetch_add(1, Ordering::SeqCst);
///     p.submit(move || {
///         d.fetch_add(1, Ordering::SeqCst);
///     });
/// });
/// pool.wait_until_idle();
///
/// assert_eq!(done.load(Ordering::SeqCst), 2);
/// ```
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskPool {
    /// Create a pool with `threads` workers polling every millisecond.
    pub fn new(threads: usize) -> Result<TaskPool> {
        Self::with_config(
            PoolConfig {
                threads,
                ..PoolConfig::default()
            },
            Logger::root(slog::Discard, o!()),
        )
    }

    /// Create a pool from `config`, logging through `logger`.
    pub fn with_config(config: PoolConfig, logger: Logger) -> Result<TaskPool> {
        let shared = Arc::new(Shared {
            id: PoolId::next(),
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            outstanding: TaskCounter::default(),
            active: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
            sleep: config.sleep,
            logger,
        });
        let workers = spawn_workers(&shared, worker_count(config.threads))?;
        Ok(TaskPool {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Queue `task`.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.outstanding.increment();
        self.shared.queue().push_back(Box::new(task));
    }

    /// Queue `task` to be called with `args`. Pass a tuple for several.
    pub fn submit_with_args<F, A>(&self, task: F, args: A)
    where
        F: FnOnce(A) + Send + 'static,
        A: Send + 'static,
    {
        self.submit(move || task(args));
    }

    /// Block until every submitted task has finished, or, while paused,
    /// until every task already dequeued has finished.
    pub fn wait_until_idle(&self) {
        while !self.shared.is_idle() {
            self.shared.sleep_or_yield();
        }
    }

    /// Number of queued tasks not yet picked up.
    pub fn pending_count(&self) -> usize {
        self.shared.queue().len()
    }

    /// Number of tasks submitted but not yet finished.
    pub fn total_outstanding(&self) -> usize {
        self.shared.outstanding.get()
    }

    /// Number of tasks being executed right now.
    pub fn running_count(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Number of tasks that panicked so far.
    pub fn panicked_count(&self) -> usize {
        self.shared.panicked.load(Ordering::SeqCst)
    }

    /// Stop workers from picking up new tasks.
    ///
    /// Tasks already running finish normally.
    pub fn pause(&self) {
        let _queue = self.shared.queue();
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    /// Let workers pick up tasks again.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    /// Whether the pool is paused.
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Number of live workers.
    pub fn threads(&self) -> usize {
        self.workers().len()
    }

    /// Wait for running tasks, join every worker and start `threads` new ones.
    ///
    /// Queued tasks stay queued and the paused state is kept. Must not be
    /// called from inside a task.
    ///
    /// If no worker can be started the pool is left without workers and its
    /// queued tasks are discarded; a later successful `resize` revives it.
    pub fn resize(&self, threads: usize) -> Result<()> {
        self.restart_with(worker_count(threads), spawn_workers)
    }

    fn restart_with<S>(&self, threads: usize, spawn: S) -> Result<()>
    where
        S: FnOnce(&Arc<Shared>, usize) -> Result<Vec<JoinHandle<()>>>,
    {
        let mut workers = self.workers();
        let was_paused = self.is_paused();

        self.pause();
        self.wait_until_idle();
        self.shared.running.store(false, Ordering::SeqCst);
        join_workers(&mut workers);

        self.shared.running.store(true, Ordering::SeqCst);
        let spawned = spawn(&self.shared, threads);
        self.shared.paused.store(was_paused, Ordering::SeqCst);
        match spawned {
            Ok(spawned) => *workers = spawned,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                let discarded = self.shared.discard_queue();
                error!(self.shared.logger, "unable to restart workers: {e}";
                    "discarded" => discarded
                );
                return Err(e);
            }
        }

        debug!(self.shared.logger, "pool resized"; "threads" => threads);
        Ok(())
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_workers(shared: &Arc<Shared>, threads: usize) -> Result<Vec<JoinHandle<()>>> {
    let mut workers = Vec::with_capacity(threads);
    for id in 0..threads {
        let worker = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("task-pool-{id}"))
            .spawn(move || worker.run_worker());
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                shared.running.store(false, Ordering::SeqCst);
                join_workers(&mut workers);
                return Err(e.into());
            }
        }
    }
    debug!(shared.logger, "workers started"; "threads" => threads);
    Ok(workers)
}

fn join_workers(workers: &mut Vec<JoinHandle<()>>) {
    for handle in workers.drain(..) {
        // workers catch task panics, so a join error cannot carry one
        let _ = handle.join();
    }
}

impl ThreadPool for TaskPool {
    const NAME: &'static str = "task";

    fn new(threads: usize) -> Result<TaskPool> {
        TaskPool::new(threads)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(job);
    }

    fn wait_until_idle(&self) {
        TaskPool::wait_until_idle(self);
    }

    fn resize(&self, threads: usize) -> Result<()> {
        TaskPool::resize(self, threads)
    }

    fn threads(&self) -> usize {
        TaskPool::threads(self)
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if self.shared.id.is_current() {
            // joining would wait for this very thread
            self.shared.closing.store(true, Ordering::SeqCst);
            debug!(self.shared.logger, "pool released by its own task");
            return;
        }
        if self.workers().is_empty() {
            // a failed resize left nobody to run the queue
            self.shared.discard_queue();
        }
        self.wait_until_idle();
        self.shared.running.store(false, Ordering::SeqCst);
        join_workers(&mut self.workers());
        debug!(self.shared.logger, "pool shut down");
    }
}
