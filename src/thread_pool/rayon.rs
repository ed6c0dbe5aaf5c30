use crate::{
    thread_pool::{run_guarded, worker_count, PoolId, TaskCounter, ThreadPool},
    Result,
};
use slog::{debug, o, Logger};
use std::{
    mem,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, PoisonError, RwLock,
    },
    thread::JoinHandle,
};

/// Runs jobs on a work-stealing [`rayon::ThreadPool`].
///
/// Resizing waits for the current rayon pool to drain, swaps in a freshly
/// built one and joins the old workers. Dropping the last handle from one
/// of its own jobs terminates the rayon pool without joining it.
pub struct RayonThreadPool {
    id: PoolId,
    engine: RwLock<Engine>,
    // workers started and not yet exited, across every rayon pool built
    live: Arc<AtomicUsize>,
    outstanding: Arc<TaskCounter>,
    logger: Logger,
}

// Fields drop in declaration order: the rayon pool is told to terminate
// before its threads are joined.
struct Engine {
    pool: rayon::ThreadPool,
    threads: Threads,
}

struct Threads {
    pool: PoolId,
    handles: Vec<JoinHandle<()>>,
}

impl Drop for Threads {
    fn drop(&mut self) {
        if self.pool.is_current() {
            return;
        }
        for handle in self.handles.drain(..) {
            // jobs run under `run_guarded`, so a worker never unwinds
            let _ = handle.join();
        }
    }
}

struct LiveWorker(Arc<AtomicUsize>);

impl LiveWorker {
    fn new(live: &Arc<AtomicUsize>) -> LiveWorker {
        live.fetch_add(1, Ordering::SeqCst);
        LiveWorker(Arc::clone(live))
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RayonThreadPool {
    /// Create a pool with `threads` workers, logging through `logger`.
    pub fn with_logger(threads: usize, logger: Logger) -> Result<RayonThreadPool> {
        let id = PoolId::next();
        let live = Arc::new(AtomicUsize::new(0));
        let engine = build(id, worker_count(threads), &live, &logger)?;
        Ok(RayonThreadPool {
            id,
            engine: RwLock::new(engine),
            live,
            outstanding: Arc::new(TaskCounter::default()),
            logger,
        })
    }
}

fn build(id: PoolId, threads: usize, live: &Arc<AtomicUsize>, logger: &Logger) -> Result<Engine> {
    let mut handles = Vec::with_capacity(threads);
    let built = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .spawn_handler(|thread| {
            let live = LiveWorker::new(live);
            let logger = logger.clone();
            let handle = std::thread::Builder::new()
                .name(format!("rayon-{}", thread.index()))
                .spawn(move || {
                    let _live = live;
                    id.enter();
                    thread.run();
                    debug!(logger, "worker stopped");
                })?;
            handles.push(handle);
            Ok(())
        })
        .build();
    // a failed build terminates the workers it did start
    let threads = Threads { pool: id, handles };
    Ok(Engine {
        pool: built?,
        threads,
    })
}

impl ThreadPool for RayonThreadPool {
    const NAME: &'static str = "rayon";

    fn new(threads: usize) -> Result<RayonThreadPool> {
        Self::with_logger(threads, Logger::root(slog::Discard, o!()))
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.outstanding.increment();
        let outstanding = Arc::clone(&self.outstanding);
        let logger = self.logger.clone();
        let engine = self.engine.read().unwrap_or_else(PoisonError::into_inner);
        engine.pool.spawn(move || {
            run_guarded(job, &logger);
            outstanding.decrement();
        });
    }

    fn wait_until_idle(&self) {
        self.outstanding.wait_idle();
    }

    fn resize(&self, threads: usize) -> Result<()> {
        let threads = worker_count(threads);
        self.wait_until_idle();
        let engine = build(self.id, threads, &self.live, &self.logger)?;
        let old = mem::replace(
            &mut *self.engine.write().unwrap_or_else(PoisonError::into_inner),
            engine,
        );
        drop(old);
        debug!(self.logger, "pool resized"; "threads" => threads);
        Ok(())
    }

    fn threads(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for RayonThreadPool {
    fn drop(&mut self) {
        if self.id.is_current() {
            debug!(self.logger, "pool released by its own job");
        } else {
            self.wait_until_idle();
        }
    }
}
