use crate::{
    thread_pool::{run_guarded, worker_count, Job, PoolId, TaskCounter, ThreadPool},
    Result,
};
use crossbeam::channel::{self, Receiver, Sender};
use slog::{debug, error, o, Logger};
use std::{
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

enum ThreadMessage {
    Job(Job),
    Shutdown,
}

struct Worker {
    pool: PoolId,
    rx: Receiver<ThreadMessage>,
    outstanding: Arc<TaskCounter>,
    logger: Logger,
}

fn run_tasks(worker: Worker) {
    worker.pool.enter();
    loop {
        match worker.rx.recv() {
            Ok(ThreadMessage::Job(job)) => {
                run_guarded(job, &worker.logger);
                worker.outstanding.decrement();
            }
            Ok(ThreadMessage::Shutdown) => break,
            Err(_) => {
                error!(worker.logger, "worker disconnected; shutting down");
                break;
            }
        }
    }
}

/// A pool whose workers block on one unbounded `crossbeam` channel.
///
/// Unlike [`TaskPool`](crate::thread_pool::TaskPool) idle workers sleep
/// inside `recv` and draining waits on a condition variable, so neither
/// side polls. It cannot be paused.
///
/// If the last handle is dropped by one of its own jobs, the workers are
/// told to stop after the jobs already queued but are not joined.
pub struct SharedQueueThreadPool {
    id: PoolId,
    sender: Sender<ThreadMessage>,
    receiver: Receiver<ThreadMessage>,
    outstanding: Arc<TaskCounter>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    logger: Logger,
}

impl SharedQueueThreadPool {
    /// Create a pool with `threads` workers, logging through `logger`.
    pub fn with_logger(threads: usize, logger: Logger) -> Result<SharedQueueThreadPool> {
        let (sender, receiver) = channel::unbounded::<ThreadMessage>();
        let pool = SharedQueueThreadPool {
            id: PoolId::next(),
            sender,
            receiver,
            outstanding: Arc::new(TaskCounter::default()),
            workers: Mutex::new(Vec::new()),
            logger,
        };
        let workers = pool.spawn_workers(worker_count(threads))?;
        *pool.workers.lock().unwrap_or_else(PoisonError::into_inner) = workers;
        Ok(pool)
    }

    fn spawn_workers(&self, threads: usize) -> Result<Vec<JoinHandle<()>>> {
        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let worker = Worker {
                pool: self.id,
                rx: self.receiver.clone(),
                outstanding: Arc::clone(&self.outstanding),
                logger: self.logger.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("shared-queue-{id}"))
                .spawn(move || run_tasks(worker));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    self.stop_workers(&mut workers);
                    return Err(e.into());
                }
            }
        }
        debug!(self.logger, "workers started"; "threads" => threads);
        Ok(workers)
    }

    fn stop_workers(&self, workers: &mut Vec<JoinHandle<()>>) {
        self.send_shutdown(workers.len());
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    fn send_shutdown(&self, workers: usize) {
        for _ in 0..workers {
            // the receiver lives as long as `self`, so sending cannot fail
            let _ = self.sender.send(ThreadMessage::Shutdown);
        }
    }
}

impl ThreadPool for SharedQueueThreadPool {
    const NAME: &'static str = "shared";

    fn new(threads: usize) -> Result<SharedQueueThreadPool> {
        Self::with_logger(threads, Logger::root(slog::Discard, o!()))
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.outstanding.increment();
        if self.sender.send(ThreadMessage::Job(Box::new(job))).is_err() {
            error!(self.logger, "unable to send job to workers");
            self.outstanding.decrement();
        }
    }

    fn wait_until_idle(&self) {
        self.outstanding.wait_idle();
    }

    fn resize(&self, threads: usize) -> Result<()> {
        let threads = worker_count(threads);
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        self.wait_until_idle();
        self.stop_workers(&mut workers);
        *workers = self.spawn_workers(threads)?;
        debug!(self.logger, "pool resized"; "threads" => threads);
        Ok(())
    }

    fn threads(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for SharedQueueThreadPool {
    fn drop(&mut self) {
        let mut workers = std::mem::take(
            self.workers
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if self.id.is_current() {
            // joining would wait for this very thread
            self.send_shutdown(workers.len());
            debug!(self.logger, "pool released by its own job");
            return;
        }
        self.wait_until_idle();
        self.stop_workers(&mut workers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::{Duration, Instant},
    };

    #[test]
    fn released_by_own_job() {
        let pool = Arc::new(SharedQueueThreadPool::new(2).unwrap());
        let outstanding = Arc::downgrade(&pool.outstanding);
        let hits = Arc::new(AtomicUsize::new(0));
        let (go, wait) = channel::bounded::<()>(0);

        let handle = Arc::clone(&pool);
        pool.spawn(move || {
            let _ = wait.recv();
            drop(handle);
        });
        for _ in 0..10 {
            let hits = Arc::clone(&hits);
            pool.spawn(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool);
        go.send(()).unwrap();

        // every worker holds the counter until it exits
        let deadline = Instant::now() + Duration::from_secs(10);
        while outstanding.upgrade().is_some() {
            assert!(Instant::now() < deadline, "workers still running");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }
}
