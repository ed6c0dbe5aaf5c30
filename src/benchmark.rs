//! Timing a traversal over increasing pool sizes.

use crate::{
    sink::SyncedStream,
    stats::Summary,
    thread_pool::ThreadPool,
    traversal::Traversal,
    Result,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use slog::{info, Logger};
use std::{
    fmt::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

/// One timed traversal.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    /// Pool size used.
    pub threads: usize,
    /// Wall-clock time from submitting the root to the pool draining.
    pub elapsed: Duration,
    /// Counters gathered by this run alone.
    pub summary: Summary,
}

/// Outcome of [`Benchmark::run`].
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Traversed directory.
    pub root: PathBuf,
    /// Name of the pool implementation, see [`ThreadPool::NAME`].
    pub pool: &'static str,
    /// When the first run started.
    pub started_at: DateTime<Utc>,
    /// One sample per pool size, in increasing order.
    pub samples: Vec<Sample>,
    /// Counters of the last run.
    pub summary: Summary,
}

impl Report {
    /// Whether every run counted the same thing.
    ///
    /// Can be false if the tree changed during the benchmark.
    pub fn is_consistent(&self) -> bool {
        self.samples.iter().all(|s| s.summary == self.summary)
    }

    /// Render the summary and timing table.
    pub fn render(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();
        // writing to a `String` cannot fail
        let _ = writeln!(out, "\n|| SUMMARY ||\n");
        let _ = writeln!(out, "Numbers of directories:     {}", s.directories);
        let _ = writeln!(out, "Numbers of Files:           {}", s.files);
        let _ = writeln!(out, "Numbers of non-empty Lines: {}", s.nonempty_lines);
        let _ = writeln!(out, "Numbers of Empty Lines:     {}", s.empty_lines);
        let _ = writeln!(out, "Number of Words:            {}", s.words);
        let _ = writeln!(out, "Numbers of Letters:         {}", s.letters);
        if s.errors > 0 {
            let _ = writeln!(out, "Unreadable entries:         {}", s.errors);
        }

        let _ = writeln!(out, "\n|| BENCHMARK ||\n");
        for sample in &self.samples {
            let label = format!(
                "Elapsed time listing with using {} {}:",
                sample.threads,
                if sample.threads == 1 { "thread" } else { "threads" }
            );
            let _ = writeln!(out, "{label:<48}{:>14.9}", sample.elapsed.as_secs_f64());
        }
        out
    }
}

/// Runs a [`Traversal`] once per pool size.
pub struct Benchmark<P: ThreadPool> {
    traversal: Traversal<P>,
    logger: Logger,
}

impl<P: ThreadPool> Benchmark<P> {
    /// Benchmark `pool`.
    pub fn new(pool: Arc<P>, logger: Logger) -> Benchmark<P> {
        Benchmark {
            traversal: Traversal::new(pool, logger.clone()),
            logger,
        }
    }

    /// Benchmark `pool`, printing every directory and file to `listing`.
    pub fn with_listing(pool: Arc<P>, logger: Logger, listing: Arc<SyncedStream>) -> Benchmark<P> {
        Benchmark {
            traversal: Traversal::with_listing(pool, logger.clone(), listing),
            logger,
        }
    }

    /// Traverse `root` with 1, 2, ... `max_threads` workers.
    ///
    /// Counters are zeroed before each run. `max_threads` of zero means one
    /// per CPU.
    pub fn run(&self, root: &Path, max_threads: usize) -> Result<Report> {
        let max_threads = if max_threads == 0 {
            num_cpus::get()
        } else {
            max_threads
        };
        let started_at = Utc::now();
        let mut samples = Vec::with_capacity(max_threads);

        for threads in 1..=max_threads {
            self.traversal.pool().resize(threads)?;
            self.traversal.stats().reset();

            let begin = Instant::now();
            let summary = self.traversal.run(root);
            let elapsed = begin.elapsed();

            info!(self.logger, "traversal finished";
                "threads" => threads,
                "elapsed" => ?elapsed,
                "files" => summary.files
            );
            samples.push(Sample {
                threads,
                elapsed,
                summary,
            });
        }

        let summary = samples.last().map(|s| s.summary).unwrap_or_default();
        Ok(Report {
            root: root.to_path_buf(),
            pool: P::NAME,
            started_at,
            samples,
            summary,
        })
    }
}
