//! Parallel directory traversal on top of a [`ThreadPool`].

use crate::{
    scan::{self, FileStats},
    sink::SyncedStream,
    stats::{Stats, Summary},
    thread_pool::ThreadPool,
    Result,
};
use slog::{debug, warn, Logger};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

struct Inner<P: ThreadPool> {
    pool: Arc<P>,
    stats: Arc<Stats>,
    listing: Option<Arc<SyncedStream>>,
    logger: Logger,
}

/// Walks a directory tree with one pool task per directory.
///
/// Files are scanned on the task that found them; subdirectories are
/// handed back to the pool instead of being recursed into.
///
/// # Examples
///
/// ```rust
/// # use dirstat::{thread_pool::TaskPool, traversal::Traversal};
/// # use std::sync::Arc;
/// let dir = tempfile::TempDir::new().unwrap();
/// std::fs::create_dir(dir.path().join("sub")).unwrap();
/// std::fs::write(dir.path().join("sub/a.txt"), "hello world\n\n").unwrap();
///
/// let pool = Arc::new(TaskPool::new(2).unwrap());
/// let logger = slog::Logger::root(slog::Discard, slog::o!());
/// let summary = Traversal::new(pool, logger).run(dir.path());
///
/// assert_eq!(summary.directories, 2);
/// assert_eq!(summary.words, 2);
/// ```
pub struct Traversal<P: ThreadPool> {
    inner: Arc<Inner<P>>,
}

impl<P: ThreadPool> Traversal<P> {
    /// Traverse using `pool`.
    pub fn new(pool: Arc<P>, logger: Logger) -> Traversal<P> {
        Self::build(pool, logger, None)
    }

    /// Traverse using `pool`, printing every directory and file to `listing`.
    pub fn with_listing(pool: Arc<P>, logger: Logger, listing: Arc<SyncedStream>) -> Traversal<P> {
        Self::build(pool, logger, Some(listing))
    }

    fn build(pool: Arc<P>, logger: Logger, listing: Option<Arc<SyncedStream>>) -> Traversal<P> {
        Traversal {
            inner: Arc::new(Inner {
                pool,
                stats: Arc::new(Stats::default()),
                listing,
                logger,
            }),
        }
    }

    /// The counters the traversal writes to.
    pub fn stats(&self) -> &Arc<Stats> {
        &self.inner.stats
    }

    /// The pool tasks are submitted to.
    pub fn pool(&self) -> &Arc<P> {
        &self.inner.pool
    }

    /// Count `root` as a directory and submit a task visiting it.
    ///
    /// Returns at once; wait on the pool to know when the tree is done.
    pub fn submit(&self, root: &Path) {
        self.inner.stats.record_directory();
        submit_visit(&self.inner, root.to_path_buf());
    }

    /// Traverse `root` and wait for the whole tree.
    ///
    /// Adds to the current counters; reset [`Traversal::stats`] between
    /// runs for per-run figures.
    pub fn run(&self, root: &Path) -> Summary {
        self.submit(root);
        self.inner.pool.wait_until_idle();
        self.inner.stats.snapshot()
    }
}

fn submit_visit<P: ThreadPool>(inner: &Arc<Inner<P>>, path: PathBuf) {
    let task = Arc::clone(inner);
    inner.pool.spawn(move || visit(&task, &path));
}

fn visit<P: ThreadPool>(inner: &Arc<Inner<P>>, path: &Path) {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(inner.logger, "skipping directory {}: {e}", path.display());
            inner.stats.record_error();
            return;
        }
    };
    for entry in entries {
        if let Err(e) = visit_entry(inner, entry) {
            warn!(inner.logger, "skipping entry in {}: {e}", path.display());
            inner.stats.record_error();
        }
    }
}

fn visit_entry<P: ThreadPool>(
    inner: &Arc<Inner<P>>,
    entry: std::io::Result<fs::DirEntry>,
) -> Result<()> {
    let entry = entry?;
    let file_type = entry.file_type()?;
    let path = entry.path();

    if file_type.is_dir() {
        if let Some(listing) = &inner.listing {
            listing.println(format_args!("Directory: {}", path.display()));
        }
        inner.stats.record_directory();
        submit_visit(inner, path);
    } else if file_type.is_file() {
        if let Some(listing) = &inner.listing {
            listing.println(format_args!(
                "Filename: {} extension: {}",
                path.file_name().unwrap_or_default().to_string_lossy(),
                path.extension().unwrap_or_default().to_string_lossy(),
            ));
        }
        let stats = scan::scan_file(&path).unwrap_or_else(|e| {
            warn!(inner.logger, "unable to read {}: {e}", path.display());
            inner.stats.record_error();
            FileStats::default()
        });
        inner.stats.record_file(&stats);
    } else {
        debug!(inner.logger, "ignoring {}", path.display(); "type" => ?file_type);
    }
    Ok(())
}
