use dirstat::benchmark::Benchmark;
use dirstat::thread_pool::{
    PoolConfig, RayonThreadPool, SharedQueueThreadPool, TaskPool, ThreadPool,
};
use dirstat::traversal::Traversal;
use dirstat::{Result, Summary, SyncedStream};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use walkdir::WalkDir;

const CONTENT: &str = "lorem ipsum dolor\n\nsit amet\n";

fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

fn traverse<P: ThreadPool>(pool: P, root: &Path) -> Summary {
    Traversal::new(Arc::new(pool), logger()).run(root)
}

// 50 subdirectories holding 20 files each
fn wide_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    for d in 0..50 {
        let sub = dir.path().join(format!("dir-{d}"));
        fs::create_dir(&sub).unwrap();
        for f in 0..20 {
            fs::write(sub.join(format!("file-{f}.txt")), CONTENT).unwrap();
        }
    }
    dir
}

fn wide_tree_summary() -> Summary {
    Summary {
        directories: 51,
        files: 1000,
        empty_lines: 1000,
        nonempty_lines: 2000,
        words: 5000,
        letters: 22000,
        errors: 0,
    }
}

#[test]
fn empty_tree() -> Result<()> {
    let dir = TempDir::new()?;
    let summary = traverse(TaskPool::new(2)?, dir.path());
    assert_eq!(
        summary,
        Summary {
            directories: 1,
            ..Summary::default()
        }
    );
    Ok(())
}

#[test]
fn one_file_in_subdirectory() -> Result<()> {
    let dir = TempDir::new()?;
    fs::create_dir(dir.path().join("sub"))?;
    fs::write(dir.path().join("sub").join("a.txt"), "hello world\n\n")?;

    let summary = traverse(TaskPool::new(2)?, dir.path());

    assert_eq!(summary.directories, 2);
    assert_eq!(summary.files, 1);
    assert_eq!(summary.nonempty_lines, 1);
    assert_eq!(summary.empty_lines, 1);
    assert_eq!(summary.words, 2);
    assert_eq!(summary.letters, 10);
    Ok(())
}

#[test]
fn deep_tree_matches_walkdir() -> Result<()> {
    let dir = TempDir::new()?;
    let mut path = dir.path().to_path_buf();
    for depth in 0..30 {
        path.push(format!("level-{depth}"));
        fs::create_dir(&path)?;
        fs::write(path.join("notes.md"), CONTENT)?;
        fs::create_dir(path.join("empty"))?;
    }

    let summary = traverse(TaskPool::new(4)?, dir.path());

    let entries: Vec<_> = WalkDir::new(dir.path())
        .into_iter()
        .collect::<std::result::Result<_, _>>()
        .unwrap();
    let dirs = entries.iter().filter(|e| e.file_type().is_dir()).count() as u64;
    let files = entries.iter().filter(|e| e.file_type().is_file()).count() as u64;
    assert_eq!(summary.directories, dirs);
    assert_eq!(summary.files, files);
    assert_eq!(summary.words, files * 5);
    Ok(())
}

#[test]
fn counters_do_not_depend_on_thread_count() -> Result<()> {
    let dir = wide_tree();
    for threads in [1, 2, 4, 8] {
        assert_eq!(
            traverse(TaskPool::new(threads)?, dir.path()),
            wide_tree_summary(),
            "task pool with {threads} threads"
        );
        assert_eq!(
            traverse(SharedQueueThreadPool::new(threads)?, dir.path()),
            wide_tree_summary(),
            "shared queue pool with {threads} threads"
        );
        assert_eq!(
            traverse(RayonThreadPool::new(threads)?, dir.path()),
            wide_tree_summary(),
            "rayon pool with {threads} threads"
        );
    }
    Ok(())
}

#[test]
fn missing_root_is_reported_not_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let pool = Arc::new(TaskPool::new(2)?);
    let traversal = Traversal::new(Arc::clone(&pool), logger());

    let summary = traversal.run(&dir.path().join("gone"));

    assert_eq!(summary.directories, 1);
    assert_eq!(summary.files, 0);
    assert_eq!(summary.errors, 1);
    assert_eq!(pool.total_outstanding(), 0);
    Ok(())
}

#[cfg(unix)]
#[test]
fn unreadable_file_counts_as_empty() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new()?;
    fs::write(dir.path().join("readable.txt"), "one two\n")?;
    let secret = dir.path().join("secret.txt");
    fs::write(&secret, "hidden words here\n")?;
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000))?;
    if fs::File::open(&secret).is_ok() {
        // running with privileges that ignore file modes
        return Ok(());
    }

    let summary = traverse(TaskPool::new(2)?, dir.path());

    assert_eq!(summary.files, 2);
    assert_eq!(summary.words, 2);
    assert_eq!(summary.errors, 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn symlinks_are_not_followed() -> Result<()> {
    let dir = TempDir::new()?;
    let sub = dir.path().join("sub");
    fs::create_dir(&sub)?;
    fs::write(sub.join("a.txt"), "a\n")?;
    std::os::unix::fs::symlink(dir.path(), sub.join("loop"))?;
    std::os::unix::fs::symlink(sub.join("a.txt"), dir.path().join("link.txt"))?;

    let summary = traverse(TaskPool::new(2)?, dir.path());

    assert_eq!(summary.directories, 2);
    assert_eq!(summary.files, 1);
    Ok(())
}

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn listing_prints_every_entry() -> Result<()> {
    let dir = TempDir::new()?;
    fs::create_dir(dir.path().join("docs"))?;
    fs::write(dir.path().join("docs").join("guide.txt"), CONTENT)?;
    fs::write(dir.path().join("Makefile"), "all:\n")?;

    let buffer = Buffer::default();
    let listing = Arc::new(SyncedStream::new(buffer.clone()));
    Traversal::with_listing(Arc::new(TaskPool::new(2)?), logger(), listing).run(dir.path());

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert_eq!(output.lines().count(), 3);
    assert!(output.contains("Directory: "));
    assert!(output.contains("Filename: guide.txt extension: txt"));
    assert!(output.contains("Filename: Makefile extension: \n"));
    Ok(())
}

#[test]
fn benchmark_resets_counters_between_runs() -> Result<()> {
    let dir = wide_tree();
    let pool = Arc::new(TaskPool::new(1)?);
    let benchmark = Benchmark::new(Arc::clone(&pool), logger());

    let report = benchmark.run(dir.path(), 4)?;

    assert_eq!(report.samples.len(), 4);
    let threads: Vec<_> = report.samples.iter().map(|s| s.threads).collect();
    assert_eq!(threads, [1, 2, 3, 4]);
    assert!(report.is_consistent());
    assert_eq!(report.summary, wide_tree_summary());
    assert_eq!(pool.threads(), 4);
    assert_eq!(pool.total_outstanding(), 0);
    Ok(())
}

#[test]
fn benchmark_works_with_every_pool() -> Result<()> {
    let dir = wide_tree();
    let shared = Benchmark::new(Arc::new(SharedQueueThreadPool::new(1)?), logger());
    let rayon = Benchmark::new(Arc::new(RayonThreadPool::new(1)?), logger());

    let report = shared.run(dir.path(), 3)?;
    assert_eq!(report.pool, "shared");
    assert_eq!(report.summary, wide_tree_summary());
    let report = rayon.run(dir.path(), 3)?;
    assert_eq!(report.pool, "rayon");
    assert_eq!(report.summary, wide_tree_summary());
    Ok(())
}

// Flags when the last clone of the logger it is built into goes away.
struct ReleaseFlag(Arc<AtomicBool>);

impl slog::Drain for ReleaseFlag {
    type Ok = ();
    type Err = slog::Never;

    fn log(&self, _: &slog::Record, _: &slog::OwnedKVList) -> std::result::Result<(), slog::Never> {
        Ok(())
    }
}

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// The caller lets go of the traversal and the pool right after submitting,
// so the last pool handle usually dies inside a visiting task. Every worker
// holds the pool logger, which is released once they have all exited.
fn abandoned_traversal_releases_workers<P, F>(make_pool: F)
where
    P: ThreadPool,
    F: FnOnce(slog::Logger) -> Result<P> + Send + 'static,
{
    let dir = TempDir::new().unwrap();
    for d in 0..20 {
        let sub = dir.path().join(format!("dir-{d}"));
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("file.txt"), CONTENT).unwrap();
    }
    let released = Arc::new(AtomicBool::new(false));
    let pool_logger = slog::Logger::root(ReleaseFlag(Arc::clone(&released)), slog::o!());
    let root = dir.path().to_path_buf();

    thread::spawn(move || {
        let traversal = Traversal::new(Arc::new(make_pool(pool_logger).unwrap()), logger());
        traversal.submit(&root);
    })
    .join()
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while !released.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "pool workers still running");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn abandoned_task_pool_traversal() {
    abandoned_traversal_releases_workers(|logger| {
        TaskPool::with_config(
            PoolConfig {
                threads: 2,
                ..PoolConfig::default()
            },
            logger,
        )
    });
}

#[test]
fn abandoned_shared_queue_traversal() {
    abandoned_traversal_releases_workers(|logger| SharedQueueThreadPool::with_logger(2, logger));
}

#[test]
fn abandoned_rayon_traversal() {
    abandoned_traversal_releases_workers(|logger| RayonThreadPool::with_logger(2, logger));
}
