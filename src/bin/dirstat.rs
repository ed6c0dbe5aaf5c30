use clap::{command, value_parser, Arg, ArgAction, ArgMatches};
use dirstat::{
    benchmark::{Benchmark, Report},
    prompt::prompt_path,
    thread_pool::{PoolConfig, RayonThreadPool, SharedQueueThreadPool, TaskPool, ThreadPool},
    SyncedStream,
};
use slog::{debug, info, o, warn, Drain, Level};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

fn main() -> dirstat::Result<()> {
    let matches = command!()
        .about("Count directories, files, lines, words and letters under a path, timing every pool size")
        .args(&[
            Arg::new("path")
                .value_name("PATH")
                .help("Directory to analyze; asked for interactively when missing or invalid")
                .value_parser(value_parser!(PathBuf))
                .required(false),
            Arg::new("max_threads")
                .long("max-threads")
                .value_name("N")
                .help("Largest pool size to benchmark [default: number of CPUs]")
                .value_parser(value_parser!(usize))
                .required(false),
            Arg::new("pool")
                .long("pool")
                .value_name("POOL")
                .help("Thread pool implementation")
                .value_parser(["task", "shared", "rayon"])
                .default_value("task"),
            Arg::new("sleep_us")
                .long("sleep-us")
                .value_name("MICROS")
                .help("Polling interval of the task pool, 0 to yield")
                .value_parser(value_parser!(u64))
                .default_value("1000"),
            Arg::new("list")
                .long("list")
                .help("Print every directory and file found")
                .action(ArgAction::SetTrue),
            Arg::new("json")
                .long("json")
                .help("Print the report as JSON")
                .action(ArgAction::SetTrue),
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log debug messages")
                .action(ArgAction::SetTrue),
        ])
        .get_matches();

    let level = if matches.get_flag("verbose") {
        Level::Debug
    } else {
        Level::Info
    };
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let logger = slog::Logger::root(drain, o!());

    let root = match matches.get_one::<PathBuf>("path") {
        Some(path) if path.exists() => path.clone(),
        given => {
            if let Some(path) = given {
                warn!(logger, "path {} does not exist", path.display());
            }
            prompt_path(io::stdin().lock(), io::stdout())?
        }
    };
    let max_threads = matches
        .get_one::<usize>("max_threads")
        .copied()
        .unwrap_or_else(num_cpus::get);
    let pool = matches
        .get_one::<String>("pool")
        .map_or(String::from("task"), |x| x.clone());
    let version = std::env!("CARGO_PKG_VERSION");
    info!(logger, "version v{version} with pool {pool}";
        "root" => %root.display(),
        "max_threads" => max_threads
    );

    let report = match pool.as_str() {
        "task" => {
            let sleep = matches.get_one::<u64>("sleep_us").copied().unwrap_or(1000);
            let config = PoolConfig {
                threads: max_threads,
                sleep: Duration::from_micros(sleep),
            };
            let pool = TaskPool::with_config(config, logger.clone())?;
            benchmark(pool, &root, max_threads, &matches, &logger)?
        }
        "shared" => {
            let pool = SharedQueueThreadPool::with_logger(max_threads, logger.clone())?;
            benchmark(pool, &root, max_threads, &matches, &logger)?
        }
        "rayon" => {
            let pool = RayonThreadPool::with_logger(max_threads, logger.clone())?;
            benchmark(pool, &root, max_threads, &matches, &logger)?
        }
        _ => unreachable!("`--pool` only accepts known pools"),
    };

    if !report.is_consistent() {
        warn!(logger, "runs disagree on the counters; was the tree modified?");
    }
    if matches.get_flag("json") {
        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
    } else {
        SyncedStream::stdout().print(report.render());
    }
    Ok(())
}

fn benchmark<P: ThreadPool>(
    pool: P,
    root: &Path,
    max_threads: usize,
    matches: &ArgMatches,
    logger: &slog::Logger,
) -> dirstat::Result<Report> {
    let pool = Arc::new(pool);
    let benchmark = if matches.get_flag("list") {
        Benchmark::with_listing(Arc::clone(&pool), logger.clone(), Arc::new(SyncedStream::stdout()))
    } else {
        Benchmark::new(Arc::clone(&pool), logger.clone())
    };
    let report = benchmark.run(root, max_threads)?;
    debug!(logger, "benchmark done"; "samples" => report.samples.len());
    Ok(report)
}
