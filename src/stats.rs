use crate::scan::FileStats;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate counters shared by every traversal task.
#[derive(Debug, Default)]
pub struct Stats {
    directories: AtomicU64,
    files: AtomicU64,
    empty_lines: AtomicU64,
    nonempty_lines: AtomicU64,
    words: AtomicU64,
    letters: AtomicU64,
    errors: AtomicU64,
}

/// A point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Directories visited, the root included.
    pub directories: u64,
    /// Regular files found.
    pub files: u64,
    /// Empty lines over all files.
    pub empty_lines: u64,
    /// Non-empty lines over all files.
    pub nonempty_lines: u64,
    /// Words over all files.
    pub words: u64,
    /// ASCII letters over all files.
    pub letters: u64,
    /// Directories, entries or files that could not be read.
    pub errors: u64,
}

impl Stats {
    /// Count one directory.
    pub fn record_directory(&self) {
        self.directories.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one regular file and add its text statistics.
    pub fn record_file(&self, file: &FileStats) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.empty_lines
            .fetch_add(file.empty_lines, Ordering::Relaxed);
        self.nonempty_lines
            .fetch_add(file.nonempty_lines, Ordering::Relaxed);
        self.words.fetch_add(file.words, Ordering::Relaxed);
        self.letters.fetch_add(file.letters, Ordering::Relaxed);
    }

    /// Count one failure.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Read every counter.
    ///
    /// Only consistent once the tasks writing to it have been waited for.
    pub fn snapshot(&self) -> Summary {
        Summary {
            directories: self.directories.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            empty_lines: self.empty_lines.load(Ordering::Relaxed),
            nonempty_lines: self.nonempty_lines.load(Ordering::Relaxed),
            words: self.words.load(Ordering::Relaxed),
            letters: self.letters.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn counters(&self) -> [&AtomicU64; 7] {
        [
            &self.directories,
            &self.files,
            &self.empty_lines,
            &self.nonempty_lines,
            &self.words,
            &self.letters,
            &self.errors,
        ]
    }
}
