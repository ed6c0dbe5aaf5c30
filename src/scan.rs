//! Line, word and letter counting for a single file.

use crate::Result;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

/// Text statistics of one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    /// Lines with no bytes besides the line terminator.
    pub empty_lines: u64,
    /// All other lines.
    pub nonempty_lines: u64,
    /// Space-separated tokens.
    pub words: u64,
    /// ASCII letters.
    pub letters: u64,
}

impl FileStats {
    fn add_line(&mut self, line: &[u8]) {
        if line.is_empty() {
            self.empty_lines += 1;
            return;
        }
        self.nonempty_lines += 1;
        self.letters += line.iter().filter(|b| b.is_ascii_alphabetic()).count() as u64;
        self.words += line.split(|&b| b == b' ').filter(|w| !w.is_empty()).count() as u64;
    }
}

/// Scan everything `reader` yields.
///
/// Works on raw bytes, so non-UTF-8 input is counted rather than rejected.
pub fn scan_reader<R: BufRead>(mut reader: R) -> io::Result<FileStats> {
    let mut stats = FileStats::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        stats.add_line(&line);
    }
    Ok(stats)
}

/// Open and scan the file at `path`.
pub fn scan_file(path: &Path) -> Result<FileStats> {
    let file = File::open(path)?;
    Ok(scan_reader(BufReader::new(file))?)
}
