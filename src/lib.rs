#![deny(missing_docs)]
//! `dirstat` counts directories, files, lines, words and letters under a
//! directory using a pool of worker threads, and times the traversal for
//! every pool size up to the machine's hardware concurrency.

pub use error::{Error, Result};
pub use sink::SyncedStream;
pub use stats::{Stats, Summary};

pub mod benchmark;
mod error;
pub mod prompt;
pub mod scan;
mod sink;
mod stats;
pub mod thread_pool;
pub mod traversal;
