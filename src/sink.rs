use std::{
    fmt::Display,
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

/// A writer shared between threads that never interleaves two messages.
///
/// Each message is written and flushed under one lock; which of two racing
/// messages comes first is unspecified. Write errors are ignored.
pub struct SyncedStream {
    out: Mutex<Box<dyn Write + Send>>,
}

impl SyncedStream {
    /// Wrap `out`.
    pub fn new<W: Write + Send + 'static>(out: W) -> SyncedStream {
        SyncedStream {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Write to standard output.
    pub fn stdout() -> SyncedStream {
        Self::new(io::stdout())
    }

    /// Write `message` as is.
    pub fn print(&self, message: impl Display) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = write!(out, "{message}").and_then(|_| out.flush());
    }

    /// Write `message` followed by a newline.
    pub fn println(&self, message: impl Display) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{message}").and_then(|_| out.flush());
    }
}

impl Default for SyncedStream {
    fn default() -> Self {
        Self::stdout()
    }
}
