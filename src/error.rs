use std::{error, fmt, io};

/// Error type for `dirstat`
#[derive(Debug)]
pub enum Error {
    /// std::io::Error, including failures to spawn worker threads
    Io(io::Error),
    /// serde_json::Error
    Json(serde_json::Error),
    /// rayon::ThreadPoolBuildError
    Rayon(rayon::ThreadPoolBuildError),
    /// Standard input closed before a valid path was given
    NoInput,
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(value)
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Error::Rayon(value)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{}", e),
            Self::Json(e) => write!(f, "{}", e),
            Self::Rayon(e) => write!(f, "{}", e),
            Self::NoInput => write!(f, "no path given before end of input"),
        }
    }
}

impl error::Error for Error {
    // benefit from default implementations
}

/// Result type for `dirstat`
pub type Result<T> = std::result::Result<T, Error>;
