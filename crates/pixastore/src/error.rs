//! Error types for pixastore

use std::fmt;
use std::io;

/// Result type alias for pixastore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for disk cache operations
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Journal is corrupt (bad header or unparseable record)
    Corrupt(String),

    /// Key does not match `[a-z0-9_-]{1,64}`
    InvalidKey(String),

    /// Invalid argument (zero bound, zero slot count, ...)
    InvalidArgument(&'static str),

    /// Operation performed in an illegal state (e.g. commit of a detached editor)
    IllegalState(&'static str),

    /// Cache is closed
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Corrupt(msg) => write!(f, "Journal corrupt: {}", msg),
            Error::InvalidKey(key) => {
                write!(f, "Keys must match [a-z0-9_-]{{1,64}}: {:?}", key)
            }
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
            Error::Closed => write!(f, "Cache is closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
