use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// The failure a [`super::FileIO`] implementation saw, before path context
/// is attached.
#[derive(Debug)]
pub enum BackendError {
    /// The local filesystem refused the operation.
    Local(io::Error),
    /// [`super::MemoryFileIO`] refused the operation.
    Memory(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
            BackendError::Memory(msg) => write!(f, "in-memory storage error: {msg}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
            BackendError::Memory(_) => None,
        }
    }
}

/// Failures reading or writing manifests and metadata versions.
///
/// The two kinds callers branch on get their own variants: a missing file
/// (an absent `CURRENT` pointer, a manifest already cleaned up) and a file
/// that already exists (a metadata version another writer claimed first).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// No file at `path`.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// Table-relative path.
        path: String,
        /// Backend failure.
        source: BackendError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A create-new write found `path` taken.
    #[snafu(display("Path already exists: {path}"))]
    AlreadyExists {
        /// Table-relative path.
        path: String,
        /// Backend failure.
        source: BackendError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Anything else the backend reported.
    #[snafu(display("I/O error at {path}: {source}"))]
    OtherIo {
        /// Table-relative path.
        path: String,
        /// Backend failure.
        source: BackendError,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// Whether the file was simply not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
