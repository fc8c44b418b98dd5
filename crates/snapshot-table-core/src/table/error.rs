//! Error types and SNAFU context selectors for table operations.
//!
//! [`TableError`] is what every public operation returns. Semantic rejections
//! are grouped under [`ValidationError`] so callers can tell "this change can
//! never apply" apart from "the commit lost a race too many times".

use snafu::prelude::*;

use crate::{catalog::CommitError, expr::ExpressionError, manifest_io::ManifestError};

/// A change was rejected on semantic grounds. Never retried.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ValidationError {
    /// Files named for deletion are not live in the table.
    #[snafu(display("Missing required files to delete: {}", paths.join(", ")))]
    MissingDeleteFiles {
        /// Paths that are not live.
        paths: Vec<String>,
    },

    /// Strict validation saw a different current snapshot.
    #[snafu(display(
        "Modify operation requires no changes to timeline. Expected current snapshot {base:?}, found {current:?}"
    ))]
    TimelineChanged {
        /// Snapshot the operation was validated against.
        base: Option<i64>,
        /// Current snapshot at commit time.
        current: Option<i64>,
    },

    /// An intervening snapshot changed a file overlapping the filter.
    #[snafu(display(
        "Modify operation requires no in-range changes to timeline. Snapshot {snapshot_id} changed {path}"
    ))]
    InRangeConflict {
        /// The intervening snapshot.
        snapshot_id: i64,
        /// The conflicting data file.
        path: String,
    },

    /// The history between the base and the current snapshot is incomplete.
    #[snafu(display(
        "Modify operation requires the timeline to be present. Cannot find snapshot {snapshot_id}"
    ))]
    TimelineMissing {
        /// The snapshot that could not be resolved.
        snapshot_id: i64,
    },

    /// The current snapshot was named for expiration.
    #[snafu(display("Cannot expire {snapshot_id}: it is the current snapshot"))]
    CurrentSnapshotExpiration {
        /// The current snapshot id.
        snapshot_id: i64,
    },
}

/// Errors from table operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// The change was rejected; table state is unchanged.
    #[snafu(display("Validation failed: {source}"))]
    Validation {
        /// Why the change was rejected.
        source: ValidationError,
    },

    /// Every commit attempt lost to a concurrent writer.
    #[snafu(display("Commit failed after {attempts} attempts: {source}"))]
    CommitFailed {
        /// Attempts made, including the first.
        attempts: u32,
        /// The last retryable failure.
        #[snafu(source, backtrace)]
        source: CommitError,
    },

    /// The metadata store failed in a way that is not a version conflict.
    #[snafu(display("Metadata store error: {source}"))]
    MetadataStore {
        /// Underlying store error.
        #[snafu(source, backtrace)]
        source: CommitError,
    },

    /// The swap itself failed without a conflict; it may have been applied.
    #[snafu(display("Commit state unknown: {source}"))]
    CommitStateUnknown {
        /// Error returned by the swap.
        #[snafu(source, backtrace)]
        source: CommitError,
    },

    /// A manifest could not be read or written.
    #[snafu(display("Manifest error: {source}"))]
    Manifest {
        /// Underlying manifest error.
        #[snafu(source, backtrace)]
        source: ManifestError,
    },

    /// A filter expression does not bind to the table schema.
    #[snafu(display("Invalid expression: {source}"))]
    Expression {
        /// Underlying binding error.
        source: ExpressionError,
    },

    /// The API was used out of order.
    #[snafu(display("{message}"))]
    IllegalState {
        /// What was wrong.
        message: String,
    },

    /// An argument was rejected.
    #[snafu(display("{message}"))]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },
}

impl From<ValidationError> for TableError {
    fn from(source: ValidationError) -> Self {
        TableError::Validation { source }
    }
}

impl TableError {
    /// Whether the failed commit may have been published anyway.
    ///
    /// Only a swap that failed without a conflict leaves this unknown;
    /// callers must not clean up written files in that case. Failed reads
    /// of the current metadata publish nothing.
    pub fn commit_state_unknown(&self) -> bool {
        matches!(self, TableError::CommitStateUnknown { .. })
    }

    /// The validation failure, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            TableError::Validation { source } => Some(source),
            _ => None,
        }
    }
}
