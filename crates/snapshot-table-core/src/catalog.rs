//! The metadata store: where the current [`TableMetadata`] pointer lives.
//!
//! A store offers exactly one mutation, [`MetadataStore::commit`], which
//! publishes new metadata only if the store still points at the base the
//! caller staged against (compare-and-swap on
//! [`TableMetadata::version`]). Everything above this layer (retries,
//! re-staging, cleanup) is built on that single guarantee.
//!
//! Two implementations are provided:
//!
//! - [`FileMetadataStore`] keeps one JSON file per metadata version plus a
//!   `CURRENT` pointer under the table root.
//! - [`InMemoryMetadataStore`] keeps the pointer in memory and can inject
//!   commit failures for tests.

pub mod file_store;
pub mod memory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use snafu::{Backtrace, prelude::*};

use crate::{metadata::TableMetadata, storage::StorageError};

pub use file_store::FileMetadataStore;
pub use memory::InMemoryMetadataStore;

/// Errors from a [`MetadataStore`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommitError {
    /// The store no longer points at the caller's base version.
    #[snafu(display("Commit conflict: expected version {expected}, but CURRENT is {found}"))]
    Conflict {
        /// The base version the caller staged against.
        expected: u64,
        /// The version the store points at.
        found: u64,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// The store rejected the swap for another concurrency reason.
    #[snafu(display("Concurrent modification: {message}"))]
    ConcurrentModification {
        /// Why the swap was rejected.
        message: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// No table exists in the store.
    #[snafu(display("Table does not exist: {location}"))]
    TableNotFound {
        /// Table location.
        location: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A table already exists in the store.
    #[snafu(display("Table already exists: {location}"))]
    TableAlreadyExists {
        /// Table location.
        location: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Underlying storage error.
    #[snafu(display("Storage error while accessing table metadata: {source}"))]
    Storage {
        /// Storage failure.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// Stored metadata is malformed.
    #[snafu(display("Corrupt metadata state: {msg}"))]
    CorruptState {
        /// Description of the problem.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

impl CommitError {
    /// Whether re-staging against fresh metadata may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommitError::Conflict { .. } | CommitError::ConcurrentModification { .. }
        )
    }
}

/// Holds the authoritative pointer to a table's current metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync + fmt::Debug {
    /// Publish the initial metadata (version 0) of a new table.
    async fn create(&self, metadata: TableMetadata) -> Result<Arc<TableMetadata>, CommitError>;

    /// The current metadata.
    async fn read_current(&self) -> Result<Arc<TableMetadata>, CommitError>;

    /// Publish `next` if the store still points at `base`.
    ///
    /// On success the returned metadata carries the version assigned by the
    /// store. A retryable error means nothing was published.
    async fn commit(
        &self,
        base: &TableMetadata,
        next: TableMetadata,
    ) -> Result<Arc<TableMetadata>, CommitError>;
}
