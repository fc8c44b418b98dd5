//! Optimistic commit with retry.
//!
//! A commit reads the current metadata, stages a candidate on top of it and
//! asks the store to swap. When the swap loses to a concurrent writer the
//! change is staged again on the new current metadata and the swap retried,
//! up to the table's configured retry count, with exponential backoff in
//! between. Validation failures end the loop immediately.

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use log::{info, warn};
use snafu::{IntoError, prelude::*};

use crate::{
    catalog::MetadataStore,
    manifest_io::ManifestIO,
    metadata::TableMetadata,
    table::{CommitFailedSnafu, CommitStateUnknownSnafu, MetadataStoreSnafu, Table, TableError},
};

use super::{
    PendingUpdate,
    cleanup::{self, Deleter},
};

/// Something that can produce candidate metadata from a base, repeatedly.
#[async_trait]
pub(crate) trait Stage: Send {
    /// Candidate metadata layered on `base`.
    async fn stage(
        &mut self,
        io: &dyn ManifestIO,
        base: &TableMetadata,
    ) -> Result<TableMetadata, TableError>;
}

/// Outcome of a successful commit.
#[derive(Debug)]
pub(crate) struct Committed {
    /// The base the winning attempt was staged on.
    pub base: Arc<TableMetadata>,
    /// The published metadata.
    pub metadata: Arc<TableMetadata>,
}

/// Stage and publish, re-staging on conflicts.
///
/// `primed` supplies an already staged first attempt.
pub(crate) async fn commit_with_retry<S: Stage + ?Sized>(
    store: &dyn MetadataStore,
    io: &dyn ManifestIO,
    stager: &mut S,
    primed: Option<(Arc<TableMetadata>, TableMetadata)>,
) -> Result<Committed, TableError> {
    let (mut base, mut next) = match primed {
        Some(primed) => primed,
        None => {
            let base = store.read_current().await.context(MetadataStoreSnafu)?;
            let next = stager.stage(io, &base).await?;
            (base, next)
        }
    };
    let config = base.commit_config();

    let mut attempt = 1u32;
    loop {
        match store.commit(&base, next).await {
            Ok(metadata) => {
                info!(
                    "Committed metadata version {} (snapshot {:?}) after {attempt} attempt(s)",
                    metadata.version, metadata.current_snapshot_id
                );
                return Ok(Committed { base, metadata });
            }
            Err(e) if e.is_retryable() && attempt <= config.num_retries => {
                let wait = config.backoff(attempt);
                warn!("Commit attempt {attempt} failed, retrying in {wait:?}: {e}");
                tokio::time::sleep(wait).await;
                attempt += 1;
                base = store.read_current().await.context(MetadataStoreSnafu)?;
                next = stager.stage(io, &base).await?;
            }
            Err(e) if e.is_retryable() => {
                return Err(CommitFailedSnafu { attempts: attempt }.into_error(e));
            }
            Err(e) => return Err(CommitStateUnknownSnafu.into_error(e)),
        }
    }
}

/// Commit a single operation directly to its table and clean up after it.
pub(crate) async fn commit_update(
    table: &Table,
    mut update: PendingUpdate,
    deleter: Deleter,
) -> Result<Arc<TableMetadata>, TableError> {
    let result = commit_with_retry(
        table.store().as_ref(),
        table.manifest_io().as_ref(),
        &mut update,
        None,
    )
    .await;

    match result {
        Ok(committed) => {
            let mut candidates: BTreeSet<String> = update.written_files();
            candidates.extend(committed.base.manifest_paths());
            cleanup::delete_unreachable(candidates, &committed.metadata, &deleter).await;
            Ok(committed.metadata)
        }
        Err(e) => {
            if e.commit_state_unknown() {
                warn!(
                    "Commit state unknown for {}; keeping written manifests: {e}",
                    update.name()
                );
            } else {
                cleanup::delete_all(&update.written_files(), table.file_io().as_ref()).await;
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicU32, Ordering},
    };

    use super::*;
    use crate::{
        catalog::{
            CommitError, ConcurrentModificationSnafu, CorruptStateSnafu, InMemoryMetadataStore,
        },
        manifest_io::JsonManifestIO,
        metadata::{DataFile, NestedField, PartitionSpec, PrimitiveType, Schema, properties},
        storage::MemoryFileIO,
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Sets a property and counts how often it was staged.
    struct CountingStage {
        staged: u32,
    }

    #[async_trait]
    impl Stage for CountingStage {
        async fn stage(
            &mut self,
            _io: &dyn ManifestIO,
            base: &TableMetadata,
        ) -> Result<TableMetadata, TableError> {
            self.staged += 1;
            let mut props = base.properties.clone();
            props.insert("staged".into(), self.staged.to_string());
            Ok(base.with_properties(props))
        }
    }

    /// Wraps a store: swaps never succeed, and reads fail once `reads` run out.
    #[derive(Debug)]
    struct BrokenStore {
        inner: InMemoryMetadataStore,
        reads: AtomicU32,
        swap_corrupts: bool,
    }

    #[async_trait]
    impl MetadataStore for BrokenStore {
        async fn create(&self, metadata: TableMetadata) -> Result<Arc<TableMetadata>, CommitError> {
            self.inner.create(metadata).await
        }

        async fn read_current(&self) -> Result<Arc<TableMetadata>, CommitError> {
            let left = self
                .reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if left.is_err() {
                return CorruptStateSnafu {
                    msg: "unreadable pointer",
                }
                .fail();
            }
            self.inner.read_current().await
        }

        async fn commit(
            &self,
            _base: &TableMetadata,
            _next: TableMetadata,
        ) -> Result<Arc<TableMetadata>, CommitError> {
            if self.swap_corrupts {
                return CorruptStateSnafu {
                    msg: "write not acknowledged",
                }
                .fail();
            }
            ConcurrentModificationSnafu {
                message: "always behind",
            }
            .fail()
        }
    }

    fn metadata(retries: &str) -> TableMetadata {
        let schema =
            Schema::new(vec![NestedField::required(1, "id", PrimitiveType::Long)]).expect("schema");
        let props = BTreeMap::from([
            (
                properties::COMMIT_NUM_RETRIES.to_string(),
                retries.to_string(),
            ),
            (
                properties::COMMIT_MIN_RETRY_WAIT_MS.to_string(),
                "1".to_string(),
            ),
        ]);
        TableMetadata::new(schema, PartitionSpec::unpartitioned(), "memory", props)
    }

    async fn store_with_retries(retries: &str) -> Result<InMemoryMetadataStore, CommitError> {
        let store = InMemoryMetadataStore::new();
        store.create(metadata(retries)).await?;
        Ok(store)
    }

    async fn broken_table(
        reads: u32,
        swap_corrupts: bool,
    ) -> Result<(Table, MemoryFileIO), CommitError> {
        let inner = InMemoryMetadataStore::new();
        inner.create(metadata("2")).await?;
        let store = BrokenStore {
            inner,
            reads: AtomicU32::new(reads),
            swap_corrupts,
        };
        let io = MemoryFileIO::new();
        Ok((Table::new(Arc::new(store), Arc::new(io.clone())), io))
    }

    fn data_file() -> DataFile {
        DataFile::builder(&PartitionSpec::unpartitioned())
            .with_path("a.parquet")
            .with_file_size_in_bytes(10)
            .with_record_count(1)
            .build()
            .expect("data file")
    }

    fn manifest_io() -> JsonManifestIO {
        JsonManifestIO::new(Arc::new(MemoryFileIO::new()))
    }

    #[tokio::test]
    async fn retryable_failures_restage_until_success() -> TestResult {
        let store = store_with_retries("2").await?;
        store.fail_commits(2);
        let mut stager = CountingStage { staged: 0 };

        let committed = commit_with_retry(&store, &manifest_io(), &mut stager, None).await?;

        assert_eq!(stager.staged, 3);
        assert_eq!(store.commit_attempts(), 3);
        assert_eq!(committed.metadata.properties["staged"], "3");
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_retries_report_commit_failed() -> TestResult {
        let store = store_with_retries("1").await?;
        store.fail_commits(5);
        let mut stager = CountingStage { staged: 0 };

        let err = commit_with_retry(&store, &manifest_io(), &mut stager, None)
            .await
            .expect_err("exhausted");

        assert!(matches!(err, TableError::CommitFailed { attempts: 2, .. }));
        assert_eq!(store.read_current().await?.version, 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_read_during_retry_removes_written_manifests() -> TestResult {
        let (table, io) = broken_table(1, false).await?;

        let err = table
            .new_append()
            .append_file(data_file())
            .commit()
            .await
            .expect_err("unreadable on retry");

        assert!(matches!(err, TableError::MetadataStore { .. }));
        assert!(!err.commit_state_unknown());
        assert!(io.paths().is_empty());
        assert_eq!(io.deleted_paths().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_swap_keeps_written_manifests() -> TestResult {
        let (table, io) = broken_table(1, true).await?;

        let err = table
            .new_append()
            .append_file(data_file())
            .commit()
            .await
            .expect_err("swap not acknowledged");

        assert!(matches!(err, TableError::CommitStateUnknown { .. }));
        assert!(err.commit_state_unknown());
        assert_eq!(io.paths().len(), 1);
        assert!(io.deleted_paths().is_empty());
        Ok(())
    }
}
