//! File-backed metadata store.
//!
//! Layout:
//!   <root>/metadata/v0000000000.metadata.json
//!   <root>/metadata/v0000000001.metadata.json
//!   <root>/metadata/CURRENT
//!
//! ## Concurrency semantics
//!
//! The check on `CURRENT` is advisory: two writers may both observe the same
//! version and attempt to publish the same successor. The actual guard is
//! the create-only write of the versioned metadata file. The loser of that
//! race sees `AlreadyExists`, reported here as [`CommitError::Conflict`] so
//! the commit driver re-stages and retries.
//!
//! If a writer crashes after creating the metadata file but before updating
//! `CURRENT`, the orphaned file is ignored by readers and the next writer
//! targeting that version observes a conflict. Recovery of such orphans is
//! not attempted.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use log::debug;
use snafu::{Backtrace, prelude::*};

use super::{
    CommitError, ConflictSnafu, CorruptStateSnafu, MetadataStore, StorageSnafu,
    TableAlreadyExistsSnafu, TableNotFoundSnafu,
};
use crate::{
    layout,
    metadata::TableMetadata,
    storage::{self, StorageError, TableLocation},
};

/// Metadata store keeping versioned JSON files under a table root.
#[derive(Debug)]
pub struct FileMetadataStore {
    location: TableLocation,
    cached: Mutex<Option<Arc<TableMetadata>>>,
}

impl FileMetadataStore {
    /// Create a store rooted at a table directory.
    pub fn new(location: TableLocation) -> Self {
        Self {
            location,
            cached: Mutex::new(None),
        }
    }

    /// The table root.
    pub fn location(&self) -> &TableLocation {
        &self.location
    }

    fn cache(&self, metadata: &Arc<TableMetadata>) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(metadata));
    }

    fn cached_version(&self, version: u64) -> Option<Arc<TableMetadata>> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|m| m.version == version)
            .cloned()
    }

    /// Load the `CURRENT` version pointer; `None` when no table exists.
    pub async fn load_current_version(&self) -> Result<Option<u64>, CommitError> {
        let rel = layout::current_rel_path();
        let contents = match storage::read_to_string(&self.location, &rel).await {
            Ok(s) => s,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(source) => return Err(CommitError::Storage { source }),
        };

        let trimmed = contents.trim();
        ensure!(
            !trimmed.is_empty(),
            CorruptStateSnafu {
                msg: format!("CURRENT has empty content at {rel:?}"),
            }
        );
        let version = trimmed
            .parse::<u64>()
            .map_err(|e| CommitError::CorruptState {
                msg: format!("CURRENT has invalid content {trimmed:?}: {e}"),
                backtrace: Backtrace::capture(),
            })?;
        Ok(Some(version))
    }

    /// Load the metadata published as `version`.
    pub async fn load_version(&self, version: u64) -> Result<TableMetadata, CommitError> {
        let rel = layout::metadata_rel_path(version);
        let json = storage::read_to_string(&self.location, &rel)
            .await
            .context(StorageSnafu)?;
        let metadata: TableMetadata =
            serde_json::from_str(&json).map_err(|e| CommitError::CorruptState {
                msg: format!("failed to parse metadata version {version}: {e}"),
                backtrace: Backtrace::capture(),
            })?;

        ensure!(
            metadata.version == version,
            CorruptStateSnafu {
                msg: format!(
                    "metadata file for version {version} records version {}",
                    metadata.version
                ),
            }
        );
        metadata
            .check_consistency()
            .map_err(|msg| CommitError::CorruptState {
                msg: format!("metadata version {version}: {msg}"),
                backtrace: Backtrace::capture(),
            })?;
        Ok(metadata)
    }

    async fn publish(&self, metadata: TableMetadata) -> Result<Arc<TableMetadata>, CommitError> {
        let version = metadata.version;
        let json = serde_json::to_vec_pretty(&metadata).map_err(|e| CommitError::CorruptState {
            msg: format!("failed to serialize metadata version {version}: {e}"),
            backtrace: Backtrace::capture(),
        })?;

        storage::write_new(&self.location, &layout::metadata_rel_path(version), &json)
            .await
            .context(StorageSnafu)?;

        let current = format!("{version}\n");
        storage::write_atomic(
            &self.location,
            &layout::current_rel_path(),
            current.as_bytes(),
        )
        .await
        .context(StorageSnafu)?;

        let metadata = Arc::new(metadata);
        self.cache(&metadata);
        debug!(
            "Published metadata version {version} at {}",
            self.location.display()
        );
        Ok(metadata)
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn create(&self, mut metadata: TableMetadata) -> Result<Arc<TableMetadata>, CommitError> {
        let location = self.location.display();
        if self.load_current_version().await?.is_some() {
            return TableAlreadyExistsSnafu { location }.fail();
        }
        metadata.version = 0;
        match self.publish(metadata).await {
            Err(CommitError::Storage {
                source: StorageError::AlreadyExists { .. },
            }) => TableAlreadyExistsSnafu { location }.fail(),
            other => other,
        }
    }

    async fn read_current(&self) -> Result<Arc<TableMetadata>, CommitError> {
        let version = self
            .load_current_version()
            .await?
            .context(TableNotFoundSnafu {
                location: self.location.display(),
            })?;
        if let Some(cached) = self.cached_version(version) {
            return Ok(cached);
        }
        let metadata = Arc::new(self.load_version(version).await?);
        self.cache(&metadata);
        Ok(metadata)
    }

    async fn commit(
        &self,
        base: &TableMetadata,
        mut next: TableMetadata,
    ) -> Result<Arc<TableMetadata>, CommitError> {
        // 1) Advisory guard on CURRENT
        let current = self
            .load_current_version()
            .await?
            .context(TableNotFoundSnafu {
                location: self.location.display(),
            })?;
        ensure!(
            current == base.version,
            ConflictSnafu {
                expected: base.version,
                found: current,
            }
        );

        // 2) Next version with overflow guard
        let version = base.version.checked_add(1).context(CorruptStateSnafu {
            msg: "version counter overflow".to_string(),
        })?;
        next.version = version;

        // 3) Create-only write is the real guard; losing the race is a conflict.
        match self.publish(next).await {
            Err(CommitError::Storage {
                source: StorageError::AlreadyExists { .. },
            }) => ConflictSnafu {
                expected: base.version,
                found: version,
            }
            .fail(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::metadata::{NestedField, PartitionSpec, PrimitiveType, Schema};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn create_test_store() -> (TempDir, FileMetadataStore) {
        let tmp = TempDir::new().expect("create temp dir");
        let store = FileMetadataStore::new(TableLocation::local(tmp.path()));
        (tmp, store)
    }

    fn new_metadata(tmp: &TempDir) -> TableMetadata {
        let schema =
            Schema::new(vec![NestedField::required(1, "id", PrimitiveType::Long)]).expect("schema");
        TableMetadata::new(
            schema,
            PartitionSpec::unpartitioned(),
            tmp.path().display().to_string(),
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn read_current_without_table_is_not_found() -> TestResult {
        let (_tmp, store) = create_test_store();

        assert_eq!(store.load_current_version().await?, None);
        let err = store.read_current().await.expect_err("no table");
        assert!(matches!(err, CommitError::TableNotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn create_writes_version_zero_and_current() -> TestResult {
        let (tmp, store) = create_test_store();

        let created = store.create(new_metadata(&tmp)).await?;

        assert_eq!(created.version, 0);
        let current = tokio::fs::read_to_string(tmp.path().join("metadata/CURRENT")).await?;
        assert_eq!(current, "0\n");
        assert!(
            tmp.path()
                .join("metadata/v0000000000.metadata.json")
                .exists()
        );

        let err = store.create(new_metadata(&tmp)).await.expect_err("exists");
        assert!(matches!(err, CommitError::TableAlreadyExists { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn commit_advances_version_and_rejects_stale_base() -> TestResult {
        let (tmp, store) = create_test_store();
        let base = store.create(new_metadata(&tmp)).await?;

        let mut props = BTreeMap::new();
        props.insert("k".to_string(), "v".to_string());
        let v1 = store.commit(&base, base.with_properties(props)).await?;
        assert_eq!(v1.version, 1);

        let err = store
            .commit(&base, base.with_properties(BTreeMap::new()))
            .await
            .expect_err("stale base");
        match err {
            CommitError::Conflict {
                expected, found, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }

        let current = store.read_current().await?;
        assert_eq!(current.version, 1);
        assert_eq!(current.properties.get("k").map(String::as_str), Some("v"));
        Ok(())
    }

    #[tokio::test]
    async fn lost_create_race_is_a_conflict() -> TestResult {
        let (tmp, store) = create_test_store();
        let base = store.create(new_metadata(&tmp)).await?;

        // another writer already created version 1 but has not moved CURRENT yet
        tokio::fs::write(tmp.path().join("metadata/v0000000001.metadata.json"), b"{}").await?;

        let err = store
            .commit(&base, base.with_properties(BTreeMap::new()))
            .await
            .expect_err("lost race");
        assert!(err.is_retryable());
        assert_eq!(store.load_current_version().await?, Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn reopened_store_reads_published_metadata() -> TestResult {
        let (tmp, store) = create_test_store();
        let base = store.create(new_metadata(&tmp)).await?;
        store
            .commit(&base, base.with_properties(BTreeMap::new()))
            .await?;

        let reopened = FileMetadataStore::new(TableLocation::local(tmp.path()));
        let current = reopened.read_current().await?;
        assert_eq!(current.version, 1);
        assert_eq!(current.table_uuid, base.table_uuid);

        // repeated reads of the same version share one value
        let again = reopened.read_current().await?;
        assert!(Arc::ptr_eq(&current, &again));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_current_is_reported() -> TestResult {
        let (tmp, store) = create_test_store();
        tokio::fs::create_dir_all(tmp.path().join("metadata")).await?;
        tokio::fs::write(tmp.path().join("metadata/CURRENT"), "not-a-number").await?;

        let err = store.load_current_version().await.expect_err("corrupt");
        assert!(matches!(err, CommitError::CorruptState { .. }));
        Ok(())
    }
}
