//! The table handle.
//!
//! A [`Table`] bundles the three collaborators every operation needs: the
//! [`MetadataStore`] holding the current metadata pointer, the [`FileIO`]
//! used for manifests and cleanup, and the [`ManifestIO`] codec. The handle
//! itself holds no table state; every read goes to the store, so a handle
//! always observes the latest committed metadata.

mod error;
mod scan;

use std::{collections::BTreeMap, sync::Arc};

use snafu::prelude::*;

use crate::{
    catalog::{FileMetadataStore, MetadataStore},
    manifest_io::{JsonManifestIO, ManifestIO},
    metadata::{PartitionSpec, Schema, Snapshot, TableMetadata},
    storage::{FileIO, LocalFileIO, TableLocation},
    transaction::Transaction,
    update::{
        AppendFiles, DeleteFiles, ExpireSnapshots, ModifyFiles, OperationCore, RewriteFiles,
        UpdateProperties,
    },
};

pub(crate) use error::{
    CommitFailedSnafu, CommitStateUnknownSnafu, CurrentSnapshotExpirationSnafu, ExpressionSnafu,
    IllegalStateSnafu, InRangeConflictSnafu, InvalidArgumentSnafu, ManifestSnafu,
    MetadataStoreSnafu, TimelineChangedSnafu, TimelineMissingSnafu,
};
pub use error::{TableError, ValidationError};
pub use scan::TableScan;

/// Handle to a table.
#[derive(Debug, Clone)]
pub struct Table {
    store: Arc<dyn MetadataStore>,
    io: Arc<dyn FileIO>,
    manifest_io: Arc<dyn ManifestIO>,
}

impl Table {
    /// A handle over existing collaborators, storing manifests as JSON
    /// through `io`.
    pub fn new(store: Arc<dyn MetadataStore>, io: Arc<dyn FileIO>) -> Self {
        let manifest_io: Arc<dyn ManifestIO> = Arc::new(JsonManifestIO::new(Arc::clone(&io)));
        Self {
            store,
            io,
            manifest_io,
        }
    }

    /// Publish `metadata` as a new table in `store`.
    pub async fn create(
        store: Arc<dyn MetadataStore>,
        io: Arc<dyn FileIO>,
        metadata: TableMetadata,
    ) -> Result<Self, TableError> {
        store.create(metadata).await.context(MetadataStoreSnafu)?;
        Ok(Self::new(store, io))
    }

    /// Open the table held by `store`.
    pub async fn open(
        store: Arc<dyn MetadataStore>,
        io: Arc<dyn FileIO>,
    ) -> Result<Self, TableError> {
        store.read_current().await.context(MetadataStoreSnafu)?;
        Ok(Self::new(store, io))
    }

    /// Create a table on the local filesystem rooted at `location`.
    pub async fn create_local(
        location: TableLocation,
        schema: Schema,
        partition_spec: PartitionSpec,
        properties: BTreeMap<String, String>,
    ) -> Result<Self, TableError> {
        let metadata = TableMetadata::new(schema, partition_spec, location.display(), properties);
        let (store, io) = local_collaborators(location);
        Self::create(store, io, metadata).await
    }

    /// Open a table on the local filesystem rooted at `location`.
    pub async fn open_local(location: TableLocation) -> Result<Self, TableError> {
        let (store, io) = local_collaborators(location);
        Self::open(store, io).await
    }

    /// The metadata store.
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// File access for manifests and cleanup.
    pub fn file_io(&self) -> &Arc<dyn FileIO> {
        &self.io
    }

    /// The manifest codec.
    pub fn manifest_io(&self) -> &Arc<dyn ManifestIO> {
        &self.manifest_io
    }

    /// The latest committed metadata.
    pub async fn metadata(&self) -> Result<Arc<TableMetadata>, TableError> {
        self.store.read_current().await.context(MetadataStoreSnafu)
    }

    /// The latest committed current snapshot.
    pub async fn current_snapshot(&self) -> Result<Option<Snapshot>, TableError> {
        Ok(self.metadata().await?.current_snapshot().cloned())
    }

    /// Start an append with manifest merging.
    pub fn new_append(&self) -> AppendFiles<'_> {
        AppendFiles::new(OperationCore::for_table(self), false)
    }

    /// Start an append that never merges manifests.
    pub fn new_fast_append(&self) -> AppendFiles<'_> {
        AppendFiles::new(OperationCore::for_table(self), true)
    }

    /// Start a delete.
    pub fn new_delete(&self) -> DeleteFiles<'_> {
        DeleteFiles::new(OperationCore::for_table(self))
    }

    /// Start a rewrite.
    pub fn new_rewrite(&self) -> RewriteFiles<'_> {
        RewriteFiles::new(OperationCore::for_table(self))
    }

    /// Start a modify.
    pub fn new_modify(&self) -> ModifyFiles<'_> {
        ModifyFiles::new(OperationCore::for_table(self))
    }

    /// Start a snapshot expiration.
    pub fn expire_snapshots(&self) -> ExpireSnapshots<'_> {
        ExpireSnapshots::new(OperationCore::for_table(self))
    }

    /// Start a property update.
    pub fn update_properties(&self) -> UpdateProperties<'_> {
        UpdateProperties::new(OperationCore::for_table(self))
    }

    /// Start a transaction based on the latest committed metadata.
    pub async fn new_transaction(&self) -> Result<Transaction, TableError> {
        let base = self.metadata().await?;
        Ok(Transaction::new(self.clone(), base))
    }

    /// Scan the latest committed metadata.
    pub fn new_scan(&self) -> TableScan {
        TableScan::of_store(Arc::clone(&self.manifest_io), Arc::clone(&self.store))
    }
}

fn local_collaborators(location: TableLocation) -> (Arc<dyn MetadataStore>, Arc<dyn FileIO>) {
    let store: Arc<dyn MetadataStore> = Arc::new(FileMetadataStore::new(location.clone()));
    let io: Arc<dyn FileIO> = Arc::new(LocalFileIO::new(location));
    (store, io)
}
