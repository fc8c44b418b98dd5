//! Appending data files.

use std::sync::Arc;

use snafu::prelude::*;

use crate::{
    manifest_io::ManifestIO,
    metadata::{DataFile, ManifestFile, Operation, TableMetadata},
    table::{InvalidArgumentSnafu, TableError},
};

use super::{
    OperationCore, PendingUpdate,
    producer::{FileChanges, SnapshotProducer},
};

pub(crate) const NAME: &str = "AppendFiles";
pub(crate) const FAST_NAME: &str = "FastAppend";

#[derive(Debug)]
pub(crate) struct AppendOp {
    fast: bool,
    added: Vec<DataFile>,
    appended: Vec<ManifestFile>,
    pub(crate) producer: SnapshotProducer,
}

impl AppendOp {
    pub(crate) fn name(&self) -> &'static str {
        if self.fast { FAST_NAME } else { NAME }
    }

    pub(crate) async fn stage(
        &mut self,
        io: &dyn ManifestIO,
        base: &TableMetadata,
    ) -> Result<TableMetadata, TableError> {
        let changes = FileChanges {
            added: &self.added,
            appended: &self.appended,
            ..FileChanges::default()
        };
        self.producer
            .produce(io, base, &changes, Operation::Append, !self.fast)
            .await
    }
}

/// Adds data files to a table.
///
/// The merging variant may combine the new manifest with small existing
/// ones (see the `commit.manifest.*` table properties); the fast variant
/// always writes a separate manifest.
#[derive(Debug)]
pub struct AppendFiles<'a> {
    core: OperationCore<'a>,
    op: AppendOp,
}

impl<'a> AppendFiles<'a> {
    pub(crate) fn new(core: OperationCore<'a>, fast: bool) -> Self {
        Self {
            core,
            op: AppendOp {
                fast,
                added: Vec::new(),
                appended: Vec::new(),
                producer: SnapshotProducer::new(),
            },
        }
    }

    /// Add a data file.
    pub fn append_file(mut self, file: DataFile) -> Self {
        self.op.added.push(file);
        self
    }

    /// Add every file of an externally written manifest.
    ///
    /// The manifest may only hold `Added` entries. Its entries are copied
    /// into a manifest owned by this operation; the input file is left alone.
    pub fn append_manifest(mut self, manifest: ManifestFile) -> Result<Self, TableError> {
        ensure!(
            manifest.existing_files_count == 0 && manifest.deleted_files_count == 0,
            InvalidArgumentSnafu {
                message: format!(
                    "Cannot append manifest {} with existing or deleted files",
                    manifest.path
                ),
            }
        );
        self.op.appended.push(manifest);
        Ok(self)
    }

    /// Route deletion of superseded files through `callback`.
    pub fn delete_with(
        mut self,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<Self, TableError> {
        self.core.set_delete_callback(Arc::new(callback))?;
        Ok(self)
    }

    /// Stage and commit the append.
    pub async fn commit(self) -> Result<Arc<TableMetadata>, TableError> {
        self.core.commit(PendingUpdate::Append(self.op)).await
    }
}
