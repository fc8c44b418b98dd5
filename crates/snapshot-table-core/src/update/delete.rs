//! Deleting data files.

use std::{collections::BTreeSet, sync::Arc};

use crate::{
    manifest_io::ManifestIO,
    metadata::{DataFile, Operation, TableMetadata},
    table::TableError,
};

use super::{
    OperationCore, PendingUpdate,
    producer::{FileChanges, SnapshotProducer},
};

pub(crate) const NAME: &str = "DeleteFiles";

#[derive(Debug)]
pub(crate) struct DeleteOp {
    paths: BTreeSet<String>,
    pub(crate) producer: SnapshotProducer,
}

impl DeleteOp {
    pub(crate) async fn stage(
        &mut self,
        io: &dyn ManifestIO,
        base: &TableMetadata,
    ) -> Result<TableMetadata, TableError> {
        let changes = FileChanges {
            deleted: self.paths.clone(),
            ..FileChanges::default()
        };
        self.producer
            .produce(io, base, &changes, Operation::Delete, true)
            .await
    }
}

/// Removes data files from a table.
///
/// Every named file must be live when the delete is staged; otherwise the
/// commit fails with a validation error listing the missing paths.
#[derive(Debug)]
pub struct DeleteFiles<'a> {
    core: OperationCore<'a>,
    op: DeleteOp,
}

impl<'a> DeleteFiles<'a> {
    pub(crate) fn new(core: OperationCore<'a>) -> Self {
        Self {
            core,
            op: DeleteOp {
                paths: BTreeSet::new(),
                producer: SnapshotProducer::new(),
            },
        }
    }

    /// Delete `file`.
    pub fn delete_file(self, file: &DataFile) -> Self {
        self.delete_path(file.path.clone())
    }

    /// Delete the file at `path`.
    pub fn delete_path(mut self, path: impl Into<String>) -> Self {
        self.op.paths.insert(path.into());
        self
    }

    /// Route deletion of superseded files through `callback`.
    pub fn delete_with(
        mut self,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<Self, TableError> {
        self.core.set_delete_callback(Arc::new(callback))?;
        Ok(self)
    }

    /// Stage and commit the delete.
    pub async fn commit(self) -> Result<Arc<TableMetadata>, TableError> {
        self.core.commit(PendingUpdate::Delete(self.op)).await
    }
}
