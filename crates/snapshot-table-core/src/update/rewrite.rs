//! Replacing files without changing table contents (compaction).

use std::sync::Arc;

use snafu::prelude::*;

use crate::{
    manifest_io::ManifestIO,
    metadata::{DataFile, Operation, TableMetadata},
    table::{InvalidArgumentSnafu, TableError},
};

use super::{
    OperationCore, PendingUpdate,
    producer::{FileChanges, SnapshotProducer},
};

pub(crate) const NAME: &str = "RewriteFiles";

#[derive(Debug)]
pub(crate) struct RewriteOp {
    deleted: Vec<DataFile>,
    added: Vec<DataFile>,
    pub(crate) producer: SnapshotProducer,
}

impl RewriteOp {
    pub(crate) async fn stage(
        &mut self,
        io: &dyn ManifestIO,
        base: &TableMetadata,
    ) -> Result<TableMetadata, TableError> {
        ensure!(
            !self.deleted.is_empty(),
            InvalidArgumentSnafu {
                message: "Files to delete cannot be empty",
            }
        );
        ensure!(
            !self.added.is_empty(),
            InvalidArgumentSnafu {
                message: "Files to add cannot be empty",
            }
        );
        let changes = FileChanges {
            added: &self.added,
            deleted: self.deleted.iter().map(|f| f.path.clone()).collect(),
            ..FileChanges::default()
        };
        self.producer
            .produce(io, base, &changes, Operation::Replace, true)
            .await
    }
}

/// Atomically swaps one set of files for another holding the same rows.
#[derive(Debug)]
pub struct RewriteFiles<'a> {
    core: OperationCore<'a>,
    op: RewriteOp,
}

impl<'a> RewriteFiles<'a> {
    pub(crate) fn new(core: OperationCore<'a>) -> Self {
        Self {
            core,
            op: RewriteOp {
                deleted: Vec::new(),
                added: Vec::new(),
                producer: SnapshotProducer::new(),
            },
        }
    }

    /// Replace `to_delete` with `to_add`. Both sets must be non-empty.
    pub fn rewrite_files(
        mut self,
        to_delete: impl IntoIterator<Item = DataFile>,
        to_add: impl IntoIterator<Item = DataFile>,
    ) -> Self {
        self.op.deleted.extend(to_delete);
        self.op.added.extend(to_add);
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

    /// Stage and commit the rewrite.
    pub async fn commit(self) -> Result<Arc<TableMetadata>, TableError> {
        self.core.commit(PendingUpdate::Rewrite(self.op)).await
    }
}
