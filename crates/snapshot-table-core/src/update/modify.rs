//! Overwriting files with optional conflict validation.
//!
//! A modify removes one set of files and adds another. Without a guard it
//! only requires the removed files to still be live. `validate(base)` adds
//! strict validation: the table must still be at `base`. With
//! `validate_with_filter(base, filter)` concurrent commits are tolerated as
//! long as none of them touched files that may hold rows matching `filter`.

use std::{collections::BTreeSet, sync::Arc};

use crate::{
    expr::Expression,
    manifest_io::ManifestIO,
    metadata::{DataFile, Operation, TableMetadata},
    table::TableError,
};

use super::{
    OperationCore, PendingUpdate,
    producer::{FileChanges, SnapshotProducer},
    timeline::{self, Validation},
};

pub(crate) const NAME: &str = "ModifyFiles";

#[derive(Debug)]
pub(crate) struct ModifyOp {
    deleted: Vec<DataFile>,
    added: Vec<DataFile>,
    validation: Option<Validation>,
    pub(crate) producer: SnapshotProducer,
}

impl ModifyOp {
    pub(crate) async fn stage(
        &mut self,
        io: &dyn ManifestIO,
        base: &TableMetadata,
    ) -> Result<TableMetadata, TableError> {
        let to_delete: BTreeSet<String> = self.deleted.iter().map(|f| f.path.clone()).collect();
        if let Some(validation) = &self.validation {
            timeline::validate(io, base, validation, &to_delete).await?;
        }
        let changes = FileChanges {
            added: &self.added,
            deleted: to_delete,
            ..FileChanges::default()
        };
        self.producer
            .produce(io, base, &changes, Operation::Overwrite, true)
            .await
    }
}

/// Replaces files, optionally guarded against concurrent changes.
#[derive(Debug)]
pub struct ModifyFiles<'a> {
    core: OperationCore<'a>,
    op: ModifyOp,
}

impl<'a> ModifyFiles<'a> {
    pub(crate) fn new(core: OperationCore<'a>) -> Self {
        Self {
            core,
            op: ModifyOp {
                deleted: Vec::new(),
                added: Vec::new(),
                validation: None,
                producer: SnapshotProducer::new(),
            },
        }
    }

    /// Remove `to_delete` and add `to_add`.
    pub fn modify_files(
        mut self,
        to_delete: impl IntoIterator<Item = DataFile>,
        to_add: impl IntoIterator<Item = DataFile>,
    ) -> Self {
        self.op.deleted.extend(to_delete);
        self.op.added.extend(to_add);
        self
    }

    /// Fail unless the current snapshot at commit time is still
    /// `base_snapshot_id` (`None` for a table without snapshots).
    pub fn validate(mut self, base_snapshot_id: Option<i64>) -> Self {
        self.op.validation = Some(Validation {
            base_snapshot_id,
            filter: None,
        });
        self
    }

    /// Fail if a snapshot committed after `base_snapshot_id` added or
    /// deleted files that may hold rows matching `filter`.
    pub fn validate_with_filter(
        mut self,
        base_snapshot_id: Option<i64>,
        filter: Expression,
    ) -> Self {
        self.op.validation = Some(Validation {
            base_snapshot_id,
            filter: Some(filter),
        });
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

    /// Validate, stage and commit the change.
    pub async fn commit(self) -> Result<Arc<TableMetadata>, TableError> {
        self.core.commit(PendingUpdate::Modify(self.op)).await
    }
}
