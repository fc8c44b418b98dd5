//! Pending updates: staged changes to a table.
//!
//! Each operation builder ([`AppendFiles`], [`DeleteFiles`],
//! [`RewriteFiles`], [`ModifyFiles`], [`ExpireSnapshots`],
//! [`UpdateProperties`]) only records its inputs. On `commit()` the recorded
//! change becomes a [`PendingUpdate`], which the commit driver stages
//! against the current metadata, as many times as conflicts require.
//!
//! Builders come from a [`Table`](crate::table::Table), committing straight
//! to the metadata store, or from a
//! [`Transaction`](crate::transaction::Transaction), committing into the
//! transaction's private metadata.

pub mod append;
pub(crate) mod cleanup;
pub(crate) mod commit;
pub mod delete;
pub mod expire;
pub mod modify;
pub(crate) mod producer;
pub mod properties;
pub mod rewrite;
pub(crate) mod timeline;

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use snafu::prelude::*;

use crate::{
    manifest_io::ManifestIO,
    metadata::TableMetadata,
    table::{IllegalStateSnafu, Table, TableError},
    transaction::Transaction,
};

pub use append::AppendFiles;
pub use delete::DeleteFiles;
pub use expire::ExpireSnapshots;
pub use modify::ModifyFiles;
pub use properties::UpdateProperties;
pub use rewrite::RewriteFiles;

use self::{
    append::AppendOp, cleanup::Deleter, commit::Stage, delete::DeleteOp, expire::ExpireOp,
    modify::ModifyOp, properties::PropertiesOp, rewrite::RewriteOp,
};

/// Callback receiving the path of each superseded file to delete.
pub type DeleteCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// The closed set of staged changes.
#[derive(Debug)]
pub(crate) enum PendingUpdate {
    Append(AppendOp),
    Delete(DeleteOp),
    Rewrite(RewriteOp),
    Modify(ModifyOp),
    Expire(ExpireOp),
    Properties(PropertiesOp),
}

impl PendingUpdate {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            PendingUpdate::Append(op) => op.name(),
            PendingUpdate::Delete(_) => delete::NAME,
            PendingUpdate::Rewrite(_) => rewrite::NAME,
            PendingUpdate::Modify(_) => modify::NAME,
            PendingUpdate::Expire(_) => expire::NAME,
            PendingUpdate::Properties(_) => properties::NAME,
        }
    }

    /// Manifests written while staging, over every attempt.
    pub(crate) fn written_files(&self) -> BTreeSet<String> {
        match self {
            PendingUpdate::Append(op) => op.producer.written_files().clone(),
            PendingUpdate::Delete(op) => op.producer.written_files().clone(),
            PendingUpdate::Rewrite(op) => op.producer.written_files().clone(),
            PendingUpdate::Modify(op) => op.producer.written_files().clone(),
            PendingUpdate::Expire(_) | PendingUpdate::Properties(_) => BTreeSet::new(),
        }
    }
}

#[async_trait]
impl Stage for PendingUpdate {
    async fn stage(
        &mut self,
        io: &dyn ManifestIO,
        base: &TableMetadata,
    ) -> Result<TableMetadata, TableError> {
        match self {
            PendingUpdate::Append(op) => op.stage(io, base).await,
            PendingUpdate::Delete(op) => op.stage(io, base).await,
            PendingUpdate::Rewrite(op) => op.stage(io, base).await,
            PendingUpdate::Modify(op) => op.stage(io, base).await,
            PendingUpdate::Expire(op) => op.stage(base),
            PendingUpdate::Properties(op) => op.stage(base),
        }
    }
}

/// Where a builder's `commit()` goes.
#[derive(Debug)]
pub(crate) enum CommitTarget<'a> {
    Table(&'a Table),
    Transaction(&'a mut Transaction),
}

/// State shared by every operation builder.
#[derive(Debug)]
pub(crate) struct OperationCore<'a> {
    target: CommitTarget<'a>,
    deleter: Option<Deleter>,
}

impl<'a> OperationCore<'a> {
    pub(crate) fn for_table(table: &'a Table) -> Self {
        Self {
            target: CommitTarget::Table(table),
            deleter: None,
        }
    }

    /// Operations of a transaction only record deletions until the
    /// transaction commits.
    pub(crate) fn for_transaction(txn: &'a mut Transaction) -> Self {
        let recorder = txn.delete_recorder();
        Self {
            target: CommitTarget::Transaction(txn),
            deleter: Some(Deleter::Callback(recorder)),
        }
    }

    pub(crate) fn set_delete_callback(
        &mut self,
        callback: DeleteCallback,
    ) -> Result<(), TableError> {
        ensure!(
            self.deleter.is_none(),
            IllegalStateSnafu {
                message: "Cannot set delete callback more than once",
            }
        );
        self.deleter = Some(Deleter::Callback(callback));
        Ok(())
    }

    pub(crate) async fn commit(
        self,
        update: PendingUpdate,
    ) -> Result<Arc<TableMetadata>, TableError> {
        match self.target {
            CommitTarget::Table(table) => {
                let deleter = self
                    .deleter
                    .unwrap_or_else(|| Deleter::Io(Arc::clone(table.file_io())));
                commit::commit_update(table, update, deleter).await
            }
            CommitTarget::Transaction(txn) => {
                let deleter = self
                    .deleter
                    .unwrap_or_else(|| Deleter::Callback(txn.delete_recorder()));
                txn.apply(update, deleter).await
            }
        }
    }
}
