//! Multi-operation transactions.
//!
//! A [`Transaction`] stages operations one after another against a private
//! copy of the table metadata. Nothing is published until
//! [`Transaction::commit_transaction`], which swaps the final metadata in a
//! single store commit. If the table moved in the meantime every operation
//! is re-staged, in order, on the new current metadata.
//!
//! Deletions requested by individual operations are only recorded while the
//! transaction is open. Once the transaction commits, recorded files and
//! every other manifest the published metadata no longer references are
//! deleted.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use log::{debug, warn};
use snafu::prelude::*;

use crate::{
    manifest_io::ManifestIO,
    metadata::{Snapshot, TableMetadata},
    table::{IllegalStateSnafu, Table, TableError, TableScan},
    update::{
        AppendFiles, DeleteCallback, DeleteFiles, ExpireSnapshots, ModifyFiles, OperationCore,
        PendingUpdate, RewriteFiles, UpdateProperties, append,
        cleanup::{self, Deleter},
        commit::{self, Stage},
        delete, expire, modify, properties, rewrite,
    },
};

/// A set of operations committed atomically.
#[derive(Debug)]
pub struct Transaction {
    table: Table,
    base: Arc<TableMetadata>,
    current: Arc<TableMetadata>,
    updates: Vec<PendingUpdate>,
    pending: Option<&'static str>,
    committed: bool,
    deleted: Arc<Mutex<BTreeSet<String>>>,
}

impl Transaction {
    pub(crate) fn new(table: Table, base: Arc<TableMetadata>) -> Self {
        Self {
            table,
            current: Arc::clone(&base),
            base,
            updates: Vec::new(),
            pending: None,
            committed: false,
            deleted: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// The transaction's metadata, including every applied operation.
    pub fn metadata(&self) -> &Arc<TableMetadata> {
        &self.current
    }

    /// The transaction's current snapshot.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current.current_snapshot()
    }

    /// Scan the transaction's metadata.
    pub fn new_scan(&self) -> TableScan {
        TableScan::of_metadata(
            Arc::clone(self.table.manifest_io()),
            Arc::clone(&self.current),
        )
    }

    /// Files deleted, or scheduled for deletion, by this transaction.
    pub fn deleted_files(&self) -> BTreeSet<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start an append with manifest merging.
    pub fn new_append(&mut self) -> Result<AppendFiles<'_>, TableError> {
        self.begin(append::NAME)?;
        Ok(AppendFiles::new(
            OperationCore::for_transaction(self),
            false,
        ))
    }

    /// Start an append that never merges manifests.
    pub fn new_fast_append(&mut self) -> Result<AppendFiles<'_>, TableError> {
        self.begin(append::FAST_NAME)?;
        Ok(AppendFiles::new(OperationCore::for_transaction(self), true))
    }

    /// Start a delete.
    pub fn new_delete(&mut self) -> Result<DeleteFiles<'_>, TableError> {
        self.begin(delete::NAME)?;
        Ok(DeleteFiles::new(OperationCore::for_transaction(self)))
    }

    /// Start a rewrite.
    pub fn new_rewrite(&mut self) -> Result<RewriteFiles<'_>, TableError> {
        self.begin(rewrite::NAME)?;
        Ok(RewriteFiles::new(OperationCore::for_transaction(self)))
    }

    /// Start a modify.
    pub fn new_modify(&mut self) -> Result<ModifyFiles<'_>, TableError> {
        self.begin(modify::NAME)?;
        Ok(ModifyFiles::new(OperationCore::for_transaction(self)))
    }

    /// Start a snapshot expiration.
    pub fn expire_snapshots(&mut self) -> Result<ExpireSnapshots<'_>, TableError> {
        self.begin(expire::NAME)?;
        Ok(ExpireSnapshots::new(OperationCore::for_transaction(self)))
    }

    /// Start a property update.
    pub fn update_properties(&mut self) -> Result<UpdateProperties<'_>, TableError> {
        self.begin(properties::NAME)?;
        Ok(UpdateProperties::new(OperationCore::for_transaction(self)))
    }

    fn ensure_open(&self) -> Result<(), TableError> {
        ensure!(
            !self.committed,
            IllegalStateSnafu {
                message: "Transaction has already been committed",
            }
        );
        Ok(())
    }

    fn begin(&mut self, name: &'static str) -> Result<(), TableError> {
        self.ensure_open()?;
        ensure!(
            self.pending.is_none(),
            IllegalStateSnafu {
                message: format!("Cannot create new {name}: last operation has not committed"),
            }
        );
        self.pending = Some(name);
        Ok(())
    }

    pub(crate) fn delete_recorder(&self) -> DeleteCallback {
        let deleted = Arc::clone(&self.deleted);
        Arc::new(move |path: &str| {
            deleted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path.to_string());
        })
    }

    /// Stage `update` on the transaction's metadata.
    ///
    /// On failure the operation's manifests are removed and the transaction
    /// stays blocked on it.
    pub(crate) async fn apply(
        &mut self,
        mut update: PendingUpdate,
        deleter: Deleter,
    ) -> Result<Arc<TableMetadata>, TableError> {
        let io = self.table.manifest_io();
        let next = match update.stage(io.as_ref(), &self.current).await {
            Ok(next) => Arc::new(next),
            Err(e) => {
                cleanup::delete_all(&update.written_files(), self.table.file_io().as_ref()).await;
                return Err(e);
            }
        };

        let mut candidates = update.written_files();
        candidates.extend(self.current.manifest_paths());
        cleanup::delete_unreachable(candidates, &next, &deleter).await;

        debug!("Applied {} to transaction", update.name());
        self.current = Arc::clone(&next);
        self.updates.push(update);
        self.pending = None;
        Ok(next)
    }

    /// Publish every applied operation in one commit.
    ///
    /// An empty transaction returns the base metadata without writing.
    pub async fn commit_transaction(&mut self) -> Result<Arc<TableMetadata>, TableError> {
        self.ensure_open()?;
        ensure!(
            self.pending.is_none(),
            IllegalStateSnafu {
                message: "Cannot commit transaction: last operation has not committed",
            }
        );
        self.committed = true;
        if self.updates.is_empty() {
            return Ok(Arc::clone(&self.base));
        }

        let table = self.table.clone();
        let primed = Some((Arc::clone(&self.base), TableMetadata::clone(&self.current)));
        let mut replay = Replay {
            updates: &mut self.updates,
        };
        let result = commit::commit_with_retry(
            table.store().as_ref(),
            table.manifest_io().as_ref(),
            &mut replay,
            primed,
        )
        .await;

        let written: BTreeSet<String> = self
            .updates
            .iter()
            .flat_map(PendingUpdate::written_files)
            .collect();
        match result {
            Ok(committed) => {
                let mut candidates = written;
                candidates.extend(self.deleted_files());
                candidates.extend(self.base.manifest_paths());
                candidates.extend(committed.base.manifest_paths());
                let deleter = Deleter::Io(Arc::clone(table.file_io()));
                let removed =
                    cleanup::delete_unreachable(candidates, &committed.metadata, &deleter).await;
                self.deleted
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(removed);
                self.current = Arc::clone(&committed.metadata);
                Ok(committed.metadata)
            }
            Err(e) => {
                if e.commit_state_unknown() {
                    warn!("Transaction commit state unknown; keeping written manifests: {e}");
                } else {
                    cleanup::delete_all(&written, table.file_io().as_ref()).await;
                }
                Err(e)
            }
        }
    }
}

/// Re-stages a transaction's operations in order.
struct Replay<'a> {
    updates: &'a mut [PendingUpdate],
}

#[async_trait]
impl Stage for Replay<'_> {
    async fn stage(
        &mut self,
        io: &dyn ManifestIO,
        base: &TableMetadata,
    ) -> Result<TableMetadata, TableError> {
        let mut current = base.clone();
        for update in self.updates.iter_mut() {
            current = update.stage(io, &current).await?;
        }
        Ok(current)
    }
}
