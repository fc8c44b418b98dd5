//! Expiring snapshots.
//!
//! Expired snapshots are removed from the metadata; after the commit,
//! manifests no longer listed by any retained snapshot are deleted. Data
//! files are left in place. The current snapshot is never expired.

use std::{collections::BTreeSet, sync::Arc};

use log::info;
use snafu::prelude::*;

use crate::{
    metadata::TableMetadata,
    table::{CurrentSnapshotExpirationSnafu, InvalidArgumentSnafu, TableError},
};

use super::{OperationCore, PendingUpdate};

pub(crate) const NAME: &str = "ExpireSnapshots";

#[derive(Debug, Default)]
pub(crate) struct ExpireOp {
    ids: BTreeSet<i64>,
    older_than_ms: Option<i64>,
    retain_last: Option<usize>,
}

impl ExpireOp {
    pub(crate) fn stage(&self, base: &TableMetadata) -> Result<TableMetadata, TableError> {
        if let Some(current) = base.current_snapshot_id {
            ensure!(
                !self.ids.contains(&current),
                CurrentSnapshotExpirationSnafu {
                    snapshot_id: current
                }
            );
        }
        if let Some(0) = self.retain_last {
            return InvalidArgumentSnafu {
                message: "Number of snapshots to retain must be at least 1",
            }
            .fail();
        }

        let retained = self.retained_ancestors(base);
        let by_age = |ts: i64| match self.older_than_ms {
            Some(cutoff) => ts < cutoff,
            None => self.retain_last.is_some(),
        };
        let expired: BTreeSet<i64> = base
            .snapshots
            .iter()
            .filter(|s| {
                self.ids.contains(&s.snapshot_id)
                    || (by_age(s.timestamp_ms) && !retained.contains(&s.snapshot_id))
            })
            .map(|s| s.snapshot_id)
            .collect();

        if expired.is_empty() {
            return Ok(base.clone());
        }
        info!("Expiring snapshots {expired:?}");
        Ok(base.without_snapshots(&expired))
    }

    /// The current snapshot and the most recent ancestors kept by `retain_last`.
    fn retained_ancestors(&self, base: &TableMetadata) -> BTreeSet<i64> {
        let keep = self.retain_last.unwrap_or(1);
        let mut retained = BTreeSet::new();
        let mut next = base.current_snapshot();
        while let Some(snapshot) = next {
            if retained.len() >= keep {
                break;
            }
            retained.insert(snapshot.snapshot_id);
            next = snapshot.parent_id.and_then(|id| base.snapshot(id));
        }
        retained
    }
}

/// Removes old snapshots from a table.
///
/// Snapshots can be named directly, selected by age, or both; age-based
/// selection spares the `retain_last` most recent ancestors of the current
/// snapshot. Ids that do not name a retained snapshot are ignored.
#[derive(Debug)]
pub struct ExpireSnapshots<'a> {
    core: OperationCore<'a>,
    op: ExpireOp,
}

impl<'a> ExpireSnapshots<'a> {
    pub(crate) fn new(core: OperationCore<'a>) -> Self {
        Self {
            core,
            op: ExpireOp::default(),
        }
    }

    /// Expire the snapshot with `snapshot_id`.
    pub fn expire_snapshot_id(mut self, snapshot_id: i64) -> Self {
        self.op.ids.insert(snapshot_id);
        self
    }

    /// Expire snapshots committed before `timestamp_ms`.
    pub fn expire_older_than(mut self, timestamp_ms: i64) -> Self {
        self.op.older_than_ms = Some(timestamp_ms);
        self
    }

    /// Keep the `count` most recent ancestors of the current snapshot.
    pub fn retain_last(mut self, count: usize) -> Self {
        self.op.retain_last = Some(count);
        self
    }

    /// Route deletion of unreachable manifests through `callback`.
    pub fn delete_with(
        mut self,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<Self, TableError> {
        self.core.set_delete_callback(Arc::new(callback))?;
        Ok(self)
    }

    /// Commit the expiration.
    pub async fn commit(self) -> Result<Arc<TableMetadata>, TableError> {
        self.core.commit(PendingUpdate::Expire(self.op)).await
    }
}
