//! Conflict checks between a validated operation and the commits that
//! happened after its base snapshot.
//!
//! Strict validation only compares snapshot ids. Filtered validation walks
//! parent pointers from the current snapshot back to the base and inspects
//! the changes each intervening snapshot made itself: an added or deleted
//! file that may hold rows matching the filter is a conflict, except for
//! deletes of files the pending operation removes as well (those surface
//! as missing files instead). A gap in the history fails the check, since
//! the changes in it cannot be inspected.

use std::collections::BTreeSet;

use log::debug;
use snafu::prelude::*;

use crate::{
    expr::{Expression, FileOverlapEvaluator},
    manifest_io::ManifestIO,
    metadata::{EntryStatus, TableMetadata},
    table::{
        ExpressionSnafu, InRangeConflictSnafu, ManifestSnafu, TableError, TimelineChangedSnafu,
        TimelineMissingSnafu,
    },
};

/// Guard requested through `validate`.
#[derive(Debug, Clone)]
pub(crate) struct Validation {
    /// Current snapshot the caller based the change on.
    pub base_snapshot_id: Option<i64>,
    /// Rows the change depends on; `None` requests strict validation.
    pub filter: Option<Expression>,
}

/// Check `current` against the guard before staging on top of it.
pub(crate) async fn validate(
    io: &dyn ManifestIO,
    current: &TableMetadata,
    validation: &Validation,
    pending_deletes: &BTreeSet<String>,
) -> Result<(), TableError> {
    match &validation.filter {
        None => {
            ensure!(
                current.current_snapshot_id == validation.base_snapshot_id,
                TimelineChangedSnafu {
                    base: validation.base_snapshot_id,
                    current: current.current_snapshot_id,
                }
            );
            Ok(())
        }
        Some(filter) => {
            validate_no_conflicts(
                io,
                current,
                validation.base_snapshot_id,
                filter,
                pending_deletes,
            )
            .await
        }
    }
}

async fn validate_no_conflicts(
    io: &dyn ManifestIO,
    current: &TableMetadata,
    base_snapshot_id: Option<i64>,
    filter: &Expression,
    pending_deletes: &BTreeSet<String>,
) -> Result<(), TableError> {
    let evaluator = FileOverlapEvaluator::new(&current.schema, &current.partition_spec, filter)
        .context(ExpressionSnafu)?;

    let mut next = current.current_snapshot_id;
    while next != base_snapshot_id {
        let id = match (next, base_snapshot_id) {
            (Some(id), _) => id,
            // reached the start of history without meeting the base
            (None, Some(base)) => {
                return Err(TimelineMissingSnafu { snapshot_id: base }.build().into());
            }
            (None, None) => break,
        };
        let snapshot = current
            .snapshot(id)
            .context(TimelineMissingSnafu { snapshot_id: id })?;
        debug!("Validating changes of snapshot {id} against {filter}");

        for manifest in snapshot.own_manifests() {
            let entries = io.read_entries(manifest).await.context(ManifestSnafu)?;
            for entry in entries {
                if entry.snapshot_id != Some(id) {
                    continue;
                }
                let path = &entry.data_file.path;
                let conflicting = match entry.status {
                    EntryStatus::Existing => false,
                    EntryStatus::Deleted if pending_deletes.contains(path) => false,
                    EntryStatus::Added | EntryStatus::Deleted => {
                        evaluator.may_overlap(&entry.data_file)
                    }
                };
                ensure!(
                    !conflicting,
                    InRangeConflictSnafu {
                        snapshot_id: id,
                        path: path.clone(),
                    }
                );
            }
        }
        next = snapshot.parent_id;
    }
    Ok(())
}
