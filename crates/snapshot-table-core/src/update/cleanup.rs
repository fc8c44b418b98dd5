//! Removal of manifests that no committed snapshot references.
//!
//! Manifests are shared between snapshots, so a file is only ever deleted
//! after a reachability sweep over the committed metadata: a candidate is
//! removed when no retained snapshot lists it. Deletion failures are logged
//! and otherwise ignored; a leftover manifest is garbage, not corruption.

use std::{collections::BTreeSet, fmt, sync::Arc};

use log::{debug, warn};

use crate::{metadata::TableMetadata, storage::FileIO};

use super::DeleteCallback;

/// How superseded files are removed.
#[derive(Clone)]
pub(crate) enum Deleter {
    /// Delete through the table's file IO.
    Io(Arc<dyn FileIO>),
    /// Hand the path to a caller-supplied callback.
    Callback(DeleteCallback),
}

impl fmt::Debug for Deleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deleter::Io(io) => f.debug_tuple("Io").field(io).finish(),
            Deleter::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl Deleter {
    pub(crate) async fn delete(&self, path: &str) {
        match self {
            Deleter::Io(io) => match io.delete_file(path).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!("Manifest {path} is already gone"),
                Err(e) => warn!("Failed to delete manifest {path}: {e}"),
            },
            Deleter::Callback(callback) => callback(path),
        }
    }
}

/// Delete every candidate that `committed` no longer references.
///
/// Returns the paths handed to `deleter`.
pub(crate) async fn delete_unreachable(
    candidates: BTreeSet<String>,
    committed: &TableMetadata,
    deleter: &Deleter,
) -> Vec<String> {
    let reachable = committed.manifest_paths();
    let mut deleted = Vec::new();
    for path in candidates.into_iter().filter(|p| !reachable.contains(p)) {
        deleter.delete(&path).await;
        deleted.push(path);
    }
    if !deleted.is_empty() {
        debug!("Removed {} unreachable manifests", deleted.len());
    }
    deleted
}

/// Delete files written by a change that will never be published.
pub(crate) async fn delete_all(paths: &BTreeSet<String>, io: &dyn FileIO) {
    for path in paths {
        match io.delete_file(path).await {
            Ok(()) => {}
            // recorded before a write that never happened
            Err(e) if e.is_not_found() => debug!("Uncommitted manifest {path} was never written"),
            Err(e) => warn!("Failed to clean up uncommitted manifest {path}: {e}"),
        }
    }
}
