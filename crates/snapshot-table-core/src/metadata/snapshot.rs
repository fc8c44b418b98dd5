//! Snapshots: immutable, complete views of a table's live files.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use super::manifest::ManifestFile;

/// Summary key: files added by the snapshot.
pub const ADDED_FILES: &str = "added-data-files";
/// Summary key: files deleted by the snapshot.
pub const DELETED_FILES: &str = "deleted-data-files";
/// Summary key: rows in files added by the snapshot.
pub const ADDED_RECORDS: &str = "added-records";
/// Summary key: rows in files deleted by the snapshot.
pub const DELETED_RECORDS: &str = "deleted-records";
/// Summary key: live files after the snapshot.
pub const TOTAL_FILES: &str = "total-data-files";
/// Summary key: rows in live files after the snapshot.
pub const TOTAL_RECORDS: &str = "total-records";

/// The kind of change a snapshot made.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Only added files.
    Append,
    /// Only removed files.
    Delete,
    /// Added and removed files, possibly changing table contents.
    Overwrite,
    /// Rewrote files without changing table contents.
    Replace,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Append => "append",
            Operation::Delete => "delete",
            Operation::Overwrite => "overwrite",
            Operation::Replace => "replace",
        };
        f.write_str(name)
    }
}

/// An immutable view of the table at one point in its history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    /// Unique id within the table.
    pub snapshot_id: i64,
    /// The current snapshot when this one was committed.
    pub parent_id: Option<i64>,
    /// Commit time in milliseconds since the epoch.
    pub timestamp_ms: i64,
    /// Manifests whose live entries form this snapshot's files.
    pub manifests: Vec<ManifestFile>,
    /// What produced the snapshot.
    pub operation: Operation,
    /// Counters describing the change (see the `*_FILES`/`*_RECORDS` keys).
    pub summary: BTreeMap<String, String>,
}

impl Snapshot {
    /// Read a numeric summary counter.
    pub fn summary_count(&self, key: &str) -> Option<u64> {
        self.summary.get(key)?.parse().ok()
    }

    /// Manifests written by this snapshot.
    pub fn own_manifests(&self) -> impl Iterator<Item = &ManifestFile> {
        self.manifests
            .iter()
            .filter(move |m| m.added_snapshot_id == self.snapshot_id)
    }
}

/// One change of the current snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotLogEntry {
    /// Time the snapshot became current.
    pub timestamp_ms: i64,
    /// The snapshot that became current.
    pub snapshot_id: i64,
}
