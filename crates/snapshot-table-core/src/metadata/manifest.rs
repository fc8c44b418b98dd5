//! Manifest entries and manifest file descriptors.
//!
//! ## Snapshot id inheritance
//!
//! Entries that record a change made by the snapshot that wrote the manifest
//! (`Added`, and `Deleted` entries written by that same snapshot) leave
//! `snapshot_id` unset. Readers fill it in from
//! [`ManifestFile::added_snapshot_id`]. This keeps a manifest valid when the
//! operation that wrote it is re-staged under a new snapshot id after a
//! commit conflict: only the descriptor is re-stamped, the file is reused.

use serde::{Deserialize, Serialize};

use super::data_file::DataFile;

/// Lifecycle status of a manifest entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Live file carried over from an earlier snapshot.
    Existing,
    /// Live file added by the recorded snapshot.
    Added,
    /// File removed by the recorded snapshot.
    Deleted,
}

impl EntryStatus {
    /// `Added` or `Existing`.
    pub fn is_live(self) -> bool {
        !matches!(self, EntryStatus::Deleted)
    }
}

/// One record in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    /// Entry status.
    pub status: EntryStatus,
    /// Snapshot that added or deleted the file; `None` means "inherit".
    pub snapshot_id: Option<i64>,
    /// The data file.
    pub data_file: DataFile,
}

impl ManifestEntry {
    /// An entry for a file added by the writing snapshot.
    pub fn added(data_file: DataFile) -> Self {
        Self {
            status: EntryStatus::Added,
            snapshot_id: None,
            data_file,
        }
    }

    /// An entry for a file deleted by the writing snapshot.
    pub fn deleted(data_file: DataFile) -> Self {
        Self {
            status: EntryStatus::Deleted,
            snapshot_id: None,
            data_file,
        }
    }

    /// An entry carrying a live file over from `snapshot_id`.
    pub fn existing(snapshot_id: i64, data_file: DataFile) -> Self {
        Self {
            status: EntryStatus::Existing,
            snapshot_id: Some(snapshot_id),
            data_file,
        }
    }

    /// Whether the entry's file is part of the live set.
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

/// Lower/upper summary of one partition field across a manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PartitionFieldSummary {
    /// Whether any entry has a null value for the field.
    pub contains_null: bool,
    /// Encoded minimum non-null value.
    pub lower_bound: Option<Vec<u8>>,
    /// Encoded maximum non-null value.
    pub upper_bound: Option<Vec<u8>>,
}

/// Descriptor of a manifest file, as recorded in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ManifestFile {
    /// Location of the manifest.
    pub path: String,
    /// Size of the manifest in bytes.
    pub length: u64,
    /// Partition spec the entries were written with.
    pub partition_spec_id: i32,
    /// Snapshot that wrote the manifest.
    pub added_snapshot_id: i64,
    /// Entries with status `Added`.
    pub added_files_count: u32,
    /// Entries with status `Existing`.
    pub existing_files_count: u32,
    /// Entries with status `Deleted`.
    pub deleted_files_count: u32,
    /// Rows in `Added` entries.
    pub added_rows_count: u64,
    /// Rows in `Existing` entries.
    pub existing_rows_count: u64,
    /// Rows in `Deleted` entries.
    pub deleted_rows_count: u64,
    /// Per partition field summaries.
    pub partitions: Vec<PartitionFieldSummary>,
}

impl ManifestFile {
    /// Whether the manifest holds any `Added` or `Existing` entry.
    pub fn has_live_files(&self) -> bool {
        self.added_files_count > 0 || self.existing_files_count > 0
    }

    /// Live files tracked by this manifest.
    pub fn live_files_count(&self) -> u64 {
        u64::from(self.added_files_count) + u64::from(self.existing_files_count)
    }

    /// Rows in live files tracked by this manifest.
    pub fn live_rows_count(&self) -> u64 {
        self.added_rows_count + self.existing_rows_count
    }

    /// The same manifest attributed to `snapshot_id`.
    pub(crate) fn stamped(&self, snapshot_id: i64) -> Self {
        Self {
            added_snapshot_id: snapshot_id,
            ..self.clone()
        }
    }
}
