//! Reading and writing manifest files.
//!
//! A manifest on storage is a JSON document holding its partition spec id
//! and entries. The descriptor recorded in snapshots ([`ManifestFile`]) is
//! computed at write time: entry counts by status, row counts and partition
//! summaries.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::{Backtrace, prelude::*};

use crate::{
    metadata::{
        Datum, EntryStatus, ManifestEntry, ManifestFile, PartitionFieldSummary, PartitionSpec,
    },
    storage::{FileIO, StorageError},
};

/// Errors reading or writing manifests.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ManifestError {
    /// Storage failed while accessing a manifest.
    #[snafu(display("Storage error for manifest {path}: {source}"))]
    Storage {
        /// Manifest path.
        path: String,
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// A manifest could not be decoded.
    #[snafu(display("Corrupt manifest {path}: {msg}"))]
    Corrupt {
        /// Manifest path.
        path: String,
        /// Decode failure.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A manifest could not be encoded.
    #[snafu(display("Cannot encode manifest {path}: {msg}"))]
    Encode {
        /// Manifest path.
        path: String,
        /// Encode failure.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },
}

/// Persists and loads manifests.
#[async_trait]
pub trait ManifestIO: Send + Sync + fmt::Debug {
    /// Write `entries` as a new manifest at `path` and describe it as written
    /// by `snapshot_id`.
    async fn write_manifest(
        &self,
        path: &str,
        spec: &PartitionSpec,
        snapshot_id: i64,
        entries: Vec<ManifestEntry>,
    ) -> Result<ManifestFile, ManifestError>;

    /// Read the entries of `manifest`, filling inherited snapshot ids from
    /// [`ManifestFile::added_snapshot_id`].
    async fn read_entries(
        &self,
        manifest: &ManifestFile,
    ) -> Result<Vec<ManifestEntry>, ManifestError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestContents {
    partition_spec_id: i32,
    entries: Vec<ManifestEntry>,
}

/// [`ManifestIO`] storing JSON manifests through a [`FileIO`].
#[derive(Debug, Clone)]
pub struct JsonManifestIO {
    io: Arc<dyn FileIO>,
}

impl JsonManifestIO {
    /// Store manifests through `io`.
    pub fn new(io: Arc<dyn FileIO>) -> Self {
        Self { io }
    }
}

#[async_trait]
impl ManifestIO for JsonManifestIO {
    async fn write_manifest(
        &self,
        path: &str,
        spec: &PartitionSpec,
        snapshot_id: i64,
        entries: Vec<ManifestEntry>,
    ) -> Result<ManifestFile, ManifestError> {
        let mut manifest = describe(path, spec, snapshot_id, &entries);
        let contents = ManifestContents {
            partition_spec_id: spec.spec_id,
            entries,
        };
        let json = serde_json::to_vec(&contents).map_err(|e| ManifestError::Encode {
            path: path.to_string(),
            msg: e.to_string(),
            backtrace: Backtrace::capture(),
        })?;
        manifest.length = json.len() as u64;

        self.io
            .write_file(path, Bytes::from(json))
            .await
            .context(StorageSnafu { path })?;
        debug!(
            "Wrote manifest {path} ({} added, {} existing, {} deleted)",
            manifest.added_files_count, manifest.existing_files_count, manifest.deleted_files_count
        );
        Ok(manifest)
    }

    async fn read_entries(
        &self,
        manifest: &ManifestFile,
    ) -> Result<Vec<ManifestEntry>, ManifestError> {
        let path = manifest.path.as_str();
        let bytes = self
            .io
            .read_file(path)
            .await
            .context(StorageSnafu { path })?;
        let contents: ManifestContents =
            serde_json::from_slice(&bytes).map_err(|e| ManifestError::Corrupt {
                path: path.to_string(),
                msg: e.to_string(),
                backtrace: Backtrace::capture(),
            })?;
        Ok(contents
            .entries
            .into_iter()
            .map(|mut entry| {
                entry.snapshot_id.get_or_insert(manifest.added_snapshot_id);
                entry
            })
            .collect())
    }
}

/// Compute the descriptor for `entries` written at `path`.
fn describe(
    path: &str,
    spec: &PartitionSpec,
    snapshot_id: i64,
    entries: &[ManifestEntry],
) -> ManifestFile {
    let mut manifest = ManifestFile {
        path: path.to_string(),
        length: 0,
        partition_spec_id: spec.spec_id,
        added_snapshot_id: snapshot_id,
        added_files_count: 0,
        existing_files_count: 0,
        deleted_files_count: 0,
        added_rows_count: 0,
        existing_rows_count: 0,
        deleted_rows_count: 0,
        partitions: summarize_partitions(spec, entries),
    };
    for entry in entries {
        let rows = entry.data_file.record_count;
        match entry.status {
            EntryStatus::Added => {
                manifest.added_files_count += 1;
                manifest.added_rows_count += rows;
            }
            EntryStatus::Existing => {
                manifest.existing_files_count += 1;
                manifest.existing_rows_count += rows;
            }
            EntryStatus::Deleted => {
                manifest.deleted_files_count += 1;
                manifest.deleted_rows_count += rows;
            }
        }
    }
    manifest
}

fn summarize_partitions(
    spec: &PartitionSpec,
    entries: &[ManifestEntry],
) -> Vec<PartitionFieldSummary> {
    (0..spec.fields().len())
        .map(|pos| {
            let mut contains_null = false;
            let mut lower: Option<&Datum> = None;
            let mut upper: Option<&Datum> = None;
            for entry in entries {
                match entry.data_file.partition.get(pos) {
                    None => contains_null = true,
                    Some(value) => {
                        if lower.is_none_or(|l| value < l) {
                            lower = Some(value);
                        }
                        if upper.is_none_or(|u| value > u) {
                            upper = Some(value);
                        }
                    }
                }
            }
            PartitionFieldSummary {
                contains_null,
                lower_bound: lower.map(Datum::to_bytes),
                upper_bound: upper.map(Datum::to_bytes),
            }
        })
        .collect()
}
