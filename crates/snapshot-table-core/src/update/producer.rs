//! Shared snapshot production for file-level operations.
//!
//! A [`SnapshotProducer`] turns a set of file changes into a new
//! [`Snapshot`] layered on a base:
//!
//! 1. added data files are written into one new manifest, and appended
//!    manifests are copied into manifests owned by the operation;
//! 2. the base snapshot's manifests are filtered: a manifest holding a file
//!    to delete is rewritten with that entry marked `Deleted`, and manifests
//!    left without live files are dropped;
//! 3. when merging is enabled the resulting list is bin-packed and small
//!    manifests are merged.
//!
//! Every manifest written is remembered so a re-stage against a newer base
//! reuses it; only the descriptor is re-stamped with the new snapshot id.
//! Rewrites of existing manifests are keyed on each input's path and
//! `added_snapshot_id`, since entries that inherit the snapshot id are
//! carried forward with that id.
//! The producer also tracks every path it wrote so failed or superseded
//! manifests can be cleaned up.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use log::debug;
use snafu::prelude::*;
use uuid::Uuid;

use crate::{
    layout,
    manifest_io::ManifestIO,
    metadata::{
        DataFile, EntryStatus, ManifestEntry, ManifestFile, ManifestMergeConfig, Operation,
        PartitionSpec, Snapshot, TableMetadata, snapshot,
    },
    table::{ManifestSnafu, TableError, ValidationError},
};

/// The file-level changes an operation asks for.
#[derive(Debug, Default)]
pub(crate) struct FileChanges<'a> {
    /// Files to add.
    pub added: &'a [DataFile],
    /// Externally written manifests whose files are added.
    pub appended: &'a [ManifestFile],
    /// Paths of live files to remove.
    pub deleted: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct FilteredManifest {
    /// Replacement manifest; `None` when nothing in the input was deleted.
    manifest: Option<ManifestFile>,
    deleted: Vec<DataFile>,
}

#[derive(Debug, Default)]
struct Counts {
    files: u64,
    records: u64,
}

impl Counts {
    fn add(&mut self, files: u64, records: u64) {
        self.files += files;
        self.records += records;
    }
}

/// A manifest as read by a rewrite: its path plus the id its entries inherit.
type ManifestKey = (String, i64);

fn manifest_key(manifest: &ManifestFile) -> ManifestKey {
    (manifest.path.clone(), manifest.added_snapshot_id)
}

/// Writes and caches the manifests of one operation across staging attempts.
#[derive(Debug)]
pub(crate) struct SnapshotProducer {
    commit_id: Uuid,
    manifest_count: usize,
    written: BTreeSet<String>,
    new_manifest: Option<ManifestFile>,
    copied: Option<Vec<ManifestFile>>,
    filtered: HashMap<ManifestKey, FilteredManifest>,
    merged: HashMap<Vec<ManifestKey>, ManifestFile>,
}

impl Default for SnapshotProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotProducer {
    pub(crate) fn new() -> Self {
        Self {
            commit_id: Uuid::new_v4(),
            manifest_count: 0,
            written: BTreeSet::new(),
            new_manifest: None,
            copied: None,
            filtered: HashMap::new(),
            merged: HashMap::new(),
        }
    }

    /// Every manifest path written so far, across all attempts.
    pub(crate) fn written_files(&self) -> &BTreeSet<String> {
        &self.written
    }

    /// Stage `changes` on top of `base` and return the new metadata.
    pub(crate) async fn produce(
        &mut self,
        io: &dyn ManifestIO,
        base: &TableMetadata,
        changes: &FileChanges<'_>,
        operation: Operation,
        merge: bool,
    ) -> Result<TableMetadata, TableError> {
        let snapshot_id = base.next_snapshot_id();
        let spec = &base.partition_spec;
        let mut added = Counts::default();
        let mut deleted = Counts::default();
        let mut manifests = Vec::new();

        if !changes.added.is_empty() {
            let manifest = self
                .new_files_manifest(io, spec, snapshot_id, changes.added)
                .await?;
            added.add(manifest.live_files_count(), manifest.live_rows_count());
            manifests.push(manifest.stamped(snapshot_id));
        }
        if !changes.appended.is_empty() {
            for manifest in self
                .copied_manifests(io, spec, snapshot_id, changes.appended)
                .await?
            {
                added.add(manifest.live_files_count(), manifest.live_rows_count());
                manifests.push(manifest.stamped(snapshot_id));
            }
        }

        let mut found = BTreeSet::new();
        if let Some(current) = base.current_snapshot() {
            for manifest in &current.manifests {
                if !manifest.has_live_files() {
                    continue;
                }
                if changes.deleted.is_empty() {
                    manifests.push(manifest.clone());
                    continue;
                }
                let filtered = self
                    .filter_manifest(io, spec, snapshot_id, manifest, &changes.deleted)
                    .await?;
                for file in &filtered.deleted {
                    found.insert(file.path.clone());
                    deleted.add(1, file.record_count);
                }
                match filtered.manifest {
                    Some(rewritten) => manifests.push(rewritten.stamped(snapshot_id)),
                    None => manifests.push(manifest.clone()),
                }
            }
        }

        let missing: Vec<String> = changes.deleted.difference(&found).cloned().collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingDeleteFiles { paths: missing }.into());
        }

        let config = base.merge_config();
        if merge && config.enabled {
            manifests = self
                .merge_manifests(io, spec, snapshot_id, manifests, &config)
                .await?;
        }

        let summary = summarize(&manifests, &added, &deleted);
        let snapshot = Snapshot {
            snapshot_id,
            parent_id: base.current_snapshot_id,
            timestamp_ms: Utc::now().timestamp_millis(),
            manifests,
            operation,
            summary,
        };
        Ok(base.with_snapshot(snapshot))
    }

    fn next_path(&mut self) -> String {
        let path = layout::manifest_rel_path(&self.commit_id, self.manifest_count);
        self.manifest_count += 1;
        path
    }

    async fn write(
        &mut self,
        io: &dyn ManifestIO,
        spec: &PartitionSpec,
        snapshot_id: i64,
        entries: Vec<ManifestEntry>,
    ) -> Result<ManifestFile, TableError> {
        let path = self.next_path();
        // recorded before the write so a partial file is still cleaned up
        self.written.insert(path.clone());
        io.write_manifest(&path, spec, snapshot_id, entries)
            .await
            .context(ManifestSnafu)
    }

    async fn new_files_manifest(
        &mut self,
        io: &dyn ManifestIO,
        spec: &PartitionSpec,
        snapshot_id: i64,
        files: &[DataFile],
    ) -> Result<ManifestFile, TableError> {
        if let Some(manifest) = &self.new_manifest {
            return Ok(manifest.clone());
        }
        let entries = files.iter().cloned().map(ManifestEntry::added).collect();
        let manifest = self.write(io, spec, snapshot_id, entries).await?;
        self.new_manifest = Some(manifest.clone());
        Ok(manifest)
    }

    async fn copied_manifests(
        &mut self,
        io: &dyn ManifestIO,
        spec: &PartitionSpec,
        snapshot_id: i64,
        appended: &[ManifestFile],
    ) -> Result<Vec<ManifestFile>, TableError> {
        if let Some(copied) = &self.copied {
            return Ok(copied.clone());
        }
        let mut copied = Vec::with_capacity(appended.len());
        for manifest in appended {
            let entries = io
                .read_entries(manifest)
                .await
                .context(ManifestSnafu)?
                .into_iter()
                .map(|entry| ManifestEntry::added(entry.data_file))
                .collect();
            copied.push(self.write(io, spec, snapshot_id, entries).await?);
        }
        self.copied = Some(copied.clone());
        Ok(copied)
    }

    async fn filter_manifest(
        &mut self,
        io: &dyn ManifestIO,
        spec: &PartitionSpec,
        snapshot_id: i64,
        manifest: &ManifestFile,
        to_delete: &BTreeSet<String>,
    ) -> Result<FilteredManifest, TableError> {
        let key = manifest_key(manifest);
        if let Some(filtered) = self.filtered.get(&key) {
            return Ok(filtered.clone());
        }

        let entries = io.read_entries(manifest).await.context(ManifestSnafu)?;
        let hits = entries
            .iter()
            .any(|e| e.is_live() && to_delete.contains(&e.data_file.path));

        let filtered = if hits {
            let mut deleted = Vec::new();
            let mut kept = Vec::with_capacity(entries.len());
            for entry in entries {
                if !entry.is_live() {
                    continue;
                }
                if to_delete.contains(&entry.data_file.path) {
                    deleted.push(entry.data_file.clone());
                    kept.push(ManifestEntry::deleted(entry.data_file));
                } else {
                    let id = entry.snapshot_id.unwrap_or(manifest.added_snapshot_id);
                    kept.push(ManifestEntry::existing(id, entry.data_file));
                }
            }
            let rewritten = self.write(io, spec, snapshot_id, kept).await?;
            debug!(
                "Filtered manifest {} into {} ({} deleted)",
                manifest.path,
                rewritten.path,
                deleted.len()
            );
            FilteredManifest {
                manifest: Some(rewritten),
                deleted,
            }
        } else {
            FilteredManifest {
                manifest: None,
                deleted: Vec::new(),
            }
        };

        self.filtered.insert(key, filtered.clone());
        Ok(filtered)
    }

    async fn merge_manifests(
        &mut self,
        io: &dyn ManifestIO,
        spec: &PartitionSpec,
        snapshot_id: i64,
        manifests: Vec<ManifestFile>,
        config: &ManifestMergeConfig,
    ) -> Result<Vec<ManifestFile>, TableError> {
        let mut merged = Vec::with_capacity(manifests.len());
        for (index, bin) in pack(manifests, config.target_size_bytes)
            .into_iter()
            .enumerate()
        {
            // the bin holding the newest manifest waits until it is big enough
            if bin.len() == 1 || (index == 0 && bin.len() < config.min_count_to_merge) {
                merged.extend(bin);
            } else {
                merged.push(self.merge_bin(io, spec, snapshot_id, &bin).await?);
            }
        }
        Ok(merged)
    }

    async fn merge_bin(
        &mut self,
        io: &dyn ManifestIO,
        spec: &PartitionSpec,
        snapshot_id: i64,
        bin: &[ManifestFile],
    ) -> Result<ManifestFile, TableError> {
        let key: Vec<ManifestKey> = bin.iter().map(manifest_key).collect();
        if let Some(manifest) = self.merged.get(&key) {
            return Ok(manifest.stamped(snapshot_id));
        }

        let mut entries = Vec::new();
        for manifest in bin {
            for entry in io.read_entries(manifest).await.context(ManifestSnafu)? {
                let id = entry.snapshot_id.unwrap_or(manifest.added_snapshot_id);
                match entry.status {
                    EntryStatus::Deleted if id == snapshot_id => {
                        entries.push(ManifestEntry::deleted(entry.data_file));
                    }
                    EntryStatus::Deleted => {}
                    EntryStatus::Added if id == snapshot_id => {
                        entries.push(ManifestEntry::added(entry.data_file));
                    }
                    EntryStatus::Added | EntryStatus::Existing => {
                        entries.push(ManifestEntry::existing(id, entry.data_file));
                    }
                }
            }
        }

        let manifest = self.write(io, spec, snapshot_id, entries).await?;
        debug!("Merged {} manifests into {}", bin.len(), manifest.path);
        self.merged.insert(key, manifest.clone());
        Ok(manifest)
    }
}

/// Sequential bin-packing by manifest length.
fn pack(manifests: Vec<ManifestFile>, target_size: u64) -> Vec<Vec<ManifestFile>> {
    let mut bins = Vec::new();
    let mut bin: Vec<ManifestFile> = Vec::new();
    let mut size = 0u64;
    for manifest in manifests {
        if !bin.is_empty() && size.saturating_add(manifest.length) > target_size {
            bins.push(std::mem::take(&mut bin));
            size = 0;
        }
        size = size.saturating_add(manifest.length);
        bin.push(manifest);
    }
    if !bin.is_empty() {
        bins.push(bin);
    }
    bins
}

fn summarize(
    manifests: &[ManifestFile],
    added: &Counts,
    deleted: &Counts,
) -> BTreeMap<String, String> {
    let mut summary = BTreeMap::new();
    if added.files > 0 {
        summary.insert(snapshot::ADDED_FILES.to_string(), added.files.to_string());
        summary.insert(
            snapshot::ADDED_RECORDS.to_string(),
            added.records.to_string(),
        );
    }
    if deleted.files > 0 {
        summary.insert(
            snapshot::DELETED_FILES.to_string(),
            deleted.files.to_string(),
        );
        summary.insert(
            snapshot::DELETED_RECORDS.to_string(),
            deleted.records.to_string(),
        );
    }
    let total_files: u64 = manifests.iter().map(ManifestFile::live_files_count).sum();
    let total_records: u64 = manifests.iter().map(ManifestFile::live_rows_count).sum();
    summary.insert(snapshot::TOTAL_FILES.to_string(), total_files.to_string());
    summary.insert(
        snapshot::TOTAL_RECORDS.to_string(),
        total_records.to_string(),
    );
    summary
}
