//! Immutable table metadata.
//!
//! Every change produces a new [`TableMetadata`] derived from the previous
//! one; nothing here mutates in place. The metadata store assigns
//! [`TableMetadata::version`] when a new value is published.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    partition::PartitionSpec,
    properties::{CommitConfig, ManifestMergeConfig},
    schema::Schema,
    snapshot::{Snapshot, SnapshotLogEntry},
};

/// Metadata format version written by this crate.
pub const FORMAT_VERSION: u32 = 2;

/// The table's authoritative metadata at one version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMetadata {
    /// Metadata format version.
    pub format_version: u32,
    /// Unique table id.
    pub table_uuid: Uuid,
    /// Table root.
    pub location: String,
    /// Metadata version, assigned by the store on publish.
    pub version: u64,
    /// Time of the last change in milliseconds since the epoch.
    pub last_updated_ms: i64,
    /// Table schema.
    pub schema: Schema,
    /// Partition spec.
    pub partition_spec: PartitionSpec,
    /// Table properties.
    pub properties: BTreeMap<String, String>,
    /// The current snapshot, if any.
    pub current_snapshot_id: Option<i64>,
    /// Highest snapshot id ever assigned; survives expiration.
    pub last_snapshot_id: i64,
    /// Retained snapshots in commit order.
    pub snapshots: Vec<Snapshot>,
    /// History of current-snapshot changes.
    pub snapshot_log: Vec<SnapshotLogEntry>,
}

impl TableMetadata {
    /// Metadata for a new, empty table.
    pub fn new(
        schema: Schema,
        partition_spec: PartitionSpec,
        location: impl Into<String>,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            table_uuid: Uuid::new_v4(),
            location: location.into(),
            version: 0,
            last_updated_ms: Utc::now().timestamp_millis(),
            schema,
            partition_spec,
            properties,
            current_snapshot_id: None,
            last_snapshot_id: 0,
            snapshots: Vec::new(),
            snapshot_log: Vec::new(),
        }
    }

    /// The current snapshot.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current_snapshot_id.and_then(|id| self.snapshot(id))
    }

    /// A retained snapshot by id.
    pub fn snapshot(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.snapshot_id == snapshot_id)
    }

    /// Id the next staged snapshot will use.
    pub fn next_snapshot_id(&self) -> i64 {
        self.last_snapshot_id + 1
    }

    /// Retry policy from the table properties.
    pub fn commit_config(&self) -> CommitConfig {
        CommitConfig::from_properties(&self.properties)
    }

    /// Manifest merge policy from the table properties.
    pub fn merge_config(&self) -> ManifestMergeConfig {
        ManifestMergeConfig::from_properties(&self.properties)
    }

    /// Paths of every manifest referenced by a retained snapshot.
    pub fn manifest_paths(&self) -> BTreeSet<String> {
        self.snapshots
            .iter()
            .flat_map(|s| s.manifests.iter().map(|m| m.path.clone()))
            .collect()
    }

    /// New metadata with `snapshot` added and made current.
    pub fn with_snapshot(&self, snapshot: Snapshot) -> Self {
        let mut next = self.clone();
        next.last_updated_ms = snapshot.timestamp_ms;
        next.last_snapshot_id = next.last_snapshot_id.max(snapshot.snapshot_id);
        next.current_snapshot_id = Some(snapshot.snapshot_id);
        next.snapshot_log.push(SnapshotLogEntry {
            timestamp_ms: snapshot.timestamp_ms,
            snapshot_id: snapshot.snapshot_id,
        });
        next.snapshots.push(snapshot);
        next
    }

    /// New metadata with `properties` replacing the current ones.
    pub fn with_properties(&self, properties: BTreeMap<String, String>) -> Self {
        let mut next = self.clone();
        next.properties = properties;
        next.last_updated_ms = Utc::now().timestamp_millis();
        next
    }

    /// New metadata without the snapshots in `ids`.
    ///
    /// History entries for removed snapshots are dropped as well.
    pub fn without_snapshots(&self, ids: &BTreeSet<i64>) -> Self {
        let mut next = self.clone();
        next.snapshots.retain(|s| !ids.contains(&s.snapshot_id));
        next.snapshot_log.retain(|e| !ids.contains(&e.snapshot_id));
        next.last_updated_ms = Utc::now().timestamp_millis();
        next
    }

    /// Check structural invariants of loaded metadata.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut ids = BTreeSet::new();
        for snapshot in &self.snapshots {
            if !ids.insert(snapshot.snapshot_id) {
                return Err(format!("duplicate snapshot id {}", snapshot.snapshot_id));
            }
            if snapshot.snapshot_id > self.last_snapshot_id {
                return Err(format!(
                    "snapshot id {} exceeds last assigned id {}",
                    snapshot.snapshot_id, self.last_snapshot_id
                ));
            }
        }
        if let Some(current) = self.current_snapshot_id
            && !ids.contains(&current)
        {
            return Err(format!("current snapshot {current} is not retained"));
        }
        Ok(())
    }
}
