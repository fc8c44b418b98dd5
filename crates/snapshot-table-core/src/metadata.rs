//! The table data model.
//!
//! A table is a sequence of immutable [`TableMetadata`] values. Each one
//! lists retained [`Snapshot`]s; a snapshot lists [`ManifestFile`]s; a
//! manifest lists [`ManifestEntry`] records, each describing one
//! [`DataFile`]. The live files of a snapshot are the entries with status
//! `Added` or `Existing` across its manifests.
//!
//! All types serialize with `serde`; metadata versions and manifests are
//! persisted as JSON.

pub mod data_file;
pub mod datum;
pub mod manifest;
pub mod partition;
pub mod properties;
pub mod schema;
pub mod snapshot;
pub mod table_metadata;

pub use data_file::{DataFile, DataFileBuilder, DataFileError, FileFormat, Metrics};
pub use datum::{Datum, DatumError};
pub use manifest::{EntryStatus, ManifestEntry, ManifestFile, PartitionFieldSummary};
pub use partition::{PartitionData, PartitionField, PartitionSpec, PartitionSpecError, Transform};
pub use properties::{CommitConfig, ManifestMergeConfig};
pub use schema::{NestedField, PrimitiveType, Schema, SchemaError};
pub use snapshot::{Operation, Snapshot, SnapshotLogEntry};
pub use table_metadata::TableMetadata;
