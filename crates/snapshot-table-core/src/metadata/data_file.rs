//! Data file descriptors and their column statistics.
//!
//! A [`DataFile`] is immutable once built. Statistics maps are keyed by
//! schema field id; bounds hold single-value encodings (see
//! [`Datum::to_bytes`](super::datum::Datum::to_bytes)).

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::partition::{PartitionData, PartitionSpec, PartitionSpecError};

/// Storage format of a data file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Apache Parquet.
    Parquet,
    /// Apache Avro.
    Avro,
    /// Apache ORC.
    Orc,
}

impl FileFormat {
    /// Infer the format from a path's extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "parquet" => Some(FileFormat::Parquet),
            "avro" => Some(FileFormat::Avro),
            "orc" => Some(FileFormat::Orc),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Parquet => f.write_str("parquet"),
            FileFormat::Avro => f.write_str("avro"),
            FileFormat::Orc => f.write_str("orc"),
        }
    }
}

/// Column-level statistics collected when a data file is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    /// Rows in the file.
    pub record_count: u64,
    /// Bytes per column.
    pub column_sizes: Option<BTreeMap<i32, u64>>,
    /// Values (including nulls) per column.
    pub value_counts: Option<BTreeMap<i32, u64>>,
    /// Nulls per column.
    pub null_value_counts: Option<BTreeMap<i32, u64>>,
    /// Encoded lower bound per column.
    pub lower_bounds: Option<BTreeMap<i32, Vec<u8>>>,
    /// Encoded upper bound per column.
    pub upper_bounds: Option<BTreeMap<i32, Vec<u8>>>,
}

/// An immutable data file descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataFile {
    /// Location of the file; identifies it within a table.
    pub path: String,
    /// Storage format.
    pub format: FileFormat,
    /// Partition tuple.
    pub partition: PartitionData,
    /// Rows in the file.
    pub record_count: u64,
    /// File size in bytes.
    pub file_size_in_bytes: u64,
    /// Bytes per column.
    pub column_sizes: Option<BTreeMap<i32, u64>>,
    /// Values per column.
    pub value_counts: Option<BTreeMap<i32, u64>>,
    /// Nulls per column.
    pub null_value_counts: Option<BTreeMap<i32, u64>>,
    /// Encoded lower bound per column.
    pub lower_bounds: Option<BTreeMap<i32, Vec<u8>>>,
    /// Encoded upper bound per column.
    pub upper_bounds: Option<BTreeMap<i32, Vec<u8>>>,
    /// Recommended split offsets.
    pub split_offsets: Option<Vec<u64>>,
    /// Encryption key metadata.
    pub key_metadata: Option<Vec<u8>>,
}

impl DataFile {
    /// Start building a data file for a table partitioned by `spec`.
    pub fn builder(spec: &PartitionSpec) -> DataFileBuilder<'_> {
        DataFileBuilder {
            spec,
            path: None,
            format: None,
            partition: None,
            record_count: None,
            file_size_in_bytes: None,
            metrics: Metrics::default(),
            split_offsets: None,
            key_metadata: None,
        }
    }

    /// Null count for a column, when recorded.
    pub fn null_count(&self, field_id: i32) -> Option<u64> {
        self.null_value_counts.as_ref()?.get(&field_id).copied()
    }

    /// Value count for a column, when recorded.
    pub fn value_count(&self, field_id: i32) -> Option<u64> {
        self.value_counts.as_ref()?.get(&field_id).copied()
    }

    /// Encoded lower bound for a column, when recorded.
    pub fn lower_bound(&self, field_id: i32) -> Option<&[u8]> {
        self.lower_bounds
            .as_ref()?
            .get(&field_id)
            .map(Vec::as_slice)
    }

    /// Encoded upper bound for a column, when recorded.
    pub fn upper_bound(&self, field_id: i32) -> Option<&[u8]> {
        self.upper_bounds
            .as_ref()?
            .get(&field_id)
            .map(Vec::as_slice)
    }
}

/// Errors from [`DataFileBuilder::build`].
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum DataFileError {
    /// A required attribute was not set.
    #[snafu(display("Cannot build data file: {attribute} is required"))]
    MissingAttribute {
        /// Missing attribute name.
        attribute: &'static str,
    },

    /// No format was given and none could be inferred.
    #[snafu(display("Cannot infer file format from path: {path}"))]
    UnknownFormat {
        /// The file path.
        path: String,
    },

    /// The partition tuple does not fit the spec.
    #[snafu(display("Partition has {actual} values but spec has {expected} fields"))]
    PartitionArity {
        /// Number of spec fields.
        expected: usize,
        /// Number of values given.
        actual: usize,
    },

    /// The partition path could not be parsed.
    #[snafu(display("Invalid partition: {source}"))]
    Partition {
        /// Parse failure.
        source: PartitionSpecError,
    },
}

/// Builder for [`DataFile`].
#[derive(Debug, Clone)]
pub struct DataFileBuilder<'a> {
    spec: &'a PartitionSpec,
    path: Option<String>,
    format: Option<FileFormat>,
    partition: Option<PartitionData>,
    record_count: Option<u64>,
    file_size_in_bytes: Option<u64>,
    metrics: Metrics,
    split_offsets: Option<Vec<u64>>,
    key_metadata: Option<Vec<u8>>,
}

impl DataFileBuilder<'_> {
    /// Set the file path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the format explicitly instead of inferring it from the path.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the partition tuple.
    pub fn with_partition(mut self, partition: PartitionData) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Set the partition tuple from a path such as `date=2018-06-08`.
    pub fn with_partition_path(mut self, path: &str) -> Result<Self, DataFileError> {
        self.partition = Some(
            self.spec
                .parse_partition_path(path)
                .context(PartitionSnafu)?,
        );
        Ok(self)
    }

    /// Set the row count.
    pub fn with_record_count(mut self, record_count: u64) -> Self {
        self.record_count = Some(record_count);
        self
    }

    /// Set the file size.
    pub fn with_file_size_in_bytes(mut self, size: u64) -> Self {
        self.file_size_in_bytes = Some(size);
        self
    }

    /// Set column statistics; also sets the row count.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.record_count = Some(metrics.record_count);
        self.metrics = metrics;
        self
    }

    /// Set split offsets.
    pub fn with_split_offsets(mut self, offsets: Vec<u64>) -> Self {
        self.split_offsets = Some(offsets);
        self
    }

    /// Set encryption key metadata.
    pub fn with_key_metadata(mut self, key_metadata: impl Into<Vec<u8>>) -> Self {
        self.key_metadata = Some(key_metadata.into());
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<DataFile, DataFileError> {
        let path = self
            .path
            .context(MissingAttributeSnafu { attribute: "path" })?;
        let record_count = self.record_count.context(MissingAttributeSnafu {
            attribute: "record count",
        })?;
        let file_size_in_bytes = self.file_size_in_bytes.context(MissingAttributeSnafu {
            attribute: "file size",
        })?;
        let format = match self.format {
            Some(format) => format,
            None => FileFormat::from_path(&path).context(UnknownFormatSnafu {
                path: path.as_str(),
            })?,
        };

        let expected = self.spec.fields().len();
        let partition = match self.partition {
            Some(partition) => partition,
            None if expected == 0 => PartitionData::default(),
            None => {
                return MissingAttributeSnafu {
                    attribute: "partition",
                }
                .fail();
            }
        };
        ensure!(
            partition.len() == expected,
            PartitionAritySnafu {
                expected,
                actual: partition.len()
            }
        );

        Ok(DataFile {
            path,
            format,
            partition,
            record_count,
            file_size_in_bytes,
            column_sizes: self.metrics.column_sizes,
            value_counts: self.metrics.value_counts,
            null_value_counts: self.metrics.null_value_counts,
            lower_bounds: self.metrics.lower_bounds,
            upper_bounds: self.metrics.upper_bounds,
            split_offsets: self.split_offsets,
            key_metadata: self.key_metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        datum::Datum,
        schema::{NestedField, PrimitiveType, Schema},
    };

    fn spec() -> PartitionSpec {
        let schema = Schema::new(vec![
            NestedField::required(1, "id", PrimitiveType::Long),
            NestedField::required(3, "date", PrimitiveType::String),
        ])
        .expect("schema");
        PartitionSpec::builder(&schema)
            .identity("date")
            .expect("date column")
            .build()
    }

    #[test]
    fn builder_infers_format_and_parses_partition() -> Result<(), DataFileError> {
        let spec = spec();
        let file = DataFile::builder(&spec)
            .with_path("/path/to/data-1.parquet")
            .with_file_size_in_bytes(10)
            .with_partition_path("date=2018-06-08")?
            .with_record_count(1)
            .build()?;

        assert_eq!(file.format, FileFormat::Parquet);
        assert_eq!(file.partition.get(0), Some(&Datum::from("2018-06-08")));
        assert_eq!(file.null_count(1), None);
        Ok(())
    }

    #[test]
    fn builder_requires_core_attributes() {
        let spec = spec();
        let missing_size = DataFile::builder(&spec)
            .with_path("a.parquet")
            .with_partition_path("date=2018-06-08")
            .and_then(|b| b.with_record_count(1).build());
        assert_eq!(
            missing_size,
            Err(DataFileError::MissingAttribute {
                attribute: "file size"
            })
        );

        let missing_partition = DataFile::builder(&spec)
            .with_path("a.parquet")
            .with_record_count(1)
            .with_file_size_in_bytes(1)
            .build();
        assert!(matches!(
            missing_partition,
            Err(DataFileError::MissingAttribute {
                attribute: "partition"
            })
        ));

        let unknown_format = DataFile::builder(&spec)
            .with_path("a.csv")
            .with_record_count(1)
            .with_file_size_in_bytes(1)
            .with_partition(PartitionData::new(vec![None]))
            .build();
        assert!(matches!(
            unknown_format,
            Err(DataFileError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn metrics_accessors_read_per_field_statistics() -> Result<(), DataFileError> {
        let spec = spec();
        let file = DataFile::builder(&spec)
            .with_path("data-2.parquet")
            .with_file_size_in_bytes(10)
            .with_partition_path("date=2018-06-09")?
            .with_metrics(Metrics {
                record_count: 5,
                value_counts: Some(BTreeMap::from([(1, 5)])),
                null_value_counts: Some(BTreeMap::from([(1, 0)])),
                lower_bounds: Some(BTreeMap::from([(1, Datum::Long(5).to_bytes())])),
                upper_bounds: Some(BTreeMap::from([(1, Datum::Long(9).to_bytes())])),
                ..Metrics::default()
            })
            .build()?;

        assert_eq!(file.record_count, 5);
        assert_eq!(file.value_count(1), Some(5));
        assert_eq!(file.null_count(1), Some(0));
        assert_eq!(
            file.lower_bound(1),
            Some(Datum::Long(5).to_bytes().as_slice())
        );
        assert_eq!(file.upper_bound(2), None);
        Ok(())
    }
}
