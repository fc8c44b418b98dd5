//! Partition specs and per-file partition tuples.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::{
    datum::{Datum, DatumError},
    schema::{PrimitiveType, Schema},
};

/// First id handed to partition fields.
pub const PARTITION_FIELD_ID_START: i32 = 1000;

/// Value used in partition paths for a null partition value.
pub const NULL_PARTITION_VALUE: &str = "null";

/// How a partition value is derived from its source column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// The partition value is the source value.
    Identity,
    /// Always null; used for dropped partition fields.
    Void,
}

/// One field of a [`PartitionSpec`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionField {
    /// Schema field the value is derived from.
    pub source_id: i32,
    /// Partition field id.
    pub field_id: i32,
    /// Partition field name, used in partition paths.
    pub name: String,
    /// Derivation from the source column.
    pub transform: Transform,
}

/// Errors building partition specs or parsing partition paths.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum PartitionSpecError {
    /// The named source column does not exist.
    #[snafu(display("Cannot find source column: {name}"))]
    UnknownSourceColumn {
        /// Column name requested.
        name: String,
    },

    /// A partition field with this name already exists.
    #[snafu(display("Cannot use partition name more than once: {name}"))]
    DuplicatePartitionName {
        /// Duplicated partition name.
        name: String,
    },

    /// A partition path did not match the spec.
    #[snafu(display("Invalid partition path {path:?}: {reason}"))]
    InvalidPartitionPath {
        /// Path that was parsed.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A partition value could not be parsed.
    #[snafu(display("Invalid partition value in {path:?}: {source}"))]
    InvalidPartitionValue {
        /// Path that was parsed.
        path: String,
        /// Parse failure.
        source: DatumError,
    },
}

/// How a table's data files are partitioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionSpec {
    /// Spec id recorded on manifests.
    pub spec_id: i32,
    fields: Vec<PartitionField>,
    /// Source column types, in field order.
    source_types: Vec<PrimitiveType>,
}

impl PartitionSpec {
    /// A spec without partition fields.
    pub fn unpartitioned() -> Self {
        Self {
            spec_id: 0,
            fields: Vec::new(),
            source_types: Vec::new(),
        }
    }

    /// Start building a spec over `schema`.
    pub fn builder(schema: &Schema) -> PartitionSpecBuilder<'_> {
        PartitionSpecBuilder {
            schema,
            spec: Self::unpartitioned(),
        }
    }

    /// Partition fields in order.
    pub fn fields(&self) -> &[PartitionField] {
        &self.fields
    }

    /// Whether the spec has no fields.
    pub fn is_unpartitioned(&self) -> bool {
        self.fields.is_empty()
    }

    /// Type of the partition value at `index`.
    pub fn field_type(&self, index: usize) -> Option<PrimitiveType> {
        self.source_types.get(index).copied()
    }

    /// Position of the identity partition field sourced from `source_id`.
    pub fn identity_position(&self, source_id: i32) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.source_id == source_id && f.transform == Transform::Identity)
    }

    /// Parse a Hive-style partition path such as `date=2018-06-08`.
    pub fn parse_partition_path(&self, path: &str) -> Result<PartitionData, PartitionSpecError> {
        let parts: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };
        ensure!(
            parts.len() == self.fields.len(),
            InvalidPartitionPathSnafu {
                path,
                reason: format!(
                    "expected {} partition fields, found {}",
                    self.fields.len(),
                    parts.len()
                ),
            }
        );

        let mut values = Vec::with_capacity(parts.len());
        for ((part, field), ty) in parts.iter().zip(&self.fields).zip(&self.source_types) {
            let Some((name, raw)) = part.split_once('=') else {
                return InvalidPartitionPathSnafu {
                    path,
                    reason: format!("missing '=' in {part:?}"),
                }
                .fail();
            };
            ensure!(
                name == field.name,
                InvalidPartitionPathSnafu {
                    path,
                    reason: format!("expected field {:?}, found {name:?}", field.name),
                }
            );
            let value = if raw == NULL_PARTITION_VALUE || field.transform == Transform::Void {
                None
            } else {
                Some(Datum::parse(*ty, raw).context(InvalidPartitionValueSnafu { path })?)
            };
            values.push(value);
        }
        Ok(PartitionData::new(values))
    }
}

/// Builder for [`PartitionSpec`].
#[derive(Debug)]
pub struct PartitionSpecBuilder<'a> {
    schema: &'a Schema,
    spec: PartitionSpec,
}

impl PartitionSpecBuilder<'_> {
    fn add(mut self, source: &str, transform: Transform) -> Result<Self, PartitionSpecError> {
        let field = self
            .schema
            .field_by_name(source)
            .context(UnknownSourceColumnSnafu { name: source })?;
        ensure!(
            self.spec.fields.iter().all(|f| f.name != source),
            DuplicatePartitionNameSnafu { name: source }
        );
        let field_id = PARTITION_FIELD_ID_START + self.spec.fields.len() as i32;
        self.spec.fields.push(PartitionField {
            source_id: field.id,
            field_id,
            name: source.to_string(),
            transform,
        });
        self.spec.source_types.push(field.field_type);
        Ok(self)
    }

    /// Partition by the value of `source`.
    pub fn identity(self, source: &str) -> Result<Self, PartitionSpecError> {
        self.add(source, Transform::Identity)
    }

    /// Add an always-null partition field for `source`.
    pub fn void(self, source: &str) -> Result<Self, PartitionSpecError> {
        self.add(source, Transform::Void)
    }

    /// Finish the spec.
    pub fn build(self) -> PartitionSpec {
        self.spec
    }
}

/// Partition tuple of a data file: one optional value per partition field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PartitionData {
    values: Vec<Option<Datum>>,
}

impl PartitionData {
    /// Wrap partition values.
    pub fn new(values: Vec<Option<Datum>>) -> Self {
        Self { values }
    }

    /// Value at `index`; `None` for a null or missing value.
    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the tuple is empty (unpartitioned table).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values in order.
    pub fn values(&self) -> &[Option<Datum>] {
        &self.values
    }
}
