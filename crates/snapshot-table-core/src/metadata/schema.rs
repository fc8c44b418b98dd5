//! Table schema: a flat list of primitive fields with stable ids.
//!
//! Field ids, not names, are what data file statistics are keyed by, so
//! both must be unique within a schema.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Primitive column types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    /// Boolean value.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// Days since the Unix epoch.
    Date,
    /// Microseconds since the Unix epoch.
    Timestamp,
    /// UTF-8 string.
    String,
    /// Arbitrary bytes.
    Binary,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Date => "date",
            PrimitiveType::Timestamp => "timestamp",
            PrimitiveType::String => "string",
            PrimitiveType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// A column of a [`Schema`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NestedField {
    /// Stable field id.
    pub id: i32,
    /// Column name.
    pub name: String,
    /// Whether values are always present.
    pub required: bool,
    /// Column type.
    pub field_type: PrimitiveType,
}

impl NestedField {
    /// A required field.
    pub fn required(id: i32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.into(),
            required: true,
            field_type,
        }
    }

    /// An optional field.
    pub fn optional(id: i32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.into(),
            required: false,
            field_type,
        }
    }
}

impl fmt::Display for NestedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let req = if self.required {
            "required"
        } else {
            "optional"
        };
        write!(f, "{}: {} {req} {}", self.id, self.name, self.field_type)
    }
}

/// Errors raised when constructing a [`Schema`].
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// Two fields share a name.
    #[snafu(display("Duplicate field name: {name}"))]
    DuplicateFieldName {
        /// The duplicated name.
        name: String,
    },

    /// Two fields share an id.
    #[snafu(display("Duplicate field id: {id}"))]
    DuplicateFieldId {
        /// The duplicated id.
        id: i32,
    },
}

/// The table schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    /// Schema id.
    pub schema_id: i32,
    fields: Vec<NestedField>,
}

impl Schema {
    /// Build a schema with id 0, rejecting duplicate names or ids.
    pub fn new(fields: Vec<NestedField>) -> Result<Self, SchemaError> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for field in &fields {
            ensure!(
                names.insert(field.name.as_str()),
                DuplicateFieldNameSnafu {
                    name: field.name.clone()
                }
            );
            ensure!(ids.insert(field.id), DuplicateFieldIdSnafu { id: field.id });
        }
        Ok(Self {
            schema_id: 0,
            fields,
        })
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[NestedField] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by id.
    pub fn field_by_id(&self, id: i32) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Highest field id in use.
    pub fn highest_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names_and_ids() {
        let dup_name = Schema::new(vec![
            NestedField::required(1, "id", PrimitiveType::Long),
            NestedField::optional(2, "id", PrimitiveType::String),
        ]);
        assert_eq!(
            dup_name,
            Err(SchemaError::DuplicateFieldName { name: "id".into() })
        );

        let dup_id = Schema::new(vec![
            NestedField::required(1, "id", PrimitiveType::Long),
            NestedField::optional(1, "data", PrimitiveType::String),
        ]);
        assert_eq!(dup_id, Err(SchemaError::DuplicateFieldId { id: 1 }));
    }

    #[test]
    fn lookups_by_name_and_id() -> Result<(), SchemaError> {
        let schema = Schema::new(vec![
            NestedField::required(1, "id", PrimitiveType::Long),
            NestedField::required(3, "date", PrimitiveType::String),
        ])?;
        assert_eq!(schema.field_by_name("date").map(|f| f.id), Some(3));
        assert_eq!(
            schema.field_by_id(1).map(|f| f.field_type),
            Some(PrimitiveType::Long)
        );
        assert_eq!(schema.highest_field_id(), 3);
        assert_eq!(schema.fields()[0].to_string(), "1: id required long");
        Ok(())
    }
}
