//! Updating table properties.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    metadata::TableMetadata,
    table::{InvalidArgumentSnafu, TableError},
};

use super::{OperationCore, PendingUpdate};

pub(crate) const NAME: &str = "UpdateProperties";

#[derive(Debug, Default)]
pub(crate) struct PropertiesOp {
    updates: BTreeMap<String, String>,
    removals: BTreeSet<String>,
}

impl PropertiesOp {
    pub(crate) fn stage(&self, base: &TableMetadata) -> Result<TableMetadata, TableError> {
        if let Some(key) = self.removals.iter().find(|k| self.updates.contains_key(*k)) {
            return InvalidArgumentSnafu {
                message: format!("Cannot set and remove property {key:?}"),
            }
            .fail();
        }
        let mut properties = base.properties.clone();
        for key in &self.removals {
            properties.remove(key);
        }
        properties.extend(self.updates.clone());
        Ok(base.with_properties(properties))
    }
}

/// Sets and removes table properties.
///
/// Properties are re-applied to the latest metadata on conflict, so
/// concurrent changes to other keys are preserved.
#[derive(Debug)]
pub struct UpdateProperties<'a> {
    core: OperationCore<'a>,
    op: PropertiesOp,
}

impl<'a> UpdateProperties<'a> {
    pub(crate) fn new(core: OperationCore<'a>) -> Self {
        Self {
            core,
            op: PropertiesOp::default(),
        }
    }

    /// Set `key` to `value`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.op.updates.insert(key.into(), value.into());
        self
    }

    /// Remove `key`.
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.op.removals.insert(key.into());
        self
    }

    /// Commit the property changes.
    pub async fn commit(self) -> Result<Arc<TableMetadata>, TableError> {
        self.core.commit(PendingUpdate::Properties(self.op)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{NestedField, PartitionSpec, PrimitiveType, Schema};

    fn base() -> TableMetadata {
        let schema =
            Schema::new(vec![NestedField::required(1, "id", PrimitiveType::Long)]).expect("schema");
        let props = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        TableMetadata::new(schema, PartitionSpec::unpartitioned(), "memory", props)
    }

    #[test]
    fn sets_and_removes_keys() {
        let op = PropertiesOp {
            updates: BTreeMap::from([("c".to_string(), "3".to_string())]),
            removals: BTreeSet::from(["a".to_string()]),
        };
        let next = op.stage(&base()).expect("stage");
        let keys: Vec<&str> = next.properties.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn setting_and_removing_one_key_is_rejected() {
        let op = PropertiesOp {
            updates: BTreeMap::from([("a".to_string(), "3".to_string())]),
            removals: BTreeSet::from(["a".to_string()]),
        };
        let err = op.stage(&base()).expect_err("conflict");
        assert!(matches!(err, TableError::InvalidArgument { .. }));
    }
}
