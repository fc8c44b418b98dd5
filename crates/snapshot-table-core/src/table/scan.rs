//! Live-file planning for a snapshot.
//!
//! A scan lists the `Added` and `Existing` entries of one snapshot. With a
//! filter, manifests whose partition summaries cannot match are skipped and
//! remaining files are checked against their partition values and column
//! bounds. Pruning is conservative: a planned file may still hold no
//! matching rows.

use std::sync::Arc;

use futures::future::try_join_all;
use snafu::prelude::*;

use crate::{
    catalog::MetadataStore,
    expr::{Expression, FileOverlapEvaluator, ManifestEvaluator},
    manifest_io::ManifestIO,
    metadata::{DataFile, ManifestEntry, TableMetadata},
};

use super::{ExpressionSnafu, InvalidArgumentSnafu, ManifestSnafu, MetadataStoreSnafu, TableError};

#[derive(Debug, Clone)]
enum ScanSource {
    Store(Arc<dyn MetadataStore>),
    Metadata(Arc<TableMetadata>),
}

/// Plans the live files of a snapshot.
#[derive(Debug, Clone)]
pub struct TableScan {
    manifest_io: Arc<dyn ManifestIO>,
    source: ScanSource,
    filter: Option<Expression>,
    snapshot_id: Option<i64>,
}

impl TableScan {
    pub(crate) fn of_store(
        manifest_io: Arc<dyn ManifestIO>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self::new(manifest_io, ScanSource::Store(store))
    }

    pub(crate) fn of_metadata(
        manifest_io: Arc<dyn ManifestIO>,
        metadata: Arc<TableMetadata>,
    ) -> Self {
        Self::new(manifest_io, ScanSource::Metadata(metadata))
    }

    fn new(manifest_io: Arc<dyn ManifestIO>, source: ScanSource) -> Self {
        Self {
            manifest_io,
            source,
            filter: None,
            snapshot_id: None,
        }
    }

    /// Only plan files that may hold rows matching `expr`. Repeated calls
    /// combine filters with `and`.
    pub fn filter(mut self, expr: Expression) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Plan a retained snapshot instead of the current one.
    pub fn use_snapshot(mut self, snapshot_id: i64) -> Self {
        self.snapshot_id = Some(snapshot_id);
        self
    }

    /// Live entries, with snapshot ids resolved.
    pub async fn plan_entries(&self) -> Result<Vec<ManifestEntry>, TableError> {
        let metadata = match &self.source {
            ScanSource::Store(store) => store.read_current().await.context(MetadataStoreSnafu)?,
            ScanSource::Metadata(metadata) => Arc::clone(metadata),
        };
        let snapshot = match self.snapshot_id {
            Some(id) => metadata.snapshot(id).context(InvalidArgumentSnafu {
                message: format!("Cannot find snapshot with ID {id}"),
            })?,
            None => match metadata.current_snapshot() {
                Some(snapshot) => snapshot,
                None => return Ok(Vec::new()),
            },
        };

        let evaluators = match &self.filter {
            Some(expr) => Some((
                ManifestEvaluator::new(&metadata.schema, &metadata.partition_spec, expr)
                    .context(ExpressionSnafu)?,
                FileOverlapEvaluator::new(&metadata.schema, &metadata.partition_spec, expr)
                    .context(ExpressionSnafu)?,
            )),
            None => None,
        };

        let manifests = snapshot.manifests.iter().filter(|m| {
            m.has_live_files()
                && evaluators
                    .as_ref()
                    .is_none_or(|(manifests, _)| manifests.may_match(m))
        });
        let reads = try_join_all(manifests.map(|m| self.manifest_io.read_entries(m)))
            .await
            .context(ManifestSnafu)?;

        Ok(reads
            .into_iter()
            .flatten()
            .filter(|entry| {
                entry.is_live()
                    && evaluators
                        .as_ref()
                        .is_none_or(|(_, files)| files.may_overlap(&entry.data_file))
            })
            .collect())
    }

    /// Live data files.
    pub async fn plan_files(&self) -> Result<Vec<DataFile>, TableError> {
        Ok(self
            .plan_entries()
            .await?
            .into_iter()
            .map(|entry| entry.data_file)
            .collect())
    }
}
