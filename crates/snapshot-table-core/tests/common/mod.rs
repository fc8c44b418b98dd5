#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{collections::BTreeMap, sync::Arc};

use snapshot_table_core::{
    Table,
    catalog::InMemoryMetadataStore,
    expr::Expression,
    metadata::{
        DataFile, Datum, Metrics, NestedField, PartitionSpec, PrimitiveType, Schema, TableMetadata,
        properties::COMMIT_MIN_RETRY_WAIT_MS,
    },
    storage::MemoryFileIO,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const DAY_1: &str = "2018-06-08";
pub const DAY_2: &str = "2018-06-09";

pub fn schema() -> Schema {
    Schema::new(vec![
        NestedField::required(1, "id", PrimitiveType::Long),
        NestedField::optional(2, "data", PrimitiveType::String),
        NestedField::required(3, "date", PrimitiveType::String),
    ])
    .expect("valid schema")
}

pub fn spec() -> PartitionSpec {
    PartitionSpec::builder(&schema())
        .identity("date")
        .expect("date column")
        .build()
}

/// A file of five rows in `date` whose `id` column spans `low..=high`.
pub fn data_file(path: &str, date: &str, low: i64, high: i64) -> DataFile {
    let metrics = Metrics {
        record_count: 5,
        column_sizes: None,
        value_counts: Some(BTreeMap::from([(1, 5), (2, 3)])),
        null_value_counts: Some(BTreeMap::from([(1, 0), (2, 2)])),
        lower_bounds: Some(BTreeMap::from([(1, Datum::from(low).to_bytes())])),
        upper_bounds: Some(BTreeMap::from([(1, Datum::from(high).to_bytes())])),
    };
    DataFile::builder(&spec())
        .with_path(path)
        .with_file_size_in_bytes(10)
        .with_partition_path(&format!("date={date}"))
        .expect("partition path")
        .with_metrics(metrics)
        .build()
        .expect("data file")
}

pub fn file_day_1() -> DataFile {
    data_file("/path/to/data-1.parquet", DAY_1, 0, 4)
}

pub fn file_day_2() -> DataFile {
    data_file("/path/to/data-2.parquet", DAY_2, 5, 9)
}

pub fn file_day_2_modified() -> DataFile {
    data_file("/path/to/data-3.parquet", DAY_2, 5, 9)
}

pub fn day_2() -> Expression {
    Expression::equal("date", DAY_2)
}

pub fn id_range(low: i64, high: i64) -> Expression {
    Expression::greater_than_or_equal("id", low).and(Expression::less_than_or_equal("id", high))
}

/// An in-memory table with fast retries plus `properties`.
pub async fn memory_table(
    properties: &[(&str, &str)],
) -> (Table, InMemoryMetadataStore, MemoryFileIO) {
    let store = InMemoryMetadataStore::new();
    let io = MemoryFileIO::new();
    let mut props = BTreeMap::from([(COMMIT_MIN_RETRY_WAIT_MS.to_string(), "1".to_string())]);
    props.extend(
        properties
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    let metadata = TableMetadata::new(schema(), spec(), "memory", props);
    let table = Table::create(Arc::new(store.clone()), Arc::new(io.clone()), metadata)
        .await
        .expect("create table");
    (table, store, io)
}

/// Paths of the live files in the table's current snapshot, sorted.
pub async fn live_paths(table: &Table) -> Vec<String> {
    let mut paths: Vec<String> = table
        .new_scan()
        .plan_files()
        .await
        .expect("plan files")
        .into_iter()
        .map(|f| f.path)
        .collect();
    paths.sort();
    paths
}

pub async fn current_id(table: &Table) -> Option<i64> {
    table
        .current_snapshot()
        .await
        .expect("read metadata")
        .map(|s| s.snapshot_id)
}

pub fn no_files() -> Vec<DataFile> {
    Vec::new()
}
