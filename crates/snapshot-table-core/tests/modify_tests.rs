//! Integration tests for guarded overwrites.
//!
//! Each scenario prepares a modify against a base snapshot, lets other
//! writers commit in between, then checks whether the modify is accepted:
//! - unguarded and strict modifies,
//! - filtered modifies against compatible and conflicting changes,
//! - filtered modifies whose base has been expired.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use common::*;
use snapshot_table_core::{
    Table, TableError, ValidationError,
    catalog::{InMemoryMetadataStore, MetadataStore},
    metadata::{DataFile, TableMetadata},
    storage::MemoryFileIO,
};

fn assert_validation(err: &TableError, expected: &str) {
    assert!(
        matches!(err, TableError::Validation { .. }),
        "expected a validation failure, got {err:?}"
    );
    let message = err.to_string();
    assert!(
        message.contains(expected),
        "expected {expected:?} in {message:?}"
    );
}

async fn seeded_table() -> Table {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_1())
        .append_file(file_day_2())
        .commit()
        .await
        .expect("seed append");
    table
}

// =============================================================================
// Empty table
// =============================================================================

#[tokio::test]
async fn modify_empty_table_without_validation() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_modify()
        .modify_files(no_files(), [file_day_2_modified()])
        .commit()
        .await?;

    assert_eq!(live_paths(&table).await, vec![file_day_2_modified().path]);
    Ok(())
}

#[tokio::test]
async fn modify_empty_table_strict() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_modify()
        .modify_files(no_files(), [file_day_2_modified()])
        .validate(None)
        .commit()
        .await?;

    assert_eq!(current_id(&table).await, Some(1));
    Ok(())
}

#[tokio::test]
async fn modify_empty_table_with_filter() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_modify()
        .modify_files(no_files(), [file_day_2_modified()])
        .validate_with_filter(None, day_2())
        .commit()
        .await?;

    assert_eq!(live_paths(&table).await, vec![file_day_2_modified().path]);
    Ok(())
}

// =============================================================================
// No concurrent changes
// =============================================================================

#[tokio::test]
async fn modify_without_validation() -> TestResult {
    let table = seeded_table().await;
    table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .commit()
        .await?;

    assert_eq!(
        live_paths(&table).await,
        vec![file_day_1().path, file_day_2_modified().path]
    );
    Ok(())
}

#[tokio::test]
async fn modify_strict_on_unchanged_table() -> TestResult {
    let table = seeded_table().await;
    let base = current_id(&table).await;
    table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate(base)
        .commit()
        .await?;

    let snapshot = table.current_snapshot().await?.expect("snapshot");
    assert_eq!(snapshot.parent_id, base);
    assert_eq!(snapshot.operation.to_string(), "overwrite");
    Ok(())
}

#[tokio::test]
async fn modify_with_filter_on_unchanged_table() -> TestResult {
    let table = seeded_table().await;
    let base = current_id(&table).await;
    table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate_with_filter(base, day_2())
        .commit()
        .await?;

    assert_eq!(
        live_paths(&table).await,
        vec![file_day_1().path, file_day_2_modified().path]
    );
    Ok(())
}

// =============================================================================
// Concurrent changes
// =============================================================================

#[tokio::test]
async fn unguarded_modify_tolerates_concurrent_append() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()]);
    table
        .new_append()
        .append_file(file_day_1())
        .commit()
        .await?;
    modify.commit().await?;

    assert_eq!(
        live_paths(&table).await,
        vec![file_day_1().path, file_day_2_modified().path]
    );
    Ok(())
}

#[tokio::test]
async fn strict_modify_rejects_concurrent_append() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate(base);
    table
        .new_append()
        .append_file(file_day_1())
        .commit()
        .await?;
    let before = current_id(&table).await;

    let err = modify.commit().await.expect_err("timeline changed");
    assert_validation(&err, "Modify operation requires no changes to timeline.");
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::TimelineChanged {
            base: Some(1),
            current: Some(2)
        })
    ));
    assert_eq!(current_id(&table).await, before);
    Ok(())
}

#[tokio::test]
async fn strict_modify_rejects_concurrent_delete() -> TestResult {
    let table = seeded_table().await;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate(base);
    table
        .new_delete()
        .delete_file(&file_day_1())
        .commit()
        .await?;
    let before = current_id(&table).await;

    let err = modify.commit().await.expect_err("timeline changed");
    assert_validation(&err, "Modify operation requires no changes to timeline.");
    assert_eq!(current_id(&table).await, before);
    assert_eq!(live_paths(&table).await, vec![file_day_2().path]);
    Ok(())
}

#[tokio::test]
async fn strict_modify_rejects_concurrent_rewrite() -> TestResult {
    let table = seeded_table().await;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate(base);
    let compacted = data_file("/path/to/data-1-compacted.parquet", DAY_1, 0, 4);
    table
        .new_rewrite()
        .rewrite_files([file_day_1()], [compacted.clone()])
        .commit()
        .await?;
    let before = current_id(&table).await;

    let err = modify.commit().await.expect_err("timeline changed");
    assert_validation(&err, "Modify operation requires no changes to timeline.");
    assert_eq!(current_id(&table).await, before);
    assert_eq!(
        live_paths(&table).await,
        vec![compacted.path, file_day_2().path]
    );
    Ok(())
}

#[tokio::test]
async fn filtered_modify_accepts_addition_outside_filter() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate_with_filter(base, day_2());
    table
        .new_append()
        .append_file(file_day_1())
        .commit()
        .await?;
    modify.commit().await?;

    assert_eq!(current_id(&table).await, Some(3));
    assert_eq!(
        live_paths(&table).await,
        vec![file_day_1().path, file_day_2_modified().path]
    );
    Ok(())
}

#[tokio::test]
async fn filtered_modify_accepts_deletion_outside_filter() -> TestResult {
    let table = seeded_table().await;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate_with_filter(base, day_2());
    table
        .new_delete()
        .delete_file(&file_day_1())
        .commit()
        .await?;
    modify.commit().await?;

    assert_eq!(live_paths(&table).await, vec![file_day_2_modified().path]);
    Ok(())
}

#[tokio::test]
async fn filtered_modify_rejects_addition_inside_filter() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_1())
        .commit()
        .await?;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files(no_files(), [file_day_2_modified()])
        .validate_with_filter(base, day_2());
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;
    let before = current_id(&table).await;

    let err = modify.commit().await.expect_err("in-range addition");
    assert_validation(
        &err,
        "Modify operation requires no in-range changes to timeline.",
    );
    assert!(err.to_string().contains(&file_day_2().path));
    assert_eq!(current_id(&table).await, before);
    Ok(())
}

#[tokio::test]
async fn filtered_modify_reports_missing_file_deleted_concurrently() -> TestResult {
    let table = seeded_table().await;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate_with_filter(base, day_2());
    table
        .new_delete()
        .delete_file(&file_day_2())
        .commit()
        .await?;
    let before = current_id(&table).await;

    let err = modify.commit().await.expect_err("file already deleted");
    assert_validation(&err, "Missing required files to delete:");
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::MissingDeleteFiles { paths }) if paths == &vec![file_day_2().path]
    ));
    assert_eq!(current_id(&table).await, before);
    Ok(())
}

#[tokio::test]
async fn filtered_modify_rejects_concurrent_rewrite_inside_filter() -> TestResult {
    let table = seeded_table().await;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate_with_filter(base, day_2());
    table
        .new_rewrite()
        .rewrite_files([file_day_2()], [file_day_2()])
        .commit()
        .await?;
    let before = current_id(&table).await;

    let err = modify.commit().await.expect_err("in-range rewrite");
    assert_validation(
        &err,
        "Modify operation requires no in-range changes to timeline.",
    );
    assert_eq!(current_id(&table).await, before);
    Ok(())
}

#[tokio::test]
async fn filtered_modify_uses_column_bounds() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;

    // ids 0..=4 cannot match 5..=9
    let disjoint = table
        .new_modify()
        .modify_files(no_files(), [file_day_2_modified()])
        .validate_with_filter(None, id_range(5, 9));
    table
        .new_append()
        .append_file(file_day_1())
        .commit()
        .await?;
    disjoint.commit().await?;
    assert_eq!(current_id(&table).await, Some(2));

    // ids 0..=4 may match 3..=7
    let base = current_id(&table).await;
    let overlapping = table
        .new_modify()
        .modify_files([file_day_2_modified()], no_files())
        .validate_with_filter(base, id_range(3, 7));
    table
        .new_append()
        .append_file(data_file("/path/to/data-4.parquet", DAY_1, 0, 4))
        .commit()
        .await?;

    let err = overlapping.commit().await.expect_err("bounds overlap");
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::InRangeConflict { snapshot_id: 3, path }) if path == "/path/to/data-4.parquet"
    ));
    Ok(())
}

// =============================================================================
// Expired history
// =============================================================================

#[tokio::test]
async fn filtered_modify_tolerates_expired_base_after_addition() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate_with_filter(base, day_2());
    table
        .new_append()
        .append_file(file_day_1())
        .commit()
        .await?;
    table
        .expire_snapshots()
        .expire_snapshot_id(1)
        .commit()
        .await?;
    modify.commit().await?;

    assert_eq!(
        live_paths(&table).await,
        vec![file_day_1().path, file_day_2_modified().path]
    );
    Ok(())
}

#[tokio::test]
async fn filtered_modify_tolerates_expired_base_after_deletion() -> TestResult {
    let table = seeded_table().await;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate_with_filter(base, day_2());
    table
        .new_delete()
        .delete_file(&file_day_1())
        .commit()
        .await?;
    table
        .expire_snapshots()
        .expire_snapshot_id(1)
        .commit()
        .await?;
    modify.commit().await?;

    assert_eq!(live_paths(&table).await, vec![file_day_2_modified().path]);
    Ok(())
}

#[tokio::test]
async fn filtered_modify_rejects_expired_intervening_snapshot() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_1())
        .commit()
        .await?;
    let base = current_id(&table).await;

    let modify = table
        .new_modify()
        .modify_files(no_files(), [file_day_2_modified()])
        .validate_with_filter(base, day_2());
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;
    table
        .new_delete()
        .delete_file(&file_day_1())
        .commit()
        .await?;
    table
        .expire_snapshots()
        .expire_snapshot_id(2)
        .commit()
        .await?;
    let before = current_id(&table).await;

    let err = modify.commit().await.expect_err("history gap");
    assert_validation(
        &err,
        "Modify operation requires the timeline to be present.",
    );
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::TimelineMissing { snapshot_id: 2 })
    ));
    assert_eq!(current_id(&table).await, before);
    Ok(())
}

#[tokio::test]
async fn filtered_modify_on_empty_base_rejects_expired_history() -> TestResult {
    let (table, _, _) = memory_table(&[]).await;

    let modify = table
        .new_modify()
        .modify_files(no_files(), [file_day_2_modified()])
        .validate_with_filter(None, day_2());
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;
    table
        .new_append()
        .append_file(file_day_1())
        .commit()
        .await?;
    table
        .expire_snapshots()
        .expire_snapshot_id(1)
        .commit()
        .await?;

    let err = modify.commit().await.expect_err("history gap");
    assert_validation(
        &err,
        "Modify operation requires the timeline to be present.",
    );
    assert_eq!(current_id(&table).await, Some(2));
    Ok(())
}

// =============================================================================
// Races lost at the swap
// =============================================================================

/// Stage an append of `file` on a separate view of `table`'s current state,
/// without publishing it to `table`'s store.
async fn concurrent_append(table: &Table, io: &MemoryFileIO, file: DataFile) -> TableMetadata {
    let other_store = InMemoryMetadataStore::new();
    other_store
        .create(TableMetadata::clone(
            &table.metadata().await.expect("metadata"),
        ))
        .await
        .expect("copy metadata");
    let other = Table::new(Arc::new(other_store), Arc::new(io.clone()));
    let committed = other
        .new_append()
        .append_file(file)
        .commit()
        .await
        .expect("concurrent append");
    TableMetadata::clone(&committed)
}

#[tokio::test]
async fn strict_modify_revalidates_after_losing_the_swap() -> TestResult {
    let (table, store, io) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;
    let base = current_id(&table).await;

    let winner = concurrent_append(&table, &io, file_day_1()).await;
    store.publish_before_next_commit(winner);
    let attempts = store.commit_attempts();

    let err = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate(base)
        .commit()
        .await
        .expect_err("timeline changed during the swap");
    assert_validation(&err, "Modify operation requires no changes to timeline.");
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::TimelineChanged {
            base: Some(1),
            current: Some(2)
        })
    ));
    assert_eq!(store.commit_attempts() - attempts, 1);
    assert_eq!(current_id(&table).await, Some(2));

    let referenced = table.metadata().await?.manifest_paths();
    assert!(io.paths().iter().all(|path| referenced.contains(path)));
    assert!(!io.deleted_paths().is_empty());
    Ok(())
}

#[tokio::test]
async fn filtered_modify_revalidates_after_losing_the_swap() -> TestResult {
    let (table, store, io) = memory_table(&[]).await;
    table
        .new_append()
        .append_file(file_day_2())
        .commit()
        .await?;
    let base = current_id(&table).await;

    let in_range = data_file("/path/to/data-4.parquet", DAY_2, 5, 9);
    let winner = concurrent_append(&table, &io, in_range.clone()).await;
    store.publish_before_next_commit(winner);
    let attempts = store.commit_attempts();

    let err = table
        .new_modify()
        .modify_files([file_day_2()], [file_day_2_modified()])
        .validate_with_filter(base, day_2())
        .commit()
        .await
        .expect_err("in-range change during the swap");
    assert_validation(
        &err,
        "Modify operation requires no in-range changes to timeline.",
    );
    assert!(err.to_string().contains(&in_range.path));
    assert_eq!(store.commit_attempts() - attempts, 1);
    assert_eq!(
        live_paths(&table).await,
        vec![file_day_2().path, in_range.path]
    );
    Ok(())
}
