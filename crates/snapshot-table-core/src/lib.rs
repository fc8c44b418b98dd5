//! Core engine for snapshot-based analytic tables.
//!
//! This crate provides the transactional metadata layer of a table format:
//!
//! - An immutable data model: table metadata, snapshots, manifests and
//!   data file descriptors with column statistics (`metadata` module).
//! - Staged table operations (append, delete, rewrite, modify with
//!   conflict validation, snapshot expiration, property updates) and the
//!   optimistic commit driver that retries them (`update` module).
//! - Atomic multi-operation commits (`transaction` module).
//! - A metadata store abstraction with a compare-and-swap commit, backed by
//!   versioned JSON files plus a `CURRENT` pointer or held in memory
//!   (`catalog` module).
//! - Filter expressions used for scan planning and conflict detection
//!   (`expr` module).
//! - Storage utilities and the on-disk layout of a table root (`storage`,
//!   `layout` modules).
//!
//! Reading or writing data files themselves is out of scope; callers supply
//! `DataFile` descriptors with their statistics.
#![deny(missing_docs)]
pub mod catalog;
pub mod expr;
pub mod layout;
pub mod manifest_io;
pub mod metadata;
pub mod storage;
pub mod table;
pub mod transaction;
pub mod update;

pub use table::{Table, TableError, TableScan, ValidationError};
pub use transaction::Transaction;
