//! In-memory metadata store.

use std::sync::{
    Arc, PoisonError,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    CommitError, ConcurrentModificationSnafu, ConflictSnafu, MetadataStore,
    TableAlreadyExistsSnafu, TableNotFoundSnafu,
};
use crate::metadata::TableMetadata;

const LOCATION: &str = "memory";

/// Metadata store holding the pointer in memory.
///
/// Clones share state. [`InMemoryMetadataStore::fail_commits`] makes the
/// next commits fail with a retryable error without publishing anything;
/// [`InMemoryMetadataStore::publish_before_next_commit`] lets another
/// writer win the next race.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    current: Arc<Mutex<Option<Arc<TableMetadata>>>>,
    failures_left: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
    interposed: Arc<std::sync::Mutex<Option<TableMetadata>>>,
}

impl InMemoryMetadataStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` commit attempts with `"Injected failure"`.
    pub fn fail_commits(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Number of commit attempts seen so far, successful or not.
    pub fn commit_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Publish `metadata` just before the next commit attempt compares
    /// versions, as if a concurrent writer had committed it first.
    pub fn publish_before_next_commit(&self, metadata: TableMetadata) {
        *self
            .interposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(metadata);
    }

    fn take_interposed(&self) -> Option<TableMetadata> {
        self.interposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create(&self, mut metadata: TableMetadata) -> Result<Arc<TableMetadata>, CommitError> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            return TableAlreadyExistsSnafu { location: LOCATION }.fail();
        }
        metadata.version = 0;
        let metadata = Arc::new(metadata);
        *current = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    async fn read_current(&self) -> Result<Arc<TableMetadata>, CommitError> {
        self.current
            .lock()
            .await
            .clone()
            .ok_or_else(|| TableNotFoundSnafu { location: LOCATION }.build())
    }

    async fn commit(
        &self,
        base: &TableMetadata,
        mut next: TableMetadata,
    ) -> Result<Arc<TableMetadata>, CommitError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock().await;
        if let Some(mut winner) = self.take_interposed() {
            winner.version = current.as_ref().map_or(0, |m| m.version + 1);
            *current = Some(Arc::new(winner));
        }
        let Some(latest) = current.as_ref() else {
            return TableNotFoundSnafu { location: LOCATION }.fail();
        };
        if latest.version != base.version {
            return ConflictSnafu {
                expected: base.version,
                found: latest.version,
            }
            .fail();
        }
        if self.take_injected_failure() {
            return ConcurrentModificationSnafu {
                message: "Injected failure",
            }
            .fail();
        }

        next.version = base.version + 1;
        let next = Arc::new(next);
        *current = Some(Arc::clone(&next));
        Ok(next)
    }
}
