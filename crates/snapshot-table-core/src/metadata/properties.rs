//! Table property keys and the typed configuration read from them.
//!
//! Properties are plain strings in [`TableMetadata`](super::TableMetadata).
//! Unparsable values fall back to the default with a warning rather than
//! failing the commit that reads them.

use std::{collections::BTreeMap, str::FromStr, time::Duration};

use log::warn;

/// Retries after the first commit attempt.
pub const COMMIT_NUM_RETRIES: &str = "commit.retry.num-retries";
/// Default for [`COMMIT_NUM_RETRIES`].
pub const COMMIT_NUM_RETRIES_DEFAULT: u32 = 4;

/// First backoff delay in milliseconds.
pub const COMMIT_MIN_RETRY_WAIT_MS: &str = "commit.retry.min-wait-ms";
/// Default for [`COMMIT_MIN_RETRY_WAIT_MS`].
pub const COMMIT_MIN_RETRY_WAIT_MS_DEFAULT: u64 = 100;

/// Backoff cap in milliseconds.
pub const COMMIT_MAX_RETRY_WAIT_MS: &str = "commit.retry.max-wait-ms";
/// Default for [`COMMIT_MAX_RETRY_WAIT_MS`].
pub const COMMIT_MAX_RETRY_WAIT_MS_DEFAULT: u64 = 60_000;

/// Bin size used when packing manifests for merging.
pub const MANIFEST_TARGET_SIZE_BYTES: &str = "commit.manifest.target-size-bytes";
/// Default for [`MANIFEST_TARGET_SIZE_BYTES`] (8 MiB).
pub const MANIFEST_TARGET_SIZE_BYTES_DEFAULT: u64 = 8 * 1024 * 1024;

/// Bins holding the newest manifest are merged only once they reach this many manifests.
pub const MANIFEST_MIN_MERGE_COUNT: &str = "commit.manifest.min-count-to-merge";
/// Default for [`MANIFEST_MIN_MERGE_COUNT`].
pub const MANIFEST_MIN_MERGE_COUNT_DEFAULT: usize = 100;

/// Enables manifest merging for merging operations.
pub const MANIFEST_MERGE_ENABLED: &str = "commit.manifest-merge.enabled";
/// Default for [`MANIFEST_MERGE_ENABLED`].
pub const MANIFEST_MERGE_ENABLED_DEFAULT: bool = true;

fn parse_or<T: FromStr + Copy>(props: &BTreeMap<String, String>, key: &str, default: T) -> T {
    match props.get(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid value {raw:?} for table property {key}; using default");
                default
            }
        },
    }
}

/// Retry policy for commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitConfig {
    /// Retries after the first attempt.
    pub num_retries: u32,
    /// First backoff delay.
    pub min_wait: Duration,
    /// Backoff cap.
    pub max_wait: Duration,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            num_retries: COMMIT_NUM_RETRIES_DEFAULT,
            min_wait: Duration::from_millis(COMMIT_MIN_RETRY_WAIT_MS_DEFAULT),
            max_wait: Duration::from_millis(COMMIT_MAX_RETRY_WAIT_MS_DEFAULT),
        }
    }
}

impl CommitConfig {
    /// Read the retry policy from table properties.
    pub fn from_properties(props: &BTreeMap<String, String>) -> Self {
        let min_ms = parse_or(
            props,
            COMMIT_MIN_RETRY_WAIT_MS,
            COMMIT_MIN_RETRY_WAIT_MS_DEFAULT,
        );
        let max_ms = parse_or(
            props,
            COMMIT_MAX_RETRY_WAIT_MS,
            COMMIT_MAX_RETRY_WAIT_MS_DEFAULT,
        );
        Self {
            num_retries: parse_or(props, COMMIT_NUM_RETRIES, COMMIT_NUM_RETRIES_DEFAULT),
            min_wait: Duration::from_millis(min_ms),
            max_wait: Duration::from_millis(max_ms.max(min_ms)),
        }
    }

    /// Delay before retry number `retry` (1-based), doubling up to `max_wait`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.min_wait.saturating_mul(factor).min(self.max_wait)
    }
}

/// Manifest merge policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestMergeConfig {
    /// Whether merging operations merge at all.
    pub enabled: bool,
    /// Bin size.
    pub target_size_bytes: u64,
    /// Threshold for the bin holding the newest manifest.
    pub min_count_to_merge: usize,
}

impl Default for ManifestMergeConfig {
    fn default() -> Self {
        Self {
            enabled: MANIFEST_MERGE_ENABLED_DEFAULT,
            target_size_bytes: MANIFEST_TARGET_SIZE_BYTES_DEFAULT,
            min_count_to_merge: MANIFEST_MIN_MERGE_COUNT_DEFAULT,
        }
    }
}

impl ManifestMergeConfig {
    /// Read the merge policy from table properties.
    pub fn from_properties(props: &BTreeMap<String, String>) -> Self {
        Self {
            enabled: parse_or(
                props,
                MANIFEST_MERGE_ENABLED,
                MANIFEST_MERGE_ENABLED_DEFAULT,
            ),
            target_size_bytes: parse_or(
                props,
                MANIFEST_TARGET_SIZE_BYTES,
                MANIFEST_TARGET_SIZE_BYTES_DEFAULT,
            ),
            min_count_to_merge: parse_or(
                props,
                MANIFEST_MIN_MERGE_COUNT,
                MANIFEST_MIN_MERGE_COUNT_DEFAULT,
            ),
        }
    }
}
