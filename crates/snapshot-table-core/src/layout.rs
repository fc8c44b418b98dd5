//! On-disk layout helpers for a table root.
//!
//! All paths are relative to the table root:
//!
//! ```text
//! table_root/
//!   metadata/
//!     CURRENT                                 # latest metadata version (e.g. "3\n")
//!     v0000000000.metadata.json               # TableMetadata at version 0
//!     v0000000001.metadata.json
//!     <commit-uuid>-m0.manifest.json          # manifest written by one operation
//!   data/                                     # data files (not managed here)
//! ```

use std::path::PathBuf;

use uuid::Uuid;

/// Directory holding metadata versions, `CURRENT` and manifests.
pub const METADATA_DIR_NAME: &str = "metadata";

/// Name of the file that stores the current metadata version.
pub const CURRENT_FILE_NAME: &str = "CURRENT";

/// Number of digits used in zero-padded metadata file names.
pub const VERSION_FILENAME_DIGITS: usize = 10;

/// Suffix of manifest files.
pub const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Relative path: `metadata/`
pub fn metadata_rel_dir() -> PathBuf {
    PathBuf::from(METADATA_DIR_NAME)
}

/// Relative path: `metadata/CURRENT`
pub fn current_rel_path() -> PathBuf {
    metadata_rel_dir().join(CURRENT_FILE_NAME)
}

/// Relative path: `metadata/v<zero-padded>.metadata.json`
pub fn metadata_rel_path(version: u64) -> PathBuf {
    let file_name = format!(
        "v{:0width$}.metadata.json",
        version,
        width = VERSION_FILENAME_DIGITS
    );
    metadata_rel_dir().join(file_name)
}

/// Relative path of the `index`-th manifest written under `commit_id`.
///
/// Manifest paths are plain strings because they are recorded verbatim in
/// snapshots and handed to [`crate::storage::FileIO`].
pub fn manifest_rel_path(commit_id: &Uuid, index: usize) -> String {
    format!("{METADATA_DIR_NAME}/{commit_id}-m{index}{MANIFEST_SUFFIX}")
}
