//! Storage primitives for table files.
//!
//! Everything a table persists (metadata versions, the `CURRENT` pointer and
//! manifest files) goes through this module. Paths handed to the functions
//! here are *relative* to a [`TableLocation`]; the layout conventions that
//! produce those relative paths live in [`crate::layout`].
//!
//! Two write flavours are provided:
//!
//! - [`write_new`] creates a file only if it does not exist yet. Metadata
//!   versions and manifests are written this way so a given path is produced
//!   exactly once.
//! - [`write_atomic`] replaces a file via write-then-rename. The `CURRENT`
//!   pointer is updated this way.
//!
//! Higher layers do not call these functions directly for manifests; they go
//! through the [`FileIO`] abstraction so tests can swap in an in-memory
//! implementation.

mod error;
mod file_io;

pub(crate) use error::{AlreadyExistsSnafu, NotFoundSnafu, OtherIoSnafu};
pub use error::{BackendError, StorageError};
pub use file_io::{FileIO, LocalFileIO, MemoryFileIO};

use snafu::{IntoError, prelude::*};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root location of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableLocation {
    /// A table stored on the local filesystem at the given path.
    Local(PathBuf),
}

impl TableLocation {
    /// Creates a new `TableLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        TableLocation::Local(root.into())
    }

    /// Render the location as a string suitable for `TableMetadata::location`.
    pub fn display(&self) -> String {
        match self {
            TableLocation::Local(root) => root.display().to_string(),
        }
    }
}

fn join_local(location: &TableLocation, rel: &Path) -> PathBuf {
    match location {
        TableLocation::Local(root) => root.join(rel),
    }
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

fn classify_io(path: String, e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound => NotFoundSnafu { path }.into_error(BackendError::Local(e)),
        io::ErrorKind::AlreadyExists => {
            AlreadyExistsSnafu { path }.into_error(BackendError::Local(e))
        }
        _ => OtherIoSnafu { path }.into_error(BackendError::Local(e)),
    }
}

/// Removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Replace the file at `rel_path` with `contents` using write-then-rename.
///
/// The payload is written to a sibling `*.tmp` file, synced, and renamed
/// into place, so readers observe either the old or the new contents.
pub async fn write_atomic(
    location: &TableLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    create_parent_dir(&abs).await?;

    let tmp_path = abs.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());
    let tmp_str = tmp_path.display().to_string();

    {
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| classify_io(tmp_str.clone(), e))?;
        file.write_all(contents)
            .await
            .map_err(|e| classify_io(tmp_str.clone(), e))?;
        file.sync_all()
            .await
            .map_err(|e| classify_io(tmp_str.clone(), e))?;
    }

    fs::rename(&tmp_path, &abs)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })?;

    guard.disarm();
    Ok(())
}

/// Create a *new* file at `rel_path` and write `contents`, failing with
/// [`StorageError::AlreadyExists`] if the file is already there.
pub async fn write_new(
    location: &TableLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    create_parent_dir(&abs).await?;
    let path_str = abs.display().to_string();

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&abs)
        .await
        .map_err(|e| classify_io(path_str.clone(), e))?;

    file.write_all(contents)
        .await
        .map_err(|e| classify_io(path_str.clone(), e))?;
    file.sync_all()
        .await
        .map_err(|e| classify_io(path_str, e))?;
    Ok(())
}

/// Read the file at `rel_path` as UTF-8 text.
pub async fn read_to_string(location: &TableLocation, rel_path: &Path) -> StorageResult<String> {
    let abs = join_local(location, rel_path);
    fs::read_to_string(&abs)
        .await
        .map_err(|e| classify_io(abs.display().to_string(), e))
}

/// Read the full contents of the file at `rel_path`.
pub async fn read_all_bytes(location: &TableLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let abs = join_local(location, rel_path);
    fs::read(&abs)
        .await
        .map_err(|e| classify_io(abs.display().to_string(), e))
}

/// Remove the file at `rel_path`. Missing files yield [`StorageError::NotFound`].
pub async fn delete(location: &TableLocation, rel_path: &Path) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    fs::remove_file(&abs)
        .await
        .map_err(|e| classify_io(abs.display().to_string(), e))
}

/// Whether a regular file exists at `rel_path`.
pub async fn exists(location: &TableLocation, rel_path: &Path) -> StorageResult<bool> {
    let abs = join_local(location, rel_path);
    match fs::metadata(&abs).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(classify_io(abs.display().to_string(), e)),
    }
}
