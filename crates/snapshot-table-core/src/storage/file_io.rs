//! Pluggable file access used for manifests and cleanup.
//!
//! [`FileIO`] is the seam between the commit machinery and the bytes on
//! storage. [`LocalFileIO`] resolves relative paths under a
//! [`TableLocation`]; [`MemoryFileIO`] keeps everything in a map and can be
//! told to fail deletes, which tests use to check that cleanup failures are
//! not fatal.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::IntoError;

use super::{
    AlreadyExistsSnafu, BackendError, NotFoundSnafu, OtherIoSnafu, StorageResult, TableLocation,
};

/// Byte-level access to table files, addressed by table-relative paths.
#[async_trait]
pub trait FileIO: Send + Sync + fmt::Debug {
    /// Read the whole file at `path`.
    async fn read_file(&self, path: &str) -> StorageResult<Bytes>;

    /// Create the file at `path`. Fails with `AlreadyExists` if present.
    async fn write_file(&self, path: &str, contents: Bytes) -> StorageResult<()>;

    /// Remove the file at `path`.
    async fn delete_file(&self, path: &str) -> StorageResult<()>;

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &str) -> StorageResult<bool>;
}

/// [`FileIO`] over the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalFileIO {
    location: TableLocation,
}

impl LocalFileIO {
    /// Resolve paths relative to `location`.
    pub fn new(location: TableLocation) -> Self {
        Self { location }
    }
}

#[async_trait]
impl FileIO for LocalFileIO {
    async fn read_file(&self, path: &str) -> StorageResult<Bytes> {
        let bytes = super::read_all_bytes(&self.location, Path::new(path)).await?;
        Ok(Bytes::from(bytes))
    }

    async fn write_file(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        super::write_new(&self.location, Path::new(path), &contents).await
    }

    async fn delete_file(&self, path: &str) -> StorageResult<()> {
        super::delete(&self.location, Path::new(path)).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        super::exists(&self.location, Path::new(path)).await
    }
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: BTreeMap<String, Bytes>,
    fail_deletes: bool,
    deleted: Vec<String>,
}

/// In-memory [`FileIO`]; clones share the same files.
#[derive(Clone, Debug, Default)]
pub struct MemoryFileIO {
    inner: Arc<Mutex<MemoryFiles>>,
}

impl MemoryFileIO {
    /// Create an empty in-memory file system.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryFiles> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent delete fail (or succeed again).
    pub fn set_fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    /// All paths currently stored.
    pub fn paths(&self) -> BTreeSet<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Paths removed through [`FileIO::delete_file`], in order.
    pub fn deleted_paths(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }
}

#[async_trait]
impl FileIO for MemoryFileIO {
    async fn read_file(&self, path: &str) -> StorageResult<Bytes> {
        match self.lock().files.get(path) {
            Some(bytes) => Ok(bytes.clone()),
            None => {
                Err(NotFoundSnafu { path }.into_error(BackendError::Memory("no such file".into())))
            }
        }
    }

    async fn write_file(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        let mut files = self.lock();
        if files.files.contains_key(path) {
            return Err(AlreadyExistsSnafu { path }
                .into_error(BackendError::Memory("file already exists".into())));
        }
        files.files.insert(path.to_string(), contents);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> StorageResult<()> {
        let mut files = self.lock();
        if files.fail_deletes {
            return Err(OtherIoSnafu { path }
                .into_error(BackendError::Memory("injected delete failure".into())));
        }
        match files.files.remove(path) {
            Some(_) => {
                files.deleted.push(path.to_string());
                Ok(())
            }
            None => {
                Err(NotFoundSnafu { path }.into_error(BackendError::Memory("no such file".into())))
            }
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.lock().files.contains_key(path))
    }
}
