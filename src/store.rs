//! Object-store collaborator seam.
//!
//! Large inputs are uploaded out-of-band; the pipeline then downloads the
//! blob by storage path, extracts, and deletes the object best-effort
//! regardless of outcome. The trait keeps the pipeline vendor-agnostic;
//! a directory-backed implementation ships for local deployments and
//! tests.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage object not found: {0}")]
    NotFound(String),

    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Narrow seam over an object store.
pub trait BlobStore: Send + Sync {
    fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;
    fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Directory-backed blob store.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a storage path under the root, refusing traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                std::path::Component::ParentDir | std::path::Component::RootDir
            )
        });
        if escapes || relative.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let resolved = self.resolve(path)?;
        if !resolved.exists() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(std::fs::read(resolved)?)
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        let resolved = self.resolve(path)?;
        if !resolved.exists() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        std::fs::remove_file(resolved)?;
        Ok(())
    }
}
