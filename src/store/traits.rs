//! `BlobStore` trait: the object storage the pipeline reads from and
//! publishes to.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StorageError;

/// A downloaded object held in a local temporary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHandle {
    path: PathBuf,
}

impl LocalHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Bucket/key object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Copy an object into a local temporary file.
    async fn download_to_local(&self, bucket: &str, key: &str)
    -> Result<LocalHandle, StorageError>;

    /// Remove a temporary file created by `download_to_local`.
    async fn remove_local(&self, handle: &LocalHandle) -> Result<(), StorageError>;

    /// Store `content` under `key`, replacing any existing object.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<(), StorageError>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}
