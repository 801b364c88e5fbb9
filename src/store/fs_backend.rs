//! Filesystem-backed `BlobStore`.
//!
//! Layout under the root directory:
//! - `<bucket>/<key>`: object content
//! - `<bucket>/.meta/<key>.json`: object metadata (content type)

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;
use crate::store::traits::{BlobStore, LocalHandle};

const META_DIR: &str = ".meta";

/// Metadata persisted next to each object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: String,
}

/// Blob store that keeps buckets as directories on disk.
pub struct FsBlobStore {
    root: PathBuf,
    tmp_dir: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`; downloads land in `tmp_dir`.
    pub fn new(root: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Resolve a bucket/key pair to the object path.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let rel = validate_key(key)?;
        Ok(bucket_dir.join(rel))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let rel = validate_key(key)?;
        Ok(bucket_dir.join(META_DIR).join(format!("{}.json", rel.display())))
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let rel = validate_key(bucket)?;
        if rel.components().count() != 1 {
            return Err(StorageError::InvalidKey {
                key: bucket.to_string(),
                reason: "bucket names cannot contain separators".into(),
            });
        }
        Ok(self.root.join(rel))
    }

    /// Read the stored metadata for an object.
    pub async fn metadata(&self, bucket: &str, key: &str) -> Result<ObjectMeta, StorageError> {
        let path = self.meta_path(bucket, key)?;
        let raw = fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => StorageError::io(&path, e),
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Reject keys that would escape the bucket directory.
fn validate_key(key: &str) -> Result<PathBuf, StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("empty"));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("empty or relative path segment"));
    }

    let path = PathBuf::from(key);
    for component in path.components() {
        match component {
            Component::Normal(part) if part != META_DIR => {}
            Component::Normal(_) => return Err(invalid("reserved segment")),
            _ => return Err(invalid("only plain relative segments are allowed")),
        }
    }
    Ok(path)
}

async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download_to_local(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<LocalHandle, StorageError> {
        let src = self.object_path(bucket, key)?;
        fs::create_dir_all(&self.tmp_dir)
            .await
            .map_err(|e| StorageError::io(&self.tmp_dir, e))?;
        let dest = self.tmp_dir.join(format!("email-{}", Uuid::new_v4()));

        match fs::copy(&src, &dest).await {
            Ok(bytes) => {
                debug!(bucket, key, bytes, path = %dest.display(), "Downloaded object");
                Ok(LocalHandle::new(dest))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::io(&src, e)),
        }
    }

    async fn remove_local(&self, handle: &LocalHandle) -> Result<(), StorageError> {
        fs::remove_file(handle.path())
            .await
            .map_err(|e| StorageError::io(handle.path(), e))
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        let meta_path = self.meta_path(bucket, key)?;
        ensure_parent(&path).await?;
        ensure_parent(&meta_path).await?;

        fs::write(&path, content)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        let meta = serde_json::to_vec(&ObjectMeta {
            content_type: content_type.to_string(),
        })?;
        fs::write(&meta_path, meta)
            .await
            .map_err(|e| StorageError::io(&meta_path, e))?;

        debug!(bucket, key, content_type, bytes = content.len(), "Uploaded object");
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        let meta_path = self.meta_path(bucket, key)?;
        remove_if_exists(&path).await?;
        remove_if_exists(&meta_path).await?;
        debug!(bucket, key, "Deleted object");
        Ok(())
    }
}
