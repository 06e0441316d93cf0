use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::services::encryption::{EncryptionError, EncryptionService};

const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Blob storage for preprocessed equipment photos, keyed by job.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Fails with [`StorageError::NotFound`] if nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage key for the preprocessed image of a job.
pub fn image_key(job_id: uuid::Uuid) -> String {
    format!("analysis/{job_id}.jpg")
}

/// Cloudflare R2 (S3-compatible) bucket.
pub struct R2ImageStore {
    bucket: Box<Bucket>,
}

impl R2ImageStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }
}

fn check_status(key: &str, status: u16) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        s => Err(StorageError::Backend(format!("unexpected status {s} for '{key}'"))),
    }
}

#[async_trait]
impl ImageStore for R2ImageStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, JPEG_CONTENT_TYPE)
            .await?;
        check_status(key, response.status_code())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await?;
        check_status(key, response.status_code())?;
        Ok(response.bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self.bucket.delete_object(key).await?;
        match check_status(key, response.status_code()) {
            Err(StorageError::NotFound(_)) => Ok(()),
            other => other,
        }
    }
}

/// Images on the local filesystem under a root directory.
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::Config(format!("invalid storage key '{key}'")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for tests and single-node development.
#[derive(Default)]
pub struct MemoryImageStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.blobs.write().await.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

/// Seals blobs with AES-256-GCM before handing them to the inner store.
pub struct EncryptedImageStore<S> {
    inner: S,
    encryption: EncryptionService,
}

impl<S: ImageStore> EncryptedImageStore<S> {
    pub fn new(inner: S, encryption: EncryptionService) -> Self {
        Self { inner, encryption }
    }
}

#[async_trait]
impl<S: ImageStore> ImageStore for EncryptedImageStore<S> {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let sealed = self.encryption.seal(data)?;
        self.inner.put(key, &sealed).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let sealed = self.inner.get(key).await?;
        Ok(self.encryption.open(&sealed)?)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Image '{0}' not found")]
    NotFound(String),

    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("gym-asset-images-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_local_store_put_get_delete() {
        let root = temp_root();
        let store = LocalImageStore::new(&root);
        let key = image_key(uuid::Uuid::new_v4());

        tokio_test::assert_ok!(store.put(&key, b"photo").await);
        assert_eq!(store.get(&key).await.unwrap(), b"photo");

        tokio_test::assert_ok!(store.delete(&key).await);
        assert!(matches!(store.get(&key).await, Err(StorageError::NotFound(_))));
        // deleting twice is fine
        tokio_test::assert_ok!(store.delete(&key).await);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_local_store_rejects_escaping_keys() {
        let store = LocalImageStore::new(temp_root());
        assert!(matches!(
            store.put("../outside.jpg", b"x").await,
            Err(StorageError::Config(_))
        ));
        assert!(matches!(
            store.get("/etc/passwd").await,
            Err(StorageError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_encrypted_store_seals_at_rest() {
        let key = base64::engine::general_purpose::STANDARD.encode([9u8; 32]);
        let encryption = EncryptionService::from_base64_key(&key).unwrap();
        let store = EncryptedImageStore::new(MemoryImageStore::new(), encryption);

        store.put("analysis/a.jpg", b"plain jpeg").await.unwrap();
        let raw = store.inner.get("analysis/a.jpg").await.unwrap();
        assert_ne!(raw, b"plain jpeg");
        assert_eq!(store.get("analysis/a.jpg").await.unwrap(), b"plain jpeg");
    }

    #[tokio::test]
    async fn test_memory_store_missing_key() {
        let store = MemoryImageStore::new();
        assert!(store.is_empty().await);
        assert!(matches!(store.get("nope").await, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status("k", 200).is_ok());
        assert!(matches!(check_status("k", 404), Err(StorageError::NotFound(_))));
        assert!(matches!(check_status("k", 403), Err(StorageError::Backend(_))));
    }
}
