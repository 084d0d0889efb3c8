use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::BlobStore;

/// Key for an uploaded submission photo, unique per submission:
/// millisecond timestamp plus a random suffix.
pub fn image_key() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("violations/{}_{}.jpg", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Blob store backed by a local directory. Returns a file URL as the
/// retrieval reference.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("creating {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::storage(format!("writing {}: {e}", path.display())))?;
        debug!(key, size = bytes.len(), "stored image blob");
        Ok(format!("file://{}", path.display()))
    }
}

/// In-memory blob store for tests and offline runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(format!("memory://{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_keys_do_not_collide() {
        let a = image_key();
        let b = image_key();
        assert_ne!(a, b);
        assert!(a.starts_with("violations/"));
        assert!(a.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn fs_store_writes_bytes_and_returns_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let url = store.put("violations/test.jpg", b"jpegbytes").await.unwrap();
        assert!(url.starts_with("file://"));

        let written = std::fs::read(dir.path().join("violations/test.jpg")).unwrap();
        assert_eq!(written, b"jpegbytes");
    }

    #[tokio::test]
    async fn memory_store_keeps_blobs_by_key() {
        let store = MemoryBlobStore::new();
        let url = store.put("violations/x.jpg", b"abc").await.unwrap();
        assert_eq!(url, "memory://violations/x.jpg");
        assert_eq!(store.len(), 1);
    }
}
