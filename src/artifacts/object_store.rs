//! Pluggable object storage for SBOM/document/media bytes.
//!
//! Same shape as [`crate::events::Broadcaster`] — a narrow trait so the
//! filesystem-backed implementation used in development and tests can be
//! swapped for a real bucket-backed one without touching callers.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Derives the content-addressed filename for a blob: its SHA-256 digest,
/// hex-encoded. Two uploads of byte-identical content always land on the
/// same key.
pub fn content_addressed_key(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<String, ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// Development/test-grade implementation: one file per content-addressed
/// key under a root directory, mirroring the `sboms`/`documents`/`media`
/// buckets named in §6.
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, bytes: &[u8]) -> Result<String, ObjectStoreError> {
        let key = content_addressed_key(bytes);
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(&key), bytes).await?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        Ok(tokio::fs::read(self.path_for(key)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_addressing_is_deterministic() {
        let a = content_addressed_key(b"hello");
        let b = content_addressed_key(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, content_addressed_key(b"goodbye"));
    }
}
