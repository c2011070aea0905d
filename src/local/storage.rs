//! Local filesystem storage for image blobs.
//!
//! Blobs are stored per partition and image for easy cleanup:
//! ```text
//! .tkb/blobs/{partition}/{image_id}/{content_hash}
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Content-addressed blob storage organized by partition.
pub struct LocalStorage {
    blobs_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new storage instance at the given directory.
    pub async fn new(blobs_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&blobs_dir)
            .await
            .context("Failed to create blobs directory")?;

        Ok(Self { blobs_dir })
    }

    /// SHA-256 of a blob, hex encoded.
    pub fn content_hash(content: &[u8]) -> String {
        hex::encode(Sha256::digest(content))
    }

    /// Store an image blob, returns the storage key.
    pub async fn put(&self, partition: &str, image_id: &str, content: &[u8]) -> Result<String> {
        let hash = Self::content_hash(content);
        let key = format!("{}/{}/{}", partition, image_id, hash);
        let path = self.blobs_dir.join(&key);

        if !path.exists() {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content)
                .await
                .context("Failed to write blob")?;
        }

        Ok(key)
    }

    /// Get a blob by storage key.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.blobs_dir.join(key);
        tokio::fs::read(&path).await.context("Blob not found")
    }

    #[cfg(test)]
    pub async fn exists(&self, key: &str) -> bool {
        self.blobs_dir.join(key).exists()
    }

    /// Delete a blob and its image directory.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.blobs_dir.join(key);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        if let Some(parent) = path.parent() {
            // Only succeeds when empty.
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }
}
