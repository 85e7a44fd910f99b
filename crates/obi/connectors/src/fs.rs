//! Filesystem-backed blob store, used by the CLI.

use crate::error::BlobError;
use crate::traits::BlobStore;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Stores artifacts as plain files under a root directory.
///
/// Locators are `file://` URLs pointing at the written file, so certificate
/// rows created through this store stay resolvable across process restarts.
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, BlobError> {
        let target = self.root.join(path);
        let size = bytes.len();
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::Upload(e.to_string()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| BlobError::Upload(e.to_string()))?;
        debug!(path = %target.display(), bytes = size, "artifact written");
        Ok(format!("file://{}", target.display()))
    }

    async fn download(&self, locator: &str) -> Result<Vec<u8>, BlobError> {
        let path = locator
            .strip_prefix("file://")
            .ok_or_else(|| BlobError::NotFound(locator.to_string()))?;
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BlobError::NotFound(locator.to_string()),
            _ => BlobError::Download(e.to_string()),
        })?;
        debug!(%locator, bytes = bytes.len(), "artifact read");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uploads_land_under_the_root_and_round_trip() {
        let dir = std::env::temp_dir().join(format!("obi-blob-{}", uuid::Uuid::new_v4()));
        let store = FileBlobStore::new(&dir);

        let locator = store
            .upload("certificates/test.pdf", b"contenido".to_vec())
            .await
            .unwrap();
        assert!(locator.starts_with("file://"));
        assert_eq!(store.download(&locator).await.unwrap(), b"contenido");

        let missing = store.download("file:///nonexistent/blob.pdf").await;
        assert!(matches!(missing, Err(BlobError::NotFound(_))));
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
