//! Disk-backed implementation of the stored-file service.
//!
//! Uploads are written as opaque UUID-named files under a base directory; the
//! UUID string is the locator. Any locator that would resolve outside the
//! base directory is rejected.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use varsity_core::{FileStore, FileUpload};
use varsity_shared::{FileRef, PortalError, Result};

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf> {
    // Canonicalize base; target may not exist yet so normalize manually
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    // Build the full path and strip out any `..` components
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(PortalError::Validation("Path traversal detected".to_string()));
            }
            _ => {} // RootDir, CurDir, Prefix — skip
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(PortalError::Validation("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct DiskFileStore {
    base_path: PathBuf,
    max_size: usize,
}

impl DiskFileStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            PortalError::Upstream(format!(
                "Failed to create file directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "file store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Resolve a locator to its on-disk path, rejecting separators and
    /// traversal sequences.
    fn safe_path(&self, locator: &str) -> Result<PathBuf> {
        if locator.is_empty()
            || locator.contains('/')
            || locator.contains('\\')
            || locator.contains("..")
        {
            return Err(PortalError::Validation("Path traversal detected".to_string()));
        }
        let target = self.base_path.join(locator);
        ensure_within(&self.base_path, &target)
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    async fn put(&self, upload: &FileUpload) -> Result<FileRef> {
        if upload.data.is_empty() {
            return Err(PortalError::Validation("Empty file".to_string()));
        }
        if upload.data.len() > self.max_size {
            return Err(PortalError::Validation(format!(
                "File too large: {} bytes (max {})",
                upload.data.len(),
                self.max_size
            )));
        }

        let locator = Uuid::new_v4().to_string();
        let path = self.safe_path(&locator)?;

        fs::write(&path, &upload.data).await.map_err(|e| {
            PortalError::Upstream(format!("Failed to write file {}: {}", locator, e))
        })?;

        debug!(locator = %locator, size = upload.data.len(), "stored file");
        Ok(FileRef {
            locator,
            original_name: upload.original_name.clone(),
            mime_type: upload.mime_type.clone(),
            size: upload.data.len() as i64,
        })
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        let path = self.safe_path(locator)?;
        Ok(path.exists())
    }

    async fn open(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.safe_path(locator)?;

        if !path.exists() {
            return Err(PortalError::NotFound);
        }

        let data = fs::read(&path).await.map_err(|e| {
            PortalError::Upstream(format!("Failed to read file {}: {}", locator, e))
        })?;

        debug!(locator = %locator, size = data.len(), "read file");
        Ok(data)
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        let path = self.safe_path(locator)?;

        // idempotent: deleting a missing file is not an error
        if !path.exists() {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            PortalError::Upstream(format!("Failed to delete file {}: {}", locator, e))
        })?;

        debug!(locator = %locator, "deleted file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (DiskFileStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = DiskFileStore::new(dir.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        (store, dir)
    }

    fn upload(data: &[u8]) -> FileUpload {
        FileUpload {
            original_name: "notes.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_put_and_open() {
        let (store, _dir) = test_store().await;

        let file = store.put(&upload(b"document-bytes")).await.unwrap();
        assert_eq!(file.original_name, "notes.pdf");
        assert_eq!(file.size, 14);

        let retrieved = store.open(&file.locator).await.unwrap();
        assert_eq!(retrieved, b"document-bytes");
        assert!(store.exists(&file.locator).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _dir) = test_store().await;
        let file = store.put(&upload(b"delete-me")).await.unwrap();

        store.delete(&file.locator).await.unwrap();
        assert!(!store.exists(&file.locator).await.unwrap());

        // second delete is a no-op, not an error
        store.delete(&file.locator).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let (store, _dir) = test_store().await;
        let missing = Uuid::new_v4().to_string();
        assert!(matches!(
            store.open(&missing).await,
            Err(PortalError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.put(&upload(b"")).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let dir = TempDir::new().unwrap();
        let store = DiskFileStore::new(dir.path().to_path_buf(), 8).await.unwrap();
        assert!(store.put(&upload(b"way-too-large")).await.is_err());
    }

    #[tokio::test]
    async fn test_traversal_locators_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.open("../escape").await.is_err());
        assert!(store.open("a/b").await.is_err());
        assert!(store.exists("..").await.is_err());
    }
}
