//! The stored-file service boundary.
//!
//! The engine never touches disks or buckets itself; it speaks to whatever
//! implements [`FileStore`]. The server crate ships a disk-backed
//! implementation.

use async_trait::async_trait;

use varsity_shared::{FileRef, Result};

/// An uploaded file as received from the transport layer.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub original_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Storage contract for uploaded file bytes.
///
/// Locators are opaque to callers; only the implementation can interpret
/// them.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist the upload and return its reference.
    async fn put(&self, upload: &FileUpload) -> Result<FileRef>;

    /// Does the locator currently resolve to stored bytes?
    async fn exists(&self, locator: &str) -> Result<bool>;

    /// Read the full contents behind a locator.
    async fn open(&self, locator: &str) -> Result<Vec<u8>>;

    /// Remove the stored bytes. Idempotent: a missing target is not an
    /// error.
    async fn delete(&self, locator: &str) -> Result<()>;
}
