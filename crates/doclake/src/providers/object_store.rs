//! Object store provider trait for reading source blobs and writing artifacts

use async_trait::async_trait;

use crate::error::Result;

/// Trait for blob storage
///
/// Implementations:
/// - `LocalObjectStore`: Local filesystem
/// - `MemoryObjectStore`: In-process map
/// - `GcsObjectStore`: Google Cloud Storage (feature `gcp`)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object's bytes
    async fn get_object(&self, location: &str, key: &str) -> Result<Vec<u8>>;

    /// Write an object
    ///
    /// Returns the storage URI
    async fn put_object(
        &self,
        location: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
