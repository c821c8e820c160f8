//! Local filesystem object store
//!
//! Each storage location is a directory under the configured root and keys
//! are relative paths inside it.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

use super::object_store::ObjectStore;

/// Filesystem-backed object store
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a location/key pair, refusing anything that escapes the root
    fn object_path(&self, location: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in [location, key] {
            let relative = Path::new(part);
            if part.is_empty()
                || relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(Error::object_store(format!(
                    "Invalid object path: {}/{}",
                    location, key
                )));
            }
            path.push(relative);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, location: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(location, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::object_store(format!("Failed to read {}: {}", path.display(), e)))
    }

    async fn put_object(
        &self,
        location: &str,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<String> {
        let path = self.object_path(location, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::object_store(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(format!("file://{}", path.display()))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tokio::fs::metadata(&self.root).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        tokio_test::block_on(async {
            let uri = store
                .put_object("inbox", "nested/a.txt", b"hello", "text/plain")
                .await
                .unwrap();
            assert!(uri.starts_with("file://"));
            assert_eq!(store.get_object("inbox", "nested/a.txt").await.unwrap(), b"hello");
            assert!(store.health_check().await.unwrap());
        });
    }

    #[test]
    fn test_rejects_traversal() {
        let store = LocalObjectStore::new("/tmp/doclake-test");
        assert!(store.object_path("inbox", "../etc/passwd").is_err());
        assert!(store.object_path("..", "a.txt").is_err());
        assert!(store.object_path("inbox", "/abs.txt").is_err());
        assert!(store.object_path("inbox", "ok/a.txt").is_ok());
    }

    #[test]
    fn test_missing_object_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = tokio_test::block_on(store.get_object("inbox", "nope.txt")).unwrap_err();
        assert!(matches!(err, Error::ObjectStore(_)));
    }
}
