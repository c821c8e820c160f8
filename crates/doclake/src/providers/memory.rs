//! In-process object store

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Error, Result};

use super::object_store::ObjectStore;

/// Stored object bytes and content type
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Object store held in a concurrent map, keyed by (location, key)
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<(String, String), StoredObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object
    pub fn insert(&self, location: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.objects.insert(
            (location.to_string(), key.to_string()),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn get(&self, location: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .get(&(location.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Keys in a location starting with `prefix`, sorted
    pub fn keys_with_prefix(&self, location: &str, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == location && entry.key().1.starts_with(prefix))
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, location: &str, key: &str) -> Result<Vec<u8>> {
        self.get(location, key)
            .map(|object| object.data)
            .ok_or_else(|| Error::object_store(format!("No such object: {}/{}", location, key)))
    }

    async fn put_object(
        &self,
        location: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String> {
        self.objects.insert(
            (location.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{}/{}", location, key))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
