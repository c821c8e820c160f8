//! Source object identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One externally deposited input unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceObject {
    /// Bucket or directory the object lives in
    pub storage_location: String,
    /// Object key within the location
    pub object_key: String,
    /// Version id, else ETag, else empty
    #[serde(default)]
    pub version_tag: String,
    /// Size reported by the event, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// MIME type (reported or guessed from the key)
    pub content_type: String,
    /// When the object was created upstream
    pub event_timestamp: DateTime<Utc>,
}

impl SourceObject {
    /// Create a source object, guessing the content type from the key
    pub fn new(
        storage_location: impl Into<String>,
        object_key: impl Into<String>,
        version_tag: impl Into<String>,
        event_timestamp: DateTime<Utc>,
    ) -> Self {
        let object_key = object_key.into();
        let content_type = mime_guess::from_path(&object_key)
            .first_or_octet_stream()
            .to_string();
        Self {
            storage_location: storage_location.into(),
            object_key,
            version_tag: version_tag.into(),
            size_bytes: None,
            content_type,
            event_timestamp,
        }
    }

    /// Set the reported size
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Identity used for idempotency
    pub fn identity(&self) -> SourceIdentity {
        SourceIdentity {
            storage_location: self.storage_location.clone(),
            object_key: self.object_key.clone(),
            version_tag: self.version_tag.clone(),
        }
    }

    /// Lowercased key extension, if the final path segment has one
    pub fn extension(&self) -> Option<String> {
        let file_name = self.object_key.rsplit('/').next().unwrap_or("");
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }

    /// Key without its extension
    pub fn key_stem(&self) -> &str {
        match self.object_key.rsplit_once('.') {
            Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() => stem,
            _ => &self.object_key,
        }
    }
}

/// (storage_location, object_key, version_tag)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub storage_location: String,
    pub object_key: String,
    pub version_tag: String,
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.storage_location, self.object_key)?;
        if !self.version_tag.is_empty() {
            write!(f, "@{}", self.version_tag)?;
        }
        Ok(())
    }
}
