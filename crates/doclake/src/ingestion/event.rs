//! Object-creation notifications
//!
//! Accepts either a flat [`IngestionEvent`] or an S3-style notification with
//! a `Records` array. Each record is parsed independently so a malformed entry
//! only fails itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::SourceObject;

/// One source-object-creation notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionEvent {
    pub storage_location: String,
    pub object_key: String,
    #[serde(default)]
    pub version_or_etag: Option<String>,
    pub event_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl IngestionEvent {
    pub fn new(
        storage_location: impl Into<String>,
        object_key: impl Into<String>,
        event_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            storage_location: storage_location.into(),
            object_key: object_key.into(),
            version_or_etag: None,
            event_timestamp,
            size_bytes: None,
            content_type: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version_or_etag = Some(version.into());
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Validate and convert to a source object
    pub fn into_source(self) -> Result<SourceObject> {
        if self.storage_location.trim().is_empty() {
            return Err(Error::MalformedEvent("storage_location is empty".to_string()));
        }
        if self.object_key.is_empty() {
            return Err(Error::MalformedEvent("object_key is empty".to_string()));
        }

        let mut source = SourceObject::new(
            self.storage_location,
            self.object_key,
            self.version_or_etag.unwrap_or_default(),
            self.event_timestamp,
        );
        source.size_bytes = self.size_bytes;
        if let Some(content_type) = self.content_type {
            source.content_type = content_type;
        }
        Ok(source)
    }
}

#[derive(Deserialize)]
struct S3Record {
    #[serde(rename = "eventTime")]
    event_time: Option<DateTime<Utc>>,
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3ObjectRef,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3ObjectRef {
    key: String,
    size: Option<u64>,
    #[serde(rename = "eTag")]
    e_tag: Option<String>,
    #[serde(rename = "versionId")]
    version_id: Option<String>,
}

impl S3Record {
    fn into_event(self) -> Result<IngestionEvent> {
        let key = decode_s3_key(&self.s3.object.key)?;
        let version = self
            .s3
            .object
            .version_id
            .filter(|v| !v.is_empty())
            .or_else(|| self.s3.object.e_tag.map(|e| e.trim_matches('"').to_string()));

        Ok(IngestionEvent {
            storage_location: self.s3.bucket.name,
            object_key: key,
            version_or_etag: version,
            event_timestamp: self.event_time.unwrap_or_else(Utc::now),
            size_bytes: self.s3.object.size,
            content_type: None,
        })
    }
}

/// S3 keys arrive form-encoded: `+` is a space, the rest is percent-encoded
fn decode_s3_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .map_err(|e| Error::MalformedEvent(format!("Invalid key encoding '{}': {}", raw, e)))
}

/// Parse a notification payload into per-record results
pub fn parse_events(payload: &Value) -> Result<Vec<Result<IngestionEvent>>> {
    if let Some(records) = payload.get("Records") {
        let records = records
            .as_array()
            .ok_or_else(|| Error::MalformedEvent("Records is not an array".to_string()))?;

        return Ok(records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                serde_json::from_value::<S3Record>(record.clone())
                    .map_err(|e| Error::MalformedEvent(format!("Records[{}]: {}", i, e)))
                    .and_then(S3Record::into_event)
            })
            .collect());
    }

    if payload.is_object() {
        let event = serde_json::from_value::<IngestionEvent>(payload.clone())
            .map_err(|e| Error::MalformedEvent(e.to_string()));
        return Ok(vec![event]);
    }

    Err(Error::MalformedEvent(
        "Expected an event object or a Records array".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_s3_notification() {
        let payload = json!({
            "Records": [{
                "eventTime": "2026-10-19T08:30:00.000Z",
                "s3": {
                    "bucket": {"name": "inbox"},
                    "object": {
                        "key": "reports/q3+minutes%E3%81%82.txt",
                        "size": 120,
                        "eTag": "\"abc123\""
                    }
                }
            }]
        });

        let events = parse_events(&payload).unwrap();
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.storage_location, "inbox");
        assert_eq!(event.object_key, "reports/q3 minutesあ.txt");
        assert_eq!(event.version_or_etag.as_deref(), Some("abc123"));
        assert_eq!(event.size_bytes, Some(120));
    }

    #[test]
    fn test_version_id_preferred_over_etag() {
        let payload = json!({
            "Records": [{
                "s3": {
                    "bucket": {"name": "inbox"},
                    "object": {"key": "a.txt", "eTag": "e1", "versionId": "v7"}
                }
            }]
        });
        let events = parse_events(&payload).unwrap();
        assert_eq!(events[0].as_ref().unwrap().version_or_etag.as_deref(), Some("v7"));
    }

    #[test]
    fn test_malformed_record_is_isolated() {
        let payload = json!({
            "Records": [
                {"s3": {"bucket": {"name": "inbox"}}},
                {"s3": {"bucket": {"name": "inbox"}, "object": {"key": "ok.txt"}}}
            ]
        });
        let events = parse_events(&payload).unwrap();
        assert!(matches!(events[0], Err(Error::MalformedEvent(_))));
        assert!(events[1].is_ok());
    }

    #[test]
    fn test_parse_flat_event() {
        let payload = json!({
            "storage_location": "inbox",
            "object_key": "notes.txt",
            "version_or_etag": "v1",
            "event_timestamp": "2026-10-19T08:30:00Z"
        });
        let events = parse_events(&payload).unwrap();
        let source = events
            .into_iter()
            .next()
            .unwrap()
            .unwrap()
            .into_source()
            .unwrap();
        assert_eq!(source.identity().to_string(), "inbox/notes.txt@v1");
        assert_eq!(source.content_type, "text/plain");
    }

    #[test]
    fn test_rejects_non_object_payload() {
        assert!(parse_events(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_empty_key_is_malformed() {
        let event = IngestionEvent::new("inbox", "", Utc::now());
        assert!(matches!(event.into_source(), Err(Error::MalformedEvent(_))));
    }
}
