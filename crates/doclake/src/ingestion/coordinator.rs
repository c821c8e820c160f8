//! Ingestion coordinator
//!
//! Turns one object-creation event into at most one new record. Skips never
//! write anything, transient failures write an ERROR record, and a lost
//! uniqueness race is reported as a duplicate.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::{IngestionConfig, OversizePolicy};
use crate::error::{Error, Result};
use crate::providers::ObjectStore;
use crate::storage::RecordStore;
use crate::summarization::SummarizationEngine;
use crate::types::{IngestedRecord, SkipReason, SourceObject};

use super::encoding::{truncate_to_bytes, Decoded, EncodingResolver};
use super::event::IngestionEvent;

/// Content type of summary artifacts
const ARTIFACT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Result of ingesting one event
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// New SUCCESS record written
    Stored(IngestedRecord),
    /// ERROR record written
    Failed(IngestedRecord),
    /// A SUCCESS record already exists for this identity
    Duplicate,
    /// Nothing written
    Skipped(SkipReason),
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Stored(_) => "stored",
            IngestOutcome::Failed(_) => "failed",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::Skipped(_) => "skipped",
        }
    }

    /// The record written by this ingest, if any
    pub fn record(&self) -> Option<&IngestedRecord> {
        match self {
            IngestOutcome::Stored(record) | IngestOutcome::Failed(record) => Some(record),
            _ => None,
        }
    }
}

/// Runs the ingestion pipeline for object-creation events
pub struct IngestionCoordinator {
    object_store: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    summarizer: Arc<SummarizationEngine>,
    resolver: EncodingResolver,
    config: IngestionConfig,
    max_text_bytes: usize,
}

impl IngestionCoordinator {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        summarizer: Arc<SummarizationEngine>,
        resolver: EncodingResolver,
        config: IngestionConfig,
        max_text_bytes: usize,
    ) -> Self {
        Self {
            object_store,
            records,
            summarizer,
            resolver,
            config,
            max_text_bytes,
        }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Ingest one event
    ///
    /// Errors are returned only for malformed events and store failures; every
    /// other condition is an outcome.
    pub async fn ingest(&self, event: IngestionEvent) -> Result<IngestOutcome> {
        let source = event.into_source()?;
        self.ingest_source(source).await
    }

    /// Ingest events concurrently; one event's failure does not affect the rest
    pub async fn ingest_batch(&self, events: Vec<IngestionEvent>) -> Vec<Result<IngestOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_events.max(1)));

        let futures = events.into_iter().map(|event| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| Error::internal(format!("Batch semaphore closed: {}", e)))?;
                self.ingest(event).await
            }
        });

        join_all(futures).await
    }

    /// Ingest an already validated source object
    pub async fn ingest_source(&self, source: SourceObject) -> Result<IngestOutcome> {
        if source.object_key.starts_with(&self.config.output_prefix) {
            return Ok(self.skip(&source, SkipReason::SelfOutput));
        }

        let extension = source.extension();
        let accepted = extension
            .as_deref()
            .map(|ext| self.config.accepted_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if !accepted {
            return Ok(self.skip(&source, SkipReason::UnsupportedExtension { extension }));
        }

        if self.records.find_success(&source.identity())?.is_some() {
            tracing::debug!(
                storage_location = %source.storage_location,
                object_key = %source.object_key,
                outcome = "duplicate",
                "SUCCESS record already exists"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        let reject_oversize = self.config.oversize_policy == OversizePolicy::Reject;
        if let Some(size) = source.size_bytes {
            if reject_oversize && size > self.config.max_object_bytes {
                return Ok(self.skip(&source, SkipReason::TooLarge { bytes: size }));
            }
        }

        let bytes = match self
            .object_store
            .get_object(&source.storage_location, &source.object_key)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(source, e, None),
        };

        if reject_oversize && bytes.len() as u64 > self.config.max_object_bytes {
            return Ok(self.skip(&source, SkipReason::TooLarge { bytes: bytes.len() as u64 }));
        }

        let decoded = match self.resolver.decode(&bytes) {
            Ok(decoded) => decoded,
            Err(Error::DecodeExhausted { tried }) => {
                tracing::debug!(tried = %tried, "No candidate encoding matched");
                return Ok(self.skip(&source, SkipReason::Undecodable));
            }
            Err(e) => return Err(e),
        };

        let text_limit = self
            .max_text_bytes
            .min(usize::try_from(self.config.max_object_bytes).unwrap_or(usize::MAX));
        let decoded = if decoded.text.len() > text_limit {
            if reject_oversize {
                return Ok(self.skip(
                    &source,
                    SkipReason::TooLarge { bytes: decoded.text.len() as u64 },
                ));
            }
            tracing::info!(
                object_key = %source.object_key,
                bytes = decoded.text.len(),
                limit = text_limit,
                "Truncating oversized text"
            );
            Decoded {
                text: truncate_to_bytes(&decoded.text, text_limit).to_string(),
                strategy: decoded.strategy,
            }
        } else {
            decoded
        };

        let chars = decoded.text.trim().chars().count();
        if chars < self.config.min_text_chars {
            return Ok(self.skip(&source, SkipReason::TooShort { chars }));
        }

        let summary = match self.summarizer.summarize(&decoded.text).await {
            Ok(summary) => summary,
            Err(e) => return self.fail(source, e, Some(&decoded)),
        };

        let record = IngestedRecord::success(source, &decoded, summary);
        match self.records.insert(&record) {
            Ok(()) => {}
            Err(Error::ConstraintViolation(identity)) => {
                tracing::debug!(
                    identity = %identity,
                    outcome = "duplicate",
                    "Lost insert race to a concurrent delivery"
                );
                return Ok(IngestOutcome::Duplicate);
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            storage_location = %record.source.storage_location,
            object_key = %record.source.object_key,
            record_id = %record.record_id,
            encoding = record.encoding_used.as_deref().unwrap_or(""),
            tier = record.budget_tier.map(|t| t.as_str()).unwrap_or(""),
            outcome = "stored",
            "Ingested object"
        );

        if self.config.write_summary_artifacts {
            self.write_artifact(&record).await;
        }

        Ok(IngestOutcome::Stored(record))
    }

    fn skip(&self, source: &SourceObject, reason: SkipReason) -> IngestOutcome {
        tracing::info!(
            storage_location = %source.storage_location,
            object_key = %source.object_key,
            outcome = "skipped",
            reason = %reason,
            "Skipping object"
        );
        IngestOutcome::Skipped(reason)
    }

    fn fail(
        &self,
        source: SourceObject,
        error: Error,
        decoded: Option<&Decoded>,
    ) -> Result<IngestOutcome> {
        tracing::warn!(
            storage_location = %source.storage_location,
            object_key = %source.object_key,
            outcome = "failed",
            transient = error.is_transient(),
            error = %error,
            "Ingestion failed"
        );

        let record = IngestedRecord::failure(source, error.to_string(), decoded);
        self.records.insert(&record)?;
        Ok(IngestOutcome::Failed(record))
    }

    /// Write the summary next to the source, under the output prefix
    async fn write_artifact(&self, record: &IngestedRecord) {
        let Some(summary) = record.summary.as_deref() else {
            return;
        };

        let key = format!(
            "{}{}_summary_{}.txt",
            self.config.output_prefix,
            record.source.key_stem(),
            record.processed_at.format("%Y%m%d_%H%M%S")
        );

        match self
            .object_store
            .put_object(
                &record.source.storage_location,
                &key,
                summary.as_bytes(),
                ARTIFACT_CONTENT_TYPE,
            )
            .await
        {
            Ok(uri) => tracing::debug!(uri = %uri, "Wrote summary artifact"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to write summary artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SummarizationConfig;
    use crate::providers::{InferenceProvider, MemoryObjectStore, SamplingConfig};
    use crate::storage::SqliteRecordStore;
    use crate::summarization::BudgetTier;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedInference {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceProvider for FixedInference {
        async fn complete(&self, _prompt: &str, _sampling: &SamplingConfig) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| Error::inference("model unavailable"))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(self.reply.is_some())
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-model"
        }
    }

    struct Harness {
        objects: Arc<MemoryObjectStore>,
        records: Arc<SqliteRecordStore>,
        inference: Arc<FixedInference>,
        coordinator: IngestionCoordinator,
    }

    fn harness_with(reply: Option<&str>, config: IngestionConfig) -> Harness {
        let objects = Arc::new(MemoryObjectStore::new());
        let records = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let inference = Arc::new(FixedInference {
            reply: reply.map(String::from),
            calls: AtomicUsize::new(0),
        });
        let summarizer = Arc::new(SummarizationEngine::new(
            inference.clone(),
            &SummarizationConfig::default(),
        ));
        let coordinator = IngestionCoordinator::new(
            objects.clone(),
            records.clone(),
            summarizer,
            EncodingResolver::default(),
            config,
            1024 * 1024,
        );
        Harness {
            objects,
            records,
            inference,
            coordinator,
        }
    }

    fn harness() -> Harness {
        harness_with(Some("A summary."), IngestionConfig::default())
    }

    const TEXT: &str = "The quarterly planning meeting agreed to move the launch to November.";

    #[tokio::test]
    async fn test_stores_success_and_writes_artifact() {
        let h = harness();
        h.objects.insert("inbox", "notes/plan.txt", TEXT);

        let outcome = h
            .coordinator
            .ingest(IngestionEvent::new("inbox", "notes/plan.txt", Utc::now()))
            .await
            .unwrap();

        let IngestOutcome::Stored(record) = outcome else {
            panic!("expected Stored, got {:?}", outcome);
        };
        assert_eq!(record.summary.as_deref(), Some("A summary."));
        assert_eq!(record.budget_tier, Some(BudgetTier::Short));
        assert_eq!(record.encoding_used.as_deref(), Some("UTF-8"));

        let artifacts = h.objects.keys_with_prefix("inbox", "summaries/notes/plan_summary_");
        assert_eq!(artifacts.len(), 1);
        let artifact = h.objects.get("inbox", &artifacts[0]).unwrap();
        assert_eq!(artifact.data, b"A summary.");
        assert_eq!(artifact.content_type, ARTIFACT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_second_delivery_is_duplicate() {
        let h = harness();
        h.objects.insert("inbox", "plan.txt", TEXT);
        let event = IngestionEvent::new("inbox", "plan.txt", Utc::now()).with_version("v1");

        h.coordinator.ingest(event.clone()).await.unwrap();
        let outcome = h.coordinator.ingest(event).await.unwrap();

        assert!(matches!(outcome, IngestOutcome::Duplicate));
        assert_eq!(h.inference.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_own_output_is_skipped() {
        let h = harness();
        h.objects.insert("inbox", "summaries/plan_summary.txt", TEXT);

        let outcome = h
            .coordinator
            .ingest(IngestionEvent::new("inbox", "summaries/plan_summary.txt", Utc::now()))
            .await
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Skipped(SkipReason::SelfOutput)));
        assert_eq!(h.records.stats().unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_skipped() {
        let h = harness();
        let outcome = h
            .coordinator
            .ingest(IngestionEvent::new("inbox", "photo.png", Utc::now()))
            .await
            .unwrap();

        match outcome {
            IngestOutcome::Skipped(SkipReason::UnsupportedExtension { extension }) => {
                assert_eq!(extension.as_deref(), Some("png"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_text_is_skipped() {
        let h = harness();
        h.objects.insert("inbox", "tiny.txt", "   hi   ");

        let outcome = h
            .coordinator
            .ingest(IngestionEvent::new("inbox", "tiny.txt", Utc::now()))
            .await
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Skipped(SkipReason::TooShort { chars: 2 })));
        assert_eq!(h.inference.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_object_writes_error_record() {
        let h = harness();

        let outcome = h
            .coordinator
            .ingest(IngestionEvent::new("inbox", "gone.txt", Utc::now()))
            .await
            .unwrap();

        let IngestOutcome::Failed(record) = outcome else {
            panic!("expected Failed");
        };
        assert!(record.decoded_text.is_none());
        assert!(record.error_detail.unwrap().contains("gone.txt"));
        assert_eq!(h.records.stats().unwrap().error, 1);
    }

    #[tokio::test]
    async fn test_inference_failure_keeps_decoded_text() {
        let h = harness_with(None, IngestionConfig::default());
        h.objects.insert("inbox", "plan.txt", TEXT);

        let outcome = h
            .coordinator
            .ingest(IngestionEvent::new("inbox", "plan.txt", Utc::now()))
            .await
            .unwrap();

        let IngestOutcome::Failed(record) = outcome else {
            panic!("expected Failed");
        };
        assert_eq!(record.decoded_text.as_deref(), Some(TEXT));
        assert_eq!(record.encoding_used.as_deref(), Some("UTF-8"));

        // A later retry can still succeed for the same identity
        assert!(h.records.find_success(&record.source.identity()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversize_rejected_by_default() {
        let config = IngestionConfig {
            max_object_bytes: 16,
            ..IngestionConfig::default()
        };
        let h = harness_with(Some("A summary."), config);
        h.objects.insert("inbox", "big.txt", TEXT);

        let outcome = h
            .coordinator
            .ingest(IngestionEvent::new("inbox", "big.txt", Utc::now()))
            .await
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Skipped(SkipReason::TooLarge { .. })));
    }

    #[tokio::test]
    async fn test_oversize_truncated_when_configured() {
        let config = IngestionConfig {
            max_object_bytes: 60,
            oversize_policy: OversizePolicy::Truncate,
            ..IngestionConfig::default()
        };
        let h = harness_with(Some("A summary."), config);
        h.objects.insert("inbox", "big.txt", TEXT);

        let outcome = h
            .coordinator
            .ingest(IngestionEvent::new("inbox", "big.txt", Utc::now()).with_size(TEXT.len() as u64))
            .await
            .unwrap();

        let IngestOutcome::Stored(record) = outcome else {
            panic!("expected Stored");
        };
        assert_eq!(record.decoded_text.as_deref(), Some(&TEXT[..60]));
        // Size still describes the whole object that was read
        assert_eq!(record.source.size_bytes, Some(TEXT.len() as u64));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let h = harness();
        h.objects.insert("inbox", "a.txt", TEXT);

        let results = h
            .coordinator
            .ingest_batch(vec![
                IngestionEvent::new("inbox", "a.txt", Utc::now()),
                IngestionEvent::new("", "b.txt", Utc::now()),
                IngestionEvent::new("inbox", "c.md", Utc::now()),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Ok(IngestOutcome::Stored(_))));
        assert!(matches!(results[1], Err(Error::MalformedEvent(_))));
        assert!(matches!(results[2], Ok(IngestOutcome::Skipped(_))));
    }
}
