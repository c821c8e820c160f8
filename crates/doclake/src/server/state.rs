//! Application state for the doclake server

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, ObjectStoreBackend};
use crate::error::{Error, Result};
use crate::ingestion::{EncodingResolver, IngestionCoordinator};
#[cfg(feature = "gcp")]
use crate::providers::gcs::GcsObjectStore;
use crate::providers::{InferenceProvider, LocalObjectStore, ObjectStore, OllamaClient};
use crate::query::QueryService;
use crate::storage::{RecordStore, SqliteRecordStore};
use crate::summarization::SummarizationEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AppConfig,
    /// Blob storage (local filesystem or GCS)
    object_store: Arc<dyn ObjectStore>,
    /// Completion provider shared by summarization and SQL generation
    inference: Arc<dyn InferenceProvider>,
    /// Structured record store
    records: Arc<dyn RecordStore>,
    /// Ingestion pipeline
    coordinator: IngestionCoordinator,
    /// Natural-language query answering
    query_service: QueryService,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create application state from configuration
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            "Initializing doclake state (object store: {:?})...",
            config.object_store.backend
        );

        let object_store: Arc<dyn ObjectStore> = match config.object_store.backend {
            ObjectStoreBackend::Local => {
                tracing::info!(
                    "Using local object store at {}",
                    config.object_store.local_root.display()
                );
                Arc::new(LocalObjectStore::new(config.object_store.local_root.clone()))
            }
            ObjectStoreBackend::Gcs => {
                #[cfg(feature = "gcp")]
                {
                    tracing::info!("Using Google Cloud Storage object store");
                    Arc::new(GcsObjectStore::new(config.object_store.gcs_probe_bucket.clone()).await?)
                }
                #[cfg(not(feature = "gcp"))]
                {
                    return Err(Error::Config(
                        "GCS backend selected but gcp feature is not enabled. \
                         Rebuild with --features gcp"
                            .to_string(),
                    ));
                }
            }
        };

        let inference: Arc<dyn InferenceProvider> = Arc::new(OllamaClient::new(&config.llm)?);
        tracing::info!(
            "Inference provider initialized ({} at {})",
            config.llm.generate_model,
            config.llm.base_url
        );

        let records: Arc<dyn RecordStore> = Arc::new(
            SqliteRecordStore::new(&config.storage.database_path, config.storage.max_text_bytes)?
                .with_query_timeout(Duration::from_millis(config.query.timeout_ms)),
        );
        tracing::info!(
            "Record store opened at {}",
            config.storage.database_path.display()
        );

        Self::from_parts(config, object_store, inference, records)
    }

    /// Create application state around injected providers
    pub fn from_parts(
        config: AppConfig,
        object_store: Arc<dyn ObjectStore>,
        inference: Arc<dyn InferenceProvider>,
        records: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        let summarizer = Arc::new(SummarizationEngine::new(
            Arc::clone(&inference),
            &config.summarization,
        ));

        let coordinator = IngestionCoordinator::new(
            Arc::clone(&object_store),
            Arc::clone(&records),
            summarizer,
            EncodingResolver::from_config(&config.encoding)?,
            config.ingestion.clone(),
            config.storage.max_text_bytes,
        );

        let query_service =
            QueryService::from_config(&config, Arc::clone(&inference), Arc::clone(&records))?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                object_store,
                inference,
                records,
                coordinator,
                query_service,
                ready: RwLock::new(true),
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.object_store
    }

    pub fn inference(&self) -> &Arc<dyn InferenceProvider> {
        &self.inner.inference
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.inner.records
    }

    pub fn coordinator(&self) -> &IngestionCoordinator {
        &self.inner.coordinator
    }

    pub fn query_service(&self) -> &QueryService {
        &self.inner.query_service
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
