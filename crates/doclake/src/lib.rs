//! doclake: event-driven text ingestion with guarded natural-language queries
//!
//! Object-creation events are turned into append-only records: the object is
//! fetched, decoded with an ordered list of candidate encodings, summarized at
//! a length tier chosen from its size, and stored with at most one SUCCESS
//! record per source identity. Questions over the records are answered through
//! curated templates first and model-generated SQL second, and every statement
//! passes a static read-only guardrail before it runs.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod providers;
pub mod query;
pub mod server;
pub mod storage;
pub mod summarization;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use ingestion::{IngestOutcome, IngestionCoordinator, IngestionEvent};
pub use query::{GuardrailValidator, QueryRouter, QueryService};
pub use storage::{RecordStore, SqliteRecordStore};
pub use summarization::SummarizationEngine;
pub use types::{
    query::{QueryAnswer, QueryOrigin, QueryRequest},
    record::{IngestedRecord, ProcessingStatus, SkipReason},
    source::SourceObject,
};
