//! Ingested record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::SourceObject;
use crate::ingestion::Decoded;
use crate::summarization::{BudgetTier, Summary};

/// Outcome of processing a source object
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Success,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Success => "SUCCESS",
            ProcessingStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Some(ProcessingStatus::Success),
            "ERROR" => Some(ProcessingStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an object was not ingested
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// Key is under the pipeline's own output prefix
    SelfOutput,
    /// Key extension is not accepted
    UnsupportedExtension { extension: Option<String> },
    /// Decoded text is below the minimum length
    TooShort { chars: usize },
    /// Object exceeds the size limit and the policy rejects it
    TooLarge { bytes: u64 },
    /// No encoding could decode the content
    Undecodable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SelfOutput => write!(f, "pipeline output"),
            SkipReason::UnsupportedExtension { extension } => write!(
                f,
                "unsupported extension '{}'",
                extension.as_deref().unwrap_or("")
            ),
            SkipReason::TooShort { chars } => write!(f, "too short ({} chars)", chars),
            SkipReason::TooLarge { bytes } => write!(f, "too large ({} bytes)", bytes),
            SkipReason::Undecodable => write!(f, "undecodable"),
        }
    }
}

/// Persisted outcome of processing one source object
///
/// Records are append-only: a retry produces a new record rather than
/// updating an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedRecord {
    /// Time-ordered record ID
    pub record_id: Uuid,
    /// The object this record was produced from
    pub source: SourceObject,
    /// Decoded text (absent when the object could not be read)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_text: Option<String>,
    /// Encoding name or "lenient-utf-8"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_used: Option<String>,
    /// SHA-256 of the decoded text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
    /// Generated summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Summary tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tier: Option<BudgetTier>,
    /// Model that produced the summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    /// SUCCESS or ERROR
    pub processing_status: ProcessingStatus,
    /// Failure description for ERROR records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// When processing finished
    pub processed_at: DateTime<Utc>,
}

impl IngestedRecord {
    /// Record for a fully processed object
    pub fn success(source: SourceObject, decoded: &Decoded, summary: Summary) -> Self {
        Self {
            record_id: Uuid::now_v7(),
            source,
            decoded_text: Some(decoded.text.clone()),
            encoding_used: Some(decoded.strategy.label().to_string()),
            content_sha256: Some(decoded.sha256()),
            summary: Some(summary.summary),
            budget_tier: Some(summary.budget_tier),
            model_used: Some(summary.model_used),
            processing_status: ProcessingStatus::Success,
            error_detail: None,
            processed_at: Utc::now(),
        }
    }

    /// Record for a failed attempt
    ///
    /// `decoded` is present when the failure happened after decoding.
    pub fn failure(
        source: SourceObject,
        error_detail: impl Into<String>,
        decoded: Option<&Decoded>,
    ) -> Self {
        Self {
            record_id: Uuid::now_v7(),
            source,
            decoded_text: decoded.map(|d| d.text.clone()),
            encoding_used: decoded.map(|d| d.strategy.label().to_string()),
            content_sha256: decoded.map(|d| d.sha256()),
            summary: None,
            budget_tier: None,
            model_used: None,
            processing_status: ProcessingStatus::Error,
            error_detail: Some(error_detail.into()),
            processed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.processing_status == ProcessingStatus::Success
    }
}

/// Record counts by status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordStats {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    /// Distinct identities with at least one record
    pub distinct_sources: usize,
}
