//! Configuration for doclake

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::query::template::TemplateDef;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Structured store configuration
    pub storage: StorageConfig,
    /// Object store configuration
    pub object_store: ObjectStoreConfig,
    /// Ingestion policy
    pub ingestion: IngestionConfig,
    /// Encoding resolution
    pub encoding: EncodingConfig,
    /// Summary tiering
    pub summarization: SummarizationConfig,
    /// Query routing and execution
    pub query: QueryConfig,
    /// Static query checks
    pub guardrail: GuardrailConfig,
    /// Curated templates (built-in set when absent)
    pub templates: Option<Vec<TemplateDef>>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.encoding.candidates.is_empty() && !self.encoding.lenient_fallback {
            return Err(Error::Config(
                "encoding.candidates is empty and lenient_fallback is disabled".to_string(),
            ));
        }
        for label in &self.encoding.candidates {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                return Err(Error::Config(format!("Unknown encoding label: {}", label)));
            }
        }
        if self.summarization.short_max_chars >= self.summarization.general_max_chars {
            return Err(Error::Config(
                "summarization.short_max_chars must be below general_max_chars".to_string(),
            ));
        }
        self.query.tz()?;
        if self.query.timeout_ms == 0 {
            return Err(Error::Config("query.timeout_ms must be positive".to_string()));
        }
        if self.ingestion.output_prefix.is_empty() {
            return Err(Error::Config("ingestion.output_prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub generate_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generate_model: "llama3.2:3b".to_string(),
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Structured store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Largest text field the store accepts, in bytes
    pub max_text_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data").join("doclake.db"),
            max_text_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Object store backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreBackend {
    /// Local filesystem, one directory per storage location
    #[default]
    Local,
    /// Google Cloud Storage
    Gcs,
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Backend to read and write objects with
    pub backend: ObjectStoreBackend,
    /// Root directory for the local backend
    pub local_root: PathBuf,
    /// Bucket listed by the GCS health check
    pub gcs_probe_bucket: Option<String>,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            backend: ObjectStoreBackend::Local,
            local_root: PathBuf::from("data").join("objects"),
            gcs_probe_bucket: None,
        }
    }
}

/// What to do with content larger than the store accepts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Skip the object
    #[default]
    Reject,
    /// Keep the leading part that fits
    Truncate,
}

/// Ingestion policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Key prefix reserved for pipeline output; never ingested
    pub output_prefix: String,
    /// Accepted key extensions (lowercase, without dot)
    pub accepted_extensions: Vec<String>,
    /// Minimum trimmed text length in characters
    pub min_text_chars: usize,
    /// Object size limit in bytes
    ///
    /// Under `reject`, larger objects are skipped, before the fetch when the
    /// event carries a size. Under `truncate`, the object is still read in
    /// full and only the stored text is cut to this many bytes.
    pub max_object_bytes: u64,
    /// Handling of oversized objects
    pub oversize_policy: OversizePolicy,
    /// Write the summary back under `output_prefix`
    pub write_summary_artifacts: bool,
    /// Events of one batch processed at once
    pub max_concurrent_events: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            output_prefix: "summaries/".to_string(),
            accepted_extensions: vec!["txt".to_string()],
            min_text_chars: 50,
            max_object_bytes: 1024 * 1024, // 1MB
            oversize_policy: OversizePolicy::Reject,
            write_summary_artifacts: true,
            max_concurrent_events: 4,
        }
    }
}

/// Encoding resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Candidate labels, tried in order
    pub candidates: Vec<String>,
    /// Replace undecodable sequences instead of failing
    pub lenient_fallback: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            // EUC-JP before Shift_JIS: EUC-JP pairs nearly always decode as Shift_JIS too.
            // Half-width katakana Shift_JIS still reads as EUC-JP with this order.
            candidates: vec![
                "UTF-8".to_string(),
                "EUC-JP".to_string(),
                "Shift_JIS".to_string(),
            ],
            lenient_fallback: true,
        }
    }
}

/// Summary tiering and length limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    /// Inputs shorter than this (chars) get the short tier
    pub short_max_chars: usize,
    /// Inputs shorter than this (chars) get the general tier
    pub general_max_chars: usize,
    /// Target summary length for the short tier
    pub short_budget: usize,
    /// Target summary length for the general tier
    pub general_budget: usize,
    /// Target summary length for the detailed tier
    pub detailed_budget: usize,
    /// Input is truncated to this many chars before prompting
    pub max_input_chars: usize,
    /// Completion token cap
    pub max_tokens: u32,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            short_max_chars: 1_000,
            general_max_chars: 5_000,
            short_budget: 100,
            general_budget: 200,
            detailed_budget: 400,
            max_input_chars: 12_000,
            max_tokens: 500,
        }
    }
}

/// First day of the week for relative time ranges
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

impl WeekStart {
    pub fn weekday(self) -> chrono::Weekday {
        match self {
            WeekStart::Monday => chrono::Weekday::Mon,
            WeekStart::Sunday => chrono::Weekday::Sun,
        }
    }
}

/// Query routing and execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// IANA timezone for relative time expressions
    pub timezone: String,
    /// Week boundary for "this week" / "last week"
    pub week_start: WeekStart,
    /// Row cap for a single answer
    pub max_rows: usize,
    /// Wall-clock limit for executing one statement, in milliseconds
    pub timeout_ms: u64,
    /// Token cap for SQL generation
    pub generation_max_tokens: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            week_start: WeekStart::Monday,
            max_rows: 500,
            timeout_ms: 5_000,
            generation_max_tokens: 400,
        }
    }
}

impl QueryConfig {
    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| Error::Config(format!("Invalid timezone '{}': {}", self.timezone, e)))
    }
}

/// Static query checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Tables a query may read
    pub allowed_tables: Vec<String>,
    /// Columns a query may reference
    pub allowed_columns: Vec<String>,
    /// Permit `SELECT *`
    pub allow_wildcard: bool,
    /// Longest statement accepted
    pub max_statement_chars: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            allowed_tables: vec![crate::storage::RECORDS_TABLE.to_string()],
            allowed_columns: crate::storage::RECORD_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            allow_wildcard: false,
            max_statement_chars: 4_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [ingestion]
            min_text_chars = 10

            [query]
            timezone = "Asia/Tokyo"
            week_start = "sunday"
            "#,
        )
        .unwrap();

        assert_eq!(config.ingestion.min_text_chars, 10);
        assert_eq!(config.ingestion.output_prefix, "summaries/");
        assert_eq!(config.query.week_start, WeekStart::Sunday);
        assert_eq!(config.query.tz().unwrap(), chrono_tz::Asia::Tokyo);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        let mut config = AppConfig::default();
        config.encoding.candidates.push("klingon-8".to_string());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_bad_timezone() {
        let mut config = AppConfig::default();
        config.query.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_query_timeout() {
        let mut config = AppConfig::default();
        config.query.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
