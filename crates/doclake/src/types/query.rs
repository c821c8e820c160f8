//! Query request and result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a query statement came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryOrigin {
    /// Curated template, trusted by construction
    Template { template_id: String },
    /// Statement produced by the inference service
    Generated,
}

impl QueryOrigin {
    pub fn is_template(&self) -> bool {
        matches!(self, QueryOrigin::Template { .. })
    }
}

impl fmt::Display for QueryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOrigin::Template { template_id } => write!(f, "TEMPLATE({})", template_id),
            QueryOrigin::Generated => write!(f, "GENERATED"),
        }
    }
}

/// A value bound to a positional placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

/// A routed query, not yet approved for execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableQuery {
    /// TEMPLATE or GENERATED
    pub origin: QueryOrigin,
    /// The request this query answers
    pub natural_language_input: String,
    /// SQL with `?N` placeholders
    pub statement: String,
    /// Values for `?1..?N`, in order
    pub parameters: Vec<SqlParam>,
    /// Output projection (empty = all columns the statement returns)
    pub allowed_output_columns: Vec<String>,
    /// The "now" relative time was resolved against
    pub routed_at: DateTime<Utc>,
}

/// Rows returned by the executor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// More rows were available than the row cap
    pub truncated: bool,
}

/// Answer to a natural-language request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub origin: QueryOrigin,
    pub statement: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub truncated: bool,
    pub processing_time_ms: u64,
}

impl QueryAnswer {
    pub fn new(query: &ExecutableQuery, rows: QueryRows, processing_time_ms: u64) -> Self {
        Self {
            origin: query.origin.clone(),
            statement: query.statement.clone(),
            row_count: rows.rows.len(),
            columns: rows.columns,
            rows: rows.rows,
            truncated: rows.truncated,
            processing_time_ms,
        }
    }
}

/// Natural-language query request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer
    pub question: String,
    /// Reference time for relative expressions (defaults to now)
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            now: None,
        }
    }
}
