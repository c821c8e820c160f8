//! SQLite record store
//!
//! Records are append-only. At most one SUCCESS record may exist per source
//! identity; the partial unique index enforces it, so concurrent writers
//! racing on the same identity see exactly one winner.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::query::guardrail::ApprovedQuery;
use crate::summarization::BudgetTier;
use crate::types::{
    IngestedRecord, ProcessingStatus, QueryRows, RecordStats, SourceIdentity, SourceObject,
    SqlParam,
};

/// Persistence for ingested records plus read-only query execution
pub trait RecordStore: Send + Sync {
    /// Append a record
    ///
    /// Fails with `Error::ConstraintViolation` when a SUCCESS record already
    /// exists for the same identity.
    fn insert(&self, record: &IngestedRecord) -> Result<()>;

    /// The SUCCESS record for an identity, if any
    fn find_success(&self, identity: &SourceIdentity) -> Result<Option<IngestedRecord>>;

    /// Every attempt for an identity, oldest first
    fn history(&self, identity: &SourceIdentity) -> Result<Vec<IngestedRecord>>;

    /// Most recent records, newest first
    fn scan_recent(&self, limit: usize, since: Option<DateTime<Utc>>)
        -> Result<Vec<IngestedRecord>>;

    fn stats(&self) -> Result<RecordStats>;

    /// Run an approved read-only query, returning at most `max_rows` rows
    fn execute_read(&self, query: &ApprovedQuery, max_rows: usize) -> Result<QueryRows>;

    /// Delete records processed before `cutoff`
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

const SELECT_RECORD: &str = "SELECT record_id, storage_location, object_key, version_tag, \
     size_bytes, content_type, event_timestamp, decoded_text, encoding_used, content_sha256, \
     summary, budget_tier, model_used, processing_status, error_detail, processed_at \
     FROM ingested_records";

/// Wall-clock limit for a single read query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Virtual machine steps between deadline checks
const PROGRESS_INTERVAL: i32 = 1_000;

/// Fixed-width RFC 3339 UTC timestamp, so text order is time order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite-backed record store
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    max_text_bytes: usize,
    query_timeout: Duration,
}

impl SqliteRecordStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P, max_text_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::storage(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_text_bytes,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_text_bytes: 1024 * 1024,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        };

        store.migrate()?;
        Ok(store)
    }

    /// Override the text field limit
    pub fn with_max_text_bytes(mut self, max_text_bytes: usize) -> Self {
        self.max_text_bytes = max_text_bytes;
        self
    }

    /// Override how long `execute_read` may hold the connection
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ingested_records (
                record_id TEXT PRIMARY KEY,
                storage_location TEXT NOT NULL,
                object_key TEXT NOT NULL,
                version_tag TEXT NOT NULL DEFAULT '',
                size_bytes INTEGER,
                content_type TEXT NOT NULL,
                event_timestamp TEXT NOT NULL,
                decoded_text TEXT,
                encoding_used TEXT,
                content_sha256 TEXT,
                summary TEXT,
                budget_tier TEXT,
                model_used TEXT,
                processing_status TEXT NOT NULL CHECK (processing_status IN ('SUCCESS', 'ERROR')),
                error_detail TEXT,
                processed_at TEXT NOT NULL
            );

            -- One SUCCESS per identity; ERROR rows accumulate as retry history
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ingested_records_success
                ON ingested_records(storage_location, object_key, version_tag)
                WHERE processing_status = 'SUCCESS';

            CREATE INDEX IF NOT EXISTS idx_ingested_records_identity
                ON ingested_records(storage_location, object_key, version_tag);
            CREATE INDEX IF NOT EXISTS idx_ingested_records_processed_at
                ON ingested_records(processed_at);
            CREATE INDEX IF NOT EXISTS idx_ingested_records_status
                ON ingested_records(processing_status);
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    fn check_field(&self, field: &'static str, value: Option<&str>) -> Result<()> {
        match value {
            Some(text) if text.len() > self.max_text_bytes => Err(Error::FieldTooLarge {
                field,
                size: text.len(),
                limit: self.max_text_bytes,
            }),
            _ => Ok(()),
        }
    }
}

impl RecordStore for SqliteRecordStore {
    fn insert(&self, record: &IngestedRecord) -> Result<()> {
        self.check_field("decoded_text", record.decoded_text.as_deref())?;
        self.check_field("summary", record.summary.as_deref())?;
        self.check_field("error_detail", record.error_detail.as_deref())?;

        let conn = self.conn.lock();
        let source = &record.source;

        conn.execute(
            r#"
            INSERT INTO ingested_records (
                record_id, storage_location, object_key, version_tag, size_bytes,
                content_type, event_timestamp, decoded_text, encoding_used, content_sha256,
                summary, budget_tier, model_used, processing_status, error_detail, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                record.record_id.to_string(),
                source.storage_location,
                source.object_key,
                source.version_tag,
                source.size_bytes.map(|s| s as i64),
                source.content_type,
                format_timestamp(&source.event_timestamp),
                record.decoded_text,
                record.encoding_used,
                record.content_sha256,
                record.summary,
                record.budget_tier.map(|t| t.as_str()),
                record.model_used,
                record.processing_status.as_str(),
                record.error_detail,
                format_timestamp(&record.processed_at),
            ],
        )
        .map_err(|e| match &e {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Error::ConstraintViolation(source.identity().to_string())
            }
            _ => Error::storage(format!("Failed to insert record: {}", e)),
        })?;

        Ok(())
    }

    fn find_success(&self, identity: &SourceIdentity) -> Result<Option<IngestedRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE storage_location = ?1 AND object_key = ?2 AND version_tag = ?3 \
                 AND processing_status = 'SUCCESS'",
                SELECT_RECORD
            ))
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let record = stmt
            .query_row(
                params![identity.storage_location, identity.object_key, identity.version_tag],
                row_to_record,
            )
            .optional()
            .map_err(|e| Error::storage(format!("Failed to get record: {}", e)))?;

        Ok(record)
    }

    fn history(&self, identity: &SourceIdentity) -> Result<Vec<IngestedRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE storage_location = ?1 AND object_key = ?2 AND version_tag = ?3 \
                 ORDER BY processed_at ASC, record_id ASC",
                SELECT_RECORD
            ))
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(
                params![identity.storage_location, identity.object_key, identity.version_tag],
                row_to_record,
            )
            .map_err(|e| Error::storage(format!("Failed to list history: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn scan_recent(
        &self,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<IngestedRecord>> {
        let conn = self.conn.lock();

        // An absent lower bound compares below every stored timestamp
        let since = since.map(|ts| format_timestamp(&ts)).unwrap_or_default();

        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE processed_at >= ?1 ORDER BY processed_at DESC, record_id DESC LIMIT ?2",
                SELECT_RECORD
            ))
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![since, limit as i64], row_to_record)
            .map_err(|e| Error::storage(format!("Failed to scan records: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn stats(&self) -> Result<RecordStats> {
        let conn = self.conn.lock();

        let (total, success, error): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), \
                 COALESCE(SUM(processing_status = 'SUCCESS'), 0), \
                 COALESCE(SUM(processing_status = 'ERROR'), 0) \
                 FROM ingested_records",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| Error::storage(format!("Failed to count records: {}", e)))?;

        let distinct_sources: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM (SELECT DISTINCT storage_location, object_key, version_tag \
                 FROM ingested_records)",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::storage(format!("Failed to count sources: {}", e)))?;

        Ok(RecordStats {
            total: total as usize,
            success: success as usize,
            error: error as usize,
            distinct_sources: distinct_sources as usize,
        })
    }

    fn execute_read(&self, query: &ApprovedQuery, max_rows: usize) -> Result<QueryRows> {
        let conn = self.conn.lock();

        // Shared connection: interrupt anything still running past the deadline
        let deadline = Instant::now() + self.query_timeout;
        conn.progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));
        let result = read_rows(&conn, query, max_rows);
        conn.progress_handler(0, None::<fn() -> bool>);

        result.map_err(|e| match e {
            ReadError::Refused(reason) => Error::Refused { reason },
            ReadError::Sqlite(e) if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) => {
                tracing::warn!(
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Read query interrupted"
                );
                Error::Refused {
                    reason: format!(
                        "query did not finish within {} ms",
                        self.query_timeout.as_millis()
                    ),
                }
            }
            ReadError::Sqlite(e) => Error::storage(format!("Failed to execute query: {}", e)),
        })
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();

        let count = conn
            .execute(
                "DELETE FROM ingested_records WHERE processed_at < ?1",
                params![format_timestamp(&cutoff)],
            )
            .map_err(|e| Error::storage(format!("Failed to purge records: {}", e)))?;

        tracing::info!(deleted = count, cutoff = %cutoff, "Purged old records");
        Ok(count)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

enum ReadError {
    Refused(String),
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for ReadError {
    fn from(err: rusqlite::Error) -> Self {
        ReadError::Sqlite(err)
    }
}

fn read_rows(
    conn: &Connection,
    query: &ApprovedQuery,
    max_rows: usize,
) -> std::result::Result<QueryRows, ReadError> {
    let mut stmt = conn.prepare(query.statement())?;

    // Second line of defence behind the guardrail
    if !stmt.readonly() {
        return Err(ReadError::Refused("statement is not read-only".to_string()));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let projection: Vec<usize> = match query.allowed_output_columns() {
        allowed if allowed.is_empty() => (0..columns.len()).collect(),
        allowed => columns
            .iter()
            .enumerate()
            .filter(|(_, name)| allowed.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(i, _)| i)
            .collect(),
    };

    let values: Vec<SqlValue> = query.parameters().iter().map(to_sql_value).collect();
    let mut rows = stmt.query(params_from_iter(values))?;

    let mut out = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if out.len() == max_rows {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(projection.len());
        for &i in &projection {
            values.push(value_to_json(row.get_ref(i)?));
        }
        out.push(values);
    }

    Ok(QueryRows {
        columns: projection.iter().map(|&i| columns[i].clone()).collect(),
        rows: out,
        truncated,
    })
}

fn to_sql_value(param: &SqlParam) -> SqlValue {
    match param {
        SqlParam::Text(s) => SqlValue::Text(s.clone()),
        SqlParam::Integer(i) => SqlValue::Integer(*i),
        SqlParam::Timestamp(ts) => SqlValue::Text(format_timestamp(ts)),
    }
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<IngestedRecord> {
    let record_id_str: String = row.get(0)?;
    let size_bytes: Option<i64> = row.get(4)?;
    let event_timestamp_str: String = row.get(6)?;
    let budget_tier_str: Option<String> = row.get(11)?;
    let status_str: String = row.get(13)?;
    let processed_at_str: String = row.get(15)?;

    let processing_status = ProcessingStatus::parse(&status_str)
        .ok_or_else(|| conversion_error(13, format!("unknown status '{}'", status_str)))?;

    Ok(IngestedRecord {
        record_id: Uuid::parse_str(&record_id_str).map_err(|e| conversion_error(0, e))?,
        source: SourceObject {
            storage_location: row.get(1)?,
            object_key: row.get(2)?,
            version_tag: row.get(3)?,
            size_bytes: size_bytes.map(|s| s as u64),
            content_type: row.get(5)?,
            event_timestamp: parse_timestamp(6, &event_timestamp_str)?,
        },
        decoded_text: row.get(7)?,
        encoding_used: row.get(8)?,
        content_sha256: row.get(9)?,
        summary: row.get(10)?,
        budget_tier: budget_tier_str.as_deref().and_then(BudgetTier::parse),
        model_used: row.get(12)?,
        processing_status,
        error_detail: row.get(14)?,
        processed_at: parse_timestamp(15, &processed_at_str)?,
    })
}
