//! Storage module for ingested records
//!
//! Provides SQLite-based persistence for the append-only record table and the
//! read-only executor used by the query path.

mod records;

pub use records::{format_timestamp, RecordStore, SqliteRecordStore};

/// Table holding ingested records
pub const RECORDS_TABLE: &str = "ingested_records";

/// A column of the records table, as described to query generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub description: &'static str,
}

/// Columns of [`RECORDS_TABLE`], in table order
pub const RECORD_SCHEMA: &[ColumnDef] = &[
    ColumnDef { name: "record_id", sql_type: "TEXT", description: "UUID of the record, time ordered" },
    ColumnDef { name: "storage_location", sql_type: "TEXT", description: "bucket or directory the source object lives in" },
    ColumnDef { name: "object_key", sql_type: "TEXT", description: "key of the source object, e.g. 'reports/q1.txt'" },
    ColumnDef { name: "version_tag", sql_type: "TEXT", description: "object version id or ETag, may be empty" },
    ColumnDef { name: "size_bytes", sql_type: "INTEGER", description: "size of the source object in bytes, may be NULL" },
    ColumnDef { name: "content_type", sql_type: "TEXT", description: "MIME type of the source object" },
    ColumnDef { name: "event_timestamp", sql_type: "TEXT", description: "when the object was created, RFC 3339 UTC" },
    ColumnDef { name: "decoded_text", sql_type: "TEXT", description: "full decoded document text, may be NULL" },
    ColumnDef { name: "encoding_used", sql_type: "TEXT", description: "encoding the text was decoded with, e.g. 'UTF-8', 'Shift_JIS', 'lenient-utf-8'" },
    ColumnDef { name: "content_sha256", sql_type: "TEXT", description: "hex SHA-256 of the decoded text" },
    ColumnDef { name: "summary", sql_type: "TEXT", description: "generated summary, NULL for ERROR records" },
    ColumnDef { name: "budget_tier", sql_type: "TEXT", description: "summary tier: 'short', 'general' or 'detailed'" },
    ColumnDef { name: "model_used", sql_type: "TEXT", description: "model that produced the summary" },
    ColumnDef { name: "processing_status", sql_type: "TEXT", description: "'SUCCESS' or 'ERROR'" },
    ColumnDef { name: "error_detail", sql_type: "TEXT", description: "failure description for ERROR records" },
    ColumnDef { name: "processed_at", sql_type: "TEXT", description: "when the record was written, RFC 3339 UTC with microseconds" },
];

/// Column names of [`RECORDS_TABLE`], in table order
pub const RECORD_COLUMNS: &[&str] = &[
    "record_id",
    "storage_location",
    "object_key",
    "version_tag",
    "size_bytes",
    "content_type",
    "event_timestamp",
    "decoded_text",
    "encoding_used",
    "content_sha256",
    "summary",
    "budget_tier",
    "model_used",
    "processing_status",
    "error_detail",
    "processed_at",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_matches_columns() {
        let names: Vec<&str> = RECORD_SCHEMA.iter().map(|c| c.name).collect();
        assert_eq!(names, RECORD_COLUMNS);
    }
}
