//! Core types for doclake

pub mod query;
pub mod record;
pub mod source;

pub use query::{ExecutableQuery, QueryAnswer, QueryOrigin, QueryRequest, QueryRows, SqlParam};
pub use record::{IngestedRecord, ProcessingStatus, RecordStats, SkipReason};
pub use source::{SourceIdentity, SourceObject};
