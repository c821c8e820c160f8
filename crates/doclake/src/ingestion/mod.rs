//! Ingestion pipeline: event parsing, encoding resolution and coordination

mod coordinator;
mod encoding;
mod event;

pub use coordinator::{IngestOutcome, IngestionCoordinator};
pub use encoding::{truncate_to_bytes, DecodeStrategy, Decoded, EncodingResolver, LENIENT_LABEL};
pub use event::{parse_events, IngestionEvent};
