//! Record listing endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{IngestedRecord, RecordStats};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Query string for GET /api/records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    /// Only records processed at or after this time
    pub since: Option<DateTime<Utc>>,
}

/// Response for GET /api/records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordList {
    pub records: Vec<IngestedRecord>,
    pub count: usize,
}

/// GET /api/records - Most recent records, newest first
pub async fn list_records(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<RecordList>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = state.records().scan_recent(limit, params.since)?;

    Ok(Json(RecordList {
        count: records.len(),
        records,
    }))
}

/// GET /api/records/stats - Record counts by status
pub async fn record_stats(State(state): State<AppState>) -> Result<Json<RecordStats>> {
    Ok(Json(state.records().stats()?))
}
