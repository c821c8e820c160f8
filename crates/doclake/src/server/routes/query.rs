//! Natural-language query endpoint

use axum::{extract::State, Json};
use chrono::Utc;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{QueryAnswer, QueryRequest};

/// POST /api/query - Answer a question over the ingested records
pub async fn query_records(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>> {
    tracing::info!("Query: \"{}\"", request.question);

    let now = request.now.unwrap_or_else(Utc::now);
    let answer = state.query_service().ask(&request.question, now).await?;

    Ok(Json(answer))
}
