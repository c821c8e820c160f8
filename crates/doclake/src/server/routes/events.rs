//! Object-creation event endpoint

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::{parse_events, IngestOutcome};
use crate::server::state::AppState;

/// Result for one event of a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResult {
    /// Key of the object, when the event could be parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    /// stored, failed, duplicate, skipped or error
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    /// Skip reason or failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Error that aborted this event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventResult {
    fn from_outcome(object_key: String, outcome: &IngestOutcome) -> Self {
        let reason = match outcome {
            IngestOutcome::Skipped(reason) => Some(reason.to_string()),
            IngestOutcome::Failed(record) => record.error_detail.clone(),
            _ => None,
        };

        Self {
            object_key: Some(object_key),
            outcome: outcome.as_str().to_string(),
            record_id: outcome.record().map(|r| r.record_id),
            reason,
            error: None,
        }
    }

    fn from_error(object_key: Option<String>, err: &Error) -> Self {
        Self {
            object_key,
            outcome: "error".to_string(),
            record_id: None,
            reason: None,
            error: Some(err.to_string()),
        }
    }
}

/// Response for POST /api/events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub results: Vec<EventResult>,
    pub processing_time_ms: u64,
}

/// POST /api/events - Ingest one event or an S3-style notification
pub async fn receive_events(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<EventsResponse>> {
    let start = Instant::now();
    let parsed = parse_events(&payload)?;

    tracing::info!("Received {} event(s)", parsed.len());

    // Malformed entries keep their slot so results line up with the payload
    let mut results: Vec<Option<EventResult>> = Vec::with_capacity(parsed.len());
    let mut events = Vec::new();
    let mut keys = Vec::new();
    for entry in parsed {
        match entry {
            Ok(event) => {
                keys.push((results.len(), event.object_key.clone()));
                events.push(event);
                results.push(None);
            }
            Err(err) => {
                tracing::warn!("Dropping malformed event: {}", err);
                results.push(Some(EventResult::from_error(None, &err)));
            }
        }
    }

    let outcomes = state.coordinator().ingest_batch(events).await;
    for ((slot, key), outcome) in keys.into_iter().zip(outcomes) {
        results[slot] = Some(match outcome {
            Ok(outcome) => EventResult::from_outcome(key, &outcome),
            Err(err) => {
                tracing::error!("Event for {} failed: {}", key, err);
                EventResult::from_error(Some(key), &err)
            }
        });
    }

    Ok(Json(EventsResponse {
        results: results.into_iter().flatten().collect(),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
