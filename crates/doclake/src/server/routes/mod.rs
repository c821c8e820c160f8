//! API routes for the doclake server

pub mod events;
pub mod query;
pub mod records;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_body_size: usize) -> Router<AppState> {
    Router::new()
        // Ingestion trigger
        .route(
            "/events",
            post(events::receive_events).layer(DefaultBodyLimit::max(max_body_size)),
        )
        // Natural-language query
        .route("/query", post(query::query_records))
        // Records
        .route("/records", get(records::list_records))
        .route("/records/stats", get(records::record_stats))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let templates: Vec<&str> = state
        .query_service()
        .router()
        .templates()
        .iter()
        .map(|t| t.id())
        .collect();

    Json(serde_json::json!({
        "name": "doclake",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Event-driven text ingestion with adaptive summarization and guarded queries",
        "providers": {
            "object_store": state.object_store().name(),
            "inference": state.inference().name(),
            "model": state.inference().model(),
            "records": state.records().name(),
        },
        "templates": templates,
        "endpoints": {
            "POST /api/events": "Ingest an object-creation event or S3 notification",
            "POST /api/query": "Answer a natural-language question over the records",
            "GET /api/records": "Most recent records (limit, since)",
            "GET /api/records/stats": "Record counts by status",
            "GET /health": "Liveness",
            "GET /ready": "Readiness"
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::Result;
    use crate::providers::{InferenceProvider, MemoryObjectStore, SamplingConfig};
    use crate::server::build_router;
    use crate::storage::SqliteRecordStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const REPORT: &str = "Quarterly report: revenue grew in every region and the new office opened on time.";

    struct FixedReply;

    #[async_trait]
    impl InferenceProvider for FixedReply {
        async fn complete(&self, _prompt: &str, _sampling: &SamplingConfig) -> Result<String> {
            Ok("Revenue grew everywhere.".to_string())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-1"
        }
    }

    fn app() -> (Router, Arc<MemoryObjectStore>) {
        let objects = Arc::new(MemoryObjectStore::new());
        objects.insert("inbox", "report.txt", REPORT);

        let config = AppConfig::default();
        let state = AppState::from_parts(
            config.clone(),
            objects.clone(),
            Arc::new(FixedReply),
            Arc::new(SqliteRecordStore::in_memory().unwrap()),
        )
        .unwrap();

        (build_router(state, &config.server), objects)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_event_is_ingested_once() {
        let (app, objects) = app();
        let event = json!({
            "storage_location": "inbox",
            "object_key": "report.txt",
            "event_timestamp": "2026-10-19T08:00:00Z"
        });

        let (status, body) = send(&app, post_json("/api/events", event.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["outcome"], "stored");
        assert!(body["results"][0]["record_id"].is_string());

        let (_, body) = send(&app, post_json("/api/events", event)).await;
        assert_eq!(body["results"][0]["outcome"], "duplicate");

        let (status, stats) = send(&app, get("/api/records/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["success"], 1);

        assert_eq!(objects.keys_with_prefix("inbox", "summaries/").len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_entry_does_not_abort_notification() {
        let (app, _) = app();
        let payload = json!({
            "Records": [
                {"s3": {"bucket": {"name": "inbox"}}},
                {"s3": {"bucket": {"name": "inbox"}, "object": {"key": "summaries/report_summary.txt"}}}
            ]
        });

        let (status, body) = send(&app, post_json("/api/events", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["outcome"], "error");
        assert_eq!(body["results"][1]["outcome"], "skipped");
        assert_eq!(body["results"][1]["object_key"], "summaries/report_summary.txt");
    }

    #[tokio::test]
    async fn test_non_object_payload_is_bad_request() {
        let (app, _) = app();
        let (status, body) = send(&app, post_json("/api/events", json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "malformed_event");
    }

    #[tokio::test]
    async fn test_query_template_and_refusal() {
        let (app, _) = app();
        let event = json!({
            "storage_location": "inbox",
            "object_key": "report.txt",
            "event_timestamp": "2026-10-19T08:00:00Z"
        });
        send(&app, post_json("/api/events", event)).await;

        let (status, body) = send(
            &app,
            post_json("/api/query", json!({"question": "show successful records"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["origin"]["kind"], "TEMPLATE");
        assert_eq!(body["row_count"], 1);

        // The fake model answers with prose, which never parses as SQL
        let (status, body) = send(
            &app,
            post_json("/api/query", json!({"question": "delete all records from last month"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["type"], "refused");
    }

    #[tokio::test]
    async fn test_list_records_and_info() {
        let (app, _) = app();
        let (status, body) = send(&app, get("/api/records?limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);

        let (status, body) = send(&app, get("/api/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["providers"]["inference"], "fixed");
        assert_eq!(body["templates"][0], "recent_records");

        let (status, _) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
