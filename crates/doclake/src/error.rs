//! Error types for doclake

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::query::guardrail::GuardrailViolation;

/// Result type alias for doclake operations
pub type Result<T> = std::result::Result<T, Error>;

/// doclake errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event payload is missing required fields
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Object storage read/write failure
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// No configured encoding could decode the content
    #[error("Could not decode content with any of: {tried}")]
    DecodeExhausted { tried: String },

    /// Inference service failure
    #[error("Inference error: {0}")]
    Inference(String),

    /// Structured store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A SUCCESS record already exists for this source identity
    #[error("Constraint violation: SUCCESS record already exists for {0}")]
    ConstraintViolation(String),

    /// Text field exceeds the store's maximum field size
    #[error("Field '{field}' is {size} bytes, limit is {limit}")]
    FieldTooLarge {
        field: &'static str,
        size: usize,
        limit: usize,
    },

    /// Template parameter failed its type check
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// The request could not be answered safely
    #[error("Could not safely answer: {reason}")]
    Refused { reason: String },

    /// Static query check failed
    #[error("Guardrail violation: {0}")]
    Guardrail(#[from] GuardrailViolation),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an object store error
    pub fn object_store(message: impl Into<String>) -> Self {
        Self::ObjectStore(message.into())
    }

    /// Create an inference error
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Failures that upstream redelivery may fix
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ObjectStore(_) | Error::Inference(_) | Error::Http(_) | Error::Io(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::MalformedEvent(msg) => (StatusCode::BAD_REQUEST, "malformed_event", msg.clone()),
            Error::ObjectStore(msg) => (StatusCode::BAD_GATEWAY, "object_store_error", msg.clone()),
            Error::DecodeExhausted { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "decode_error", self.to_string())
            }
            Error::Inference(msg) => (StatusCode::SERVICE_UNAVAILABLE, "inference_error", msg.clone()),
            Error::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg.clone()),
            Error::ConstraintViolation(_) => (StatusCode::CONFLICT, "duplicate", self.to_string()),
            Error::FieldTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "field_too_large", self.to_string())
            }
            Error::InvalidParameter { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_parameter", self.to_string())
            }
            Error::Refused { reason } => (StatusCode::UNPROCESSABLE_ENTITY, "refused", reason.clone()),
            Error::Guardrail(violation) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "guardrail_violation", violation.to_string())
            }
            Error::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error", err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
