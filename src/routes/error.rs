use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::IngestError;

// ---

/// HTTP face of [`IngestError`] and of body extraction failures.
#[derive(Debug)]
pub enum ApiError {
    Ingest(IngestError),
    /// Keeps axum's status: 400 syntax, 415 content type, 422 data.
    Payload(JsonRejection),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self::Ingest(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Payload(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let err = match self {
            Self::Ingest(err) => err,
            Self::Payload(rejection) => {
                let body = json!({"kind": "invalid_payload", "error": rejection.body_text()});
                return (rejection.status(), Json(body)).into_response();
            }
        };

        let message = err.to_string();
        let (status, body) = match err {
            IngestError::Validation(v) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "kind": "validation",
                    "error": message,
                    "device_type": v.device_type,
                    "missing_keys": v.missing,
                }),
            ),
            IngestError::InvalidAsset(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"kind": "invalid_asset", "error": message}),
            ),
            IngestError::UnknownDevice(device_id) => (
                StatusCode::NOT_FOUND,
                json!({"kind": "referential", "error": message, "device_id": device_id}),
            ),
            IngestError::DuplicateDevice(device_id) => (
                StatusCode::CONFLICT,
                json!({"kind": "conflict", "error": message, "device_id": device_id}),
            ),
            IngestError::Storage(e) => {
                error!("Storage failure: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"kind": "storage", "error": "storage failure"}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
