// src/endpoint/response.rs

//! The JSON response envelope every endpoint handler returns.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

/// `{type, status, status_code, metadata, error}`, per the wire contract.
#[derive(Debug, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub status: u16,
    pub status_code: u16,
    pub metadata: Value,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Sync,
    Async,
    Error,
}

impl Envelope {
    pub fn sync(status: StatusCode, metadata: impl Serialize) -> Self {
        Self {
            kind: EnvelopeKind::Sync,
            status: status.as_u16(),
            status_code: status.as_u16(),
            metadata: serde_json::to_value(metadata).unwrap_or(Value::Null),
            error: None,
        }
    }

    pub fn r#async(status: StatusCode, metadata: impl Serialize) -> Self {
        Self {
            kind: EnvelopeKind::Async,
            status: status.as_u16(),
            status_code: status.as_u16(),
            metadata: serde_json::to_value(metadata).unwrap_or(Value::Null),
            error: None,
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Error,
            status: status.as_u16(),
            status_code: status.as_u16(),
            metadata: Value::Null,
            error: Some(message.into()),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// The handler mounted at `/1.0/internal/resource/not-found` et al — any
/// request the router can't match.
pub async fn not_found() -> Envelope {
    Envelope::error(StatusCode::NOT_FOUND, "Not Found")
}
