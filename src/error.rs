// src/error.rs
//! HTTP error envelope: `{"error":{"code":..,"message":..}}`.

use serde_json::json;
use shuttle_axum::axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::digest::DigestError;
use crate::jobs::JobError;
use crate::timezone::WindowError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    /// Logs the full error chain; the client only sees `code`.
    pub fn internal(code: &'static str, err: &anyhow::Error) -> Self {
        tracing::error!(target: "api", code, error = %format!("{err:#}"), "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

impl From<WindowError> for ApiError {
    fn from(e: WindowError) -> Self {
        ApiError::bad_request(e.code(), e.to_string())
    }
}

impl From<DigestError> for ApiError {
    fn from(e: DigestError) -> Self {
        match e {
            DigestError::Window(w) => w.into(),
            DigestError::AlreadyExists { .. } => {
                ApiError::new(StatusCode::CONFLICT, "DIGEST_ALREADY_EXISTS", e.to_string())
            }
            DigestError::SignalNotFound(_) => ApiError::not_found("SIGNAL_NOT_FOUND", e.to_string()),
            DigestError::SnapshotCorrupt(msg) => {
                tracing::error!(target: "api", error = %msg, "corrupt digest snapshot");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SNAPSHOT_CORRUPT",
                    format!("stored digest snapshot is corrupt: {msg}"),
                )
            }
            DigestError::Internal(err) => ApiError::internal("INTERNAL", &err),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(_) => ApiError::not_found("JOB_NOT_FOUND", e.to_string()),
            JobError::SessionNotFound(_) => ApiError::not_found("SESSION_NOT_FOUND", e.to_string()),
            JobError::InvalidTransition { .. } => {
                ApiError::new(StatusCode::CONFLICT, "JOB_INVALID_TRANSITION", e.to_string())
            }
            JobError::Generation(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "GENERATION_FAILED", e.to_string())
            }
            JobError::InvalidArtifact(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "INVALID_ARTIFACT", e.to_string())
            }
            JobError::Aborted(msg) => ApiError::internal("INTERNAL", &anyhow::anyhow!(msg)),
            JobError::Internal(err) => ApiError::internal("INTERNAL", &err),
        }
    }
}
