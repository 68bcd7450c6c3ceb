use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::db::StoreError;
use crate::services::provider::ProviderError;

/// Errors surfaced by the caller-facing generation operations.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Bad caller input. Nothing was written and the provider was not called.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing provider API key.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type JobResult<T> = Result<T, JobError>;

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            JobError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            JobError::Config(msg) => (StatusCode::SERVICE_UNAVAILABLE, "CONFIG_ERROR", msg.clone()),
            JobError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Job {id} not found"),
            ),
            JobError::Provider(err) => {
                tracing::warn!(error = %err, "Provider call failed");
                let code = match err {
                    ProviderError::Unauthorized { .. } => "PROVIDER_UNAUTHORIZED",
                    ProviderError::Unreachable(_) => "PROVIDER_UNREACHABLE",
                    ProviderError::InvalidResponse(_) => "PROVIDER_INVALID_RESPONSE",
                    ProviderError::Rejected { .. } => "PROVIDER_REJECTED",
                    ProviderError::Setup(_) => "PROVIDER_SETUP",
                };
                (StatusCode::BAD_GATEWAY, code, err.to_string())
            }
            JobError::Store(StoreError::DuplicateKey(key)) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("Duplicate key: {key}"),
            ),
            JobError::Store(StoreError::Database(err)) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
