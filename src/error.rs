use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::models::job::JobStatus;
use crate::services::image_store::StorageError;
use crate::services::preprocess::PreprocessError;
use crate::store::StoreError;

/// Errors surfaced by the analysis job manager to its callers.
///
/// Remote analysis failures never appear here; they are recorded on the job.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Analysis job {0} not found")]
    NotFound(Uuid),

    #[error("Analysis job {job_id} is {status}, only failed jobs can be reprocessed")]
    InvalidState { job_id: Uuid, status: JobStatus },

    #[error("Analysis job {job_id} has already been reprocessed {retry_count} times")]
    RetryExceeded { job_id: Uuid, retry_count: i32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PreprocessError> for AnalysisError {
    fn from(e: PreprocessError) -> Self {
        match e {
            PreprocessError::UnsupportedFormat(msg) => {
                AnalysisError::InvalidInput(format!("Unsupported or corrupt image: {msg}"))
            }
            other => AnalysisError::Internal(other.to_string()),
        }
    }
}

impl AnalysisError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "invalid_input",
            AnalysisError::NotFound(_) => "not_found",
            AnalysisError::InvalidState { .. } => "invalid_state",
            AnalysisError::RetryExceeded { .. } => "retry_exceeded",
            AnalysisError::Store(StoreError::Conflict(_)) => "conflict",
            AnalysisError::Store(_) | AnalysisError::Storage(_) | AnalysisError::Internal(_) => {
                "internal"
            }
        }
    }
}

/// HTTP-facing error. Renders as `{"kind": ..., "message": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Validation failed: {0}")]
    Validation(#[from] garde::Report),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "An internal error occurred".to_string(),
    )
}

fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
        other => internal(other),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::Analysis(err) => match err {
                AnalysisError::InvalidInput(_) => {
                    (StatusCode::BAD_REQUEST, err.kind(), err.to_string())
                }
                AnalysisError::NotFound(_) => (StatusCode::NOT_FOUND, err.kind(), err.to_string()),
                AnalysisError::InvalidState { .. } | AnalysisError::RetryExceeded { .. } => {
                    (StatusCode::CONFLICT, err.kind(), err.to_string())
                }
                AnalysisError::Store(store) => classify_store_error(store),
                AnalysisError::Storage(_) | AnalysisError::Internal(_) => internal(err),
            },
            ApiError::Store(err) => classify_store_error(err),
            ApiError::Validation(report) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                report.to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
        };

        (status, axum::Json(json!({ "kind": kind, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        let cases = [
            (ApiError::from(AnalysisError::InvalidInput("empty".into())), 400),
            (ApiError::from(AnalysisError::NotFound(id)), 404),
            (
                ApiError::from(AnalysisError::InvalidState {
                    job_id: id,
                    status: JobStatus::Completed,
                }),
                409,
            ),
            (
                ApiError::from(AnalysisError::RetryExceeded {
                    job_id: id,
                    retry_count: 3,
                }),
                409,
            ),
            (ApiError::from(StoreError::Conflict("taken".into())), 409),
            (ApiError::from(StoreError::Corrupt("bad row".into())), 500),
            (ApiError::Unauthorized("no key".into()), 401),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status().as_u16(), expected);
        }
    }

    #[test]
    fn test_kinds_are_stable() {
        let id = Uuid::new_v4();
        assert_eq!(AnalysisError::NotFound(id).kind(), "not_found");
        assert_eq!(
            AnalysisError::RetryExceeded {
                job_id: id,
                retry_count: 1
            }
            .kind(),
            "retry_exceeded"
        );
        assert_eq!(AnalysisError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn test_unsupported_image_is_invalid_input() {
        let err = AnalysisError::from(PreprocessError::UnsupportedFormat("garbage".into()));
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }
}
