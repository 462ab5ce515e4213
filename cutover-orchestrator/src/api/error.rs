//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::repository::RepositoryError;
use crate::service::{DeployError, PipelineError};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    RepositoryError(RepositoryError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::RepositoryError(err) => {
                tracing::error!("Repository error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::RepositoryError(err)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(id) => ApiError::NotFound(format!("Run {} not found", id)),
            PipelineError::UnknownService(name) => {
                ApiError::BadRequest(format!("Unknown service '{}'", name))
            }
            PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            PipelineError::Repository(err) => ApiError::RepositoryError(err),
        }
    }
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        match err {
            DeployError::NotFound(id) => {
                ApiError::NotFound(format!("Deployment {} not found", id))
            }
            DeployError::UnknownService(name) => {
                ApiError::NotFound(format!("Service '{}' not found", name))
            }
            e @ (DeployError::InProgress { .. } | DeployError::InvalidState(_)) => {
                ApiError::Conflict(e.to_string())
            }
            DeployError::InvalidTransition(e) => ApiError::Conflict(e.to_string()),
            DeployError::Repository(err) => ApiError::RepositoryError(err),
            DeployError::Router(err) => ApiError::InternalError(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
