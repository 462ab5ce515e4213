//! Deployment API Handlers
//!
//! HTTP endpoints for inspecting deployments and for the two operator
//! actions on them: cancel and resolve.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use cutover_core::domain::deployment::Deployment;
use cutover_core::dto::deployment::{CancelDeployment, DeploymentSummary, ResolveDeployment};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /api/deployment/list
pub async fn list_deployments(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DeploymentSummary>>> {
    tracing::debug!("Listing deployments");

    let deployments = state.deployments.list().await?;
    Ok(Json(
        deployments.into_iter().map(DeploymentSummary::from).collect(),
    ))
}

/// GET /api/deployment/{id}
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    tracing::debug!("Getting deployment: {}", id);

    let deployment = state.deployments.get(id).await?;
    Ok(Json(deployment))
}

/// POST /api/deployment/{id}/cancel
/// Request a rollback; the response is the state at the time of the request
pub async fn cancel_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelDeployment>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!("Cancelling deployment: {}", id);

    let deployment = state.deployments.cancel(id, req.reason).await?;
    Ok((StatusCode::ACCEPTED, Json(deployment)))
}

/// POST /api/deployment/{id}/resolve
pub async fn resolve_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveDeployment>,
) -> ApiResult<Json<Deployment>> {
    if req.note.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "A resolution note is required".to_string(),
        ));
    }

    tracing::info!("Resolving deployment: {}", id);

    let deployment = state.deployments.resolve(id, req.note).await?;
    Ok(Json(deployment))
}
