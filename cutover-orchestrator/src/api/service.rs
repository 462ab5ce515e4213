//! Service API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use cutover_core::dto::service::ServiceStatus;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /api/service/{name}
/// Live routing view of a service
pub async fn get_service_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServiceStatus>> {
    tracing::debug!("Getting service status: {}", name);

    let status = state.deployments.service_status(&name).await?;
    Ok(Json(status))
}
