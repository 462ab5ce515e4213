//! Pipeline Run API Handlers
//!
//! HTTP endpoints for triggering and inspecting pipeline runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use cutover_core::domain::pipeline::PipelineRun;
use cutover_core::dto::run::{RunSummary, TriggerRun};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /api/run
/// Trigger a run; it executes in the background
pub async fn trigger_run(
    State(state): State<AppState>,
    Json(req): Json<TriggerRun>,
) -> ApiResult<(StatusCode, Json<PipelineRun>)> {
    tracing::info!("Triggering run for service: {}", req.service);

    let run = state.pipeline.trigger(req).await?;

    let pipeline = state.pipeline.clone();
    let pending = run.clone();
    tokio::spawn(async move {
        pipeline.run(pending).await;
    });

    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// GET /api/run/list
pub async fn list_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<RunSummary>>> {
    tracing::debug!("Listing runs");

    let runs = state.pipeline.list_runs().await?;
    Ok(Json(runs.into_iter().map(RunSummary::from).collect()))
}

/// GET /api/run/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!("Getting run: {}", id);

    let run = state.pipeline.get_run(id).await?;
    Ok(Json(run))
}
