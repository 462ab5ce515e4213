//! ID resolver module
//!
//! Resolves UUID prefixes to full UUIDs by listing the resource from the API,
//! so users can type short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result};
use cutover_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a run ID or prefix to a full UUID
pub async fn resolve_run_id(client: &OrchestratorClient, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let runs = client
        .list_runs()
        .await
        .context("Failed to fetch runs for ID resolution")?;

    id_or_prefix.pick("run", runs.iter().map(|r| r.id))
}

/// Resolve a deployment ID or prefix to a full UUID
pub async fn resolve_deployment_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let deployments = client
        .list_deployments()
        .await
        .context("Failed to fetch deployments for ID resolution")?;

    id_or_prefix.pick("deployment", deployments.iter().map(|d| d.id))
}
