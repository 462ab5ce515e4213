//! Deployment API endpoints

use cutover_core::domain::deployment::Deployment;
use cutover_core::dto::deployment::{CancelDeployment, DeploymentSummary, ResolveDeployment};
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    // =============================================================================
    // Deployments
    // =============================================================================

    /// List all deployments, newest first
    pub async fn list_deployments(&self) -> Result<Vec<DeploymentSummary>> {
        let url = format!("{}/api/deployment/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a deployment by ID
    pub async fn get_deployment(&self, deployment_id: Uuid) -> Result<Deployment> {
        let url = format!("{}/api/deployment/{}", self.base_url, deployment_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of an in-flight deployment
    ///
    /// Returns the deployment as it was when the request was accepted; the
    /// rollback itself happens asynchronously.
    pub async fn cancel_deployment(
        &self,
        deployment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Deployment> {
        let url = format!("{}/api/deployment/{}/cancel", self.base_url, deployment_id);
        let response = self
            .client
            .post(&url)
            .json(&CancelDeployment { reason })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Close a deployment that needed manual intervention
    ///
    /// # Arguments
    /// * `deployment_id` - The deployment UUID
    /// * `note` - What the operator did to repair traffic
    pub async fn resolve_deployment(
        &self,
        deployment_id: Uuid,
        note: impl Into<String>,
    ) -> Result<Deployment> {
        let url = format!("{}/api/deployment/{}/resolve", self.base_url, deployment_id);
        let response = self
            .client
            .post(&url)
            .json(&ResolveDeployment { note: note.into() })
            .send()
            .await?;

        self.handle_response(response).await
    }
}
