//! Service status endpoints

use cutover_core::dto::service::ServiceStatus;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Live routing view of a service
    pub async fn get_service_status(&self, name: &str) -> Result<ServiceStatus> {
        let url = format!("{}/api/service/{}", self.base_url, name);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Check that the orchestrator is up
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
