//! Pipeline run API endpoints

use cutover_core::domain::pipeline::PipelineRun;
use cutover_core::dto::run::{RunSummary, TriggerRun};
use std::time::Duration;
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::{ClientError, Result};

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Runs
    // =============================================================================

    /// Trigger a run for a service
    ///
    /// The orchestrator answers immediately with the Pending run; use
    /// [`wait_for_run`](Self::wait_for_run) to follow it.
    ///
    /// # Example
    /// ```no_run
    /// # use cutover_client::OrchestratorClient;
    /// # use cutover_core::dto::run::TriggerRun;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let run = client.trigger_run(TriggerRun {
    ///     service: "web".to_string(),
    ///     branch: None,
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn trigger_run(&self, req: TriggerRun) -> Result<PipelineRun> {
        let url = format!("{}/api/run", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List all runs, newest first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let url = format!("{}/api/run/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a run by ID
    pub async fn get_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let url = format!("{}/api/run/{}", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Poll a run until it is terminal
    ///
    /// # Arguments
    /// * `run_id` - The run UUID
    /// * `poll_interval` - Delay between polls
    /// * `timeout` - Give up after this long; `None` waits indefinitely
    pub async fn wait_for_run(
        &self,
        run_id: Uuid,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<PipelineRun> {
        let poll = self.poll_run(run_id, poll_interval);

        match timeout {
            Some(limit) => tokio::time::timeout(limit, poll).await.map_err(|_| {
                ClientError::Timeout(format!("run {} did not finish within {:?}", run_id, limit))
            })?,
            None => poll.await,
        }
    }

    async fn poll_run(&self, run_id: Uuid, poll_interval: Duration) -> Result<PipelineRun> {
        loop {
            let run = self.get_run(run_id).await?;
            if run.status.is_terminal() {
                return Ok(run);
            }
            tracing::debug!("Run {} is {}, waiting", run_id, run.status);
            tokio::time::sleep(poll_interval).await;
        }
    }
}
