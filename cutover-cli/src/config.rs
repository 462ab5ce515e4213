//! CLI configuration
//!
//! Where the orchestrator lives. Taken from `--orchestrator-url` or the
//! `CUTOVER_ORCHESTRATOR_URL` environment variable.

use anyhow::{Result, bail};
use cutover_client::OrchestratorClient;

pub const ORCHESTRATOR_URL_ENV: &str = "CUTOVER_ORCHESTRATOR_URL";
pub const DEFAULT_ORCHESTRATOR_URL: &str = "http://localhost:8080";

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the orchestrator API, without a trailing slash
    pub orchestrator_url: String,
}

impl Config {
    /// Validates and normalizes the orchestrator URL
    pub fn new(orchestrator_url: &str) -> Result<Self> {
        let url = orchestrator_url.trim().trim_end_matches('/');

        if url.is_empty() {
            bail!(
                "orchestrator URL cannot be empty (set --orchestrator-url or {})",
                ORCHESTRATOR_URL_ENV
            );
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("orchestrator URL must start with http:// or https://, got '{}'", url);
        }

        Ok(Self {
            orchestrator_url: url.to_string(),
        })
    }

    pub fn client(&self) -> OrchestratorClient {
        OrchestratorClient::new(&self.orchestrator_url)
    }
}
