//! Orchestrator configuration
//!
//! Defines the tunables of the orchestrator process: where it listens,
//! where state lives, the service catalog, and the timing bounds of
//! deployments and collaborator calls.

use std::path::PathBuf;
use std::time::Duration;

use cutover_core::domain::retry::RetryPolicy;

use crate::service::DeploySettings;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the operator API binds to
    pub bind_addr: String,

    /// Postgres URL; in-memory repositories are used when unset
    pub database_url: Option<String>,

    /// JSON list of service definitions
    pub services_file: PathBuf,

    /// Directory for the artifact store; in-memory when unset
    pub artifact_dir: Option<PathBuf>,

    /// How long a candidate is observed at full traffic
    pub observation_window: Duration,

    /// Backoff for every retried collaborator call
    pub retry: RetryPolicy,

    /// Bound on a single `git ls-remote`
    pub source_timeout: Duration,

    /// Bound on a single build
    pub build_timeout: Duration,

    /// Bound on a single health probe request
    pub probe_timeout: Duration,

    /// Endpoint template for provisioned pools, e.g. `http://{service}-{color}:{port}`
    pub pool_endpoint_template: Option<String>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - ORCHESTRATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - DATABASE_URL (default: unset, in-memory state)
    /// - SERVICES_FILE (default: services.json)
    /// - ARTIFACT_DIR (default: unset, in-memory artifacts)
    /// - OBSERVATION_WINDOW (seconds, default: 300)
    /// - RETRY_MAX_ATTEMPTS (default: 5)
    /// - RETRY_BASE_DELAY_MS (default: 500)
    /// - RETRY_MULTIPLIER (default: 2.0)
    /// - RETRY_MAX_DELAY_MS (default: 30000)
    /// - SOURCE_TIMEOUT (seconds, default: 30)
    /// - BUILD_TIMEOUT (seconds, default: 1800)
    /// - PROBE_TIMEOUT (seconds, default: 5)
    /// - POOL_ENDPOINT_TEMPLATE (default: unset)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let retry_defaults = RetryPolicy::default();

        let bind_addr =
            std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let database_url = non_empty_var("DATABASE_URL");

        let services_file = non_empty_var("SERVICES_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.services_file);

        let artifact_dir = non_empty_var("ARTIFACT_DIR").map(PathBuf::from);

        let retry = RetryPolicy {
            max_attempts: parse_var("RETRY_MAX_ATTEMPTS")?
                .unwrap_or(retry_defaults.max_attempts),
            base_delay_ms: parse_var("RETRY_BASE_DELAY_MS")?
                .unwrap_or(retry_defaults.base_delay_ms),
            multiplier: parse_var("RETRY_MULTIPLIER")?.unwrap_or(retry_defaults.multiplier),
            max_delay_ms: parse_var("RETRY_MAX_DELAY_MS")?
                .unwrap_or(retry_defaults.max_delay_ms),
        };

        Ok(Self {
            bind_addr,
            database_url,
            services_file,
            artifact_dir,
            observation_window: seconds_var("OBSERVATION_WINDOW")?
                .unwrap_or(defaults.observation_window),
            retry,
            source_timeout: seconds_var("SOURCE_TIMEOUT")?.unwrap_or(defaults.source_timeout),
            build_timeout: seconds_var("BUILD_TIMEOUT")?.unwrap_or(defaults.build_timeout),
            probe_timeout: seconds_var("PROBE_TIMEOUT")?.unwrap_or(defaults.probe_timeout),
            pool_endpoint_template: non_empty_var("POOL_ENDPOINT_TEMPLATE"),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                anyhow::bail!("database_url must start with postgres:// or postgresql://");
            }
        }

        if self.observation_window.is_zero() {
            anyhow::bail!("observation_window must be greater than 0");
        }

        if self.source_timeout.is_zero() || self.build_timeout.is_zero() {
            anyhow::bail!("source and build timeouts must be greater than 0");
        }

        if self.probe_timeout.is_zero() {
            anyhow::bail!("probe_timeout must be greater than 0");
        }

        self.retry.validate()?;

        Ok(())
    }

    /// Settings shared by every deployment
    pub fn deploy_settings(&self) -> DeploySettings {
        DeploySettings {
            retry: self.retry.clone(),
            observation_window: self.observation_window,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            services_file: PathBuf::from("services.json"),
            artifact_dir: None,
            observation_window: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            source_timeout: Duration::from_secs(30),
            build_timeout: Duration::from_secs(1800), // 30 minutes
            probe_timeout: Duration::from_secs(5),
            pool_endpoint_template: None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>> {
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", key, raw)),
        None => Ok(None),
    }
}

fn seconds_var(key: &str) -> anyhow::Result<Option<Duration>> {
    Ok(parse_var::<u64>(key)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.database_url.is_none());
        assert_eq!(config.observation_window, Duration::from_secs(300));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.database_url = Some("mysql://localhost/cutover".to_string());
        assert!(config.validate().is_err());

        config.database_url = Some("postgres://cutover@localhost/cutover".to_string());
        assert!(config.validate().is_ok());

        config.observation_window = Duration::ZERO;
        assert!(config.validate().is_err());

        config.observation_window = Duration::from_secs(60);
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deploy_settings() {
        let config = Config {
            observation_window: Duration::from_secs(42),
            ..Config::default()
        };
        let settings = config.deploy_settings();
        assert_eq!(settings.observation_window, Duration::from_secs(42));
        assert_eq!(settings.retry, config.retry);
    }
}
