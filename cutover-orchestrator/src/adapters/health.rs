//! Health source collaborator
//!
//! Produces pass/fail samples for a pool. A sampling error is not a failed
//! probe: the monitor treats it as missing data.

use async_trait::async_trait;
use cutover_core::domain::health::HealthSample;
use cutover_core::domain::spec::HealthCheckSpec;
use cutover_core::domain::traffic::PoolHandle;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Errors from the health source
#[derive(Debug, Clone, thiserror::Error)]
pub enum HealthSourceError {
    #[error("pool {0} has no endpoint to probe")]
    NoEndpoint(String),

    #[error("health source unavailable: {0}")]
    Unavailable(String),
}

/// Health metrics collaborator
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Takes one sample of `pool`'s health
    async fn sample(
        &self,
        service: &str,
        pool: &PoolHandle,
        check: &HealthCheckSpec,
    ) -> Result<HealthSample, HealthSourceError>;
}

/// Probes a pool's endpoint over HTTP; any 2xx passes
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, HealthSourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HealthSourceError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthSource for HttpHealthProbe {
    async fn sample(
        &self,
        service: &str,
        pool: &PoolHandle,
        check: &HealthCheckSpec,
    ) -> Result<HealthSample, HealthSourceError> {
        let endpoint = pool
            .endpoint
            .as_deref()
            .ok_or_else(|| HealthSourceError::NoEndpoint(pool.id.clone()))?;
        let url = format!("{}{}", endpoint.trim_end_matches('/'), check.path);

        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!("Probe {} for {} returned {}", url, service, status);
                if status.is_success() {
                    Ok(HealthSample::pass(format!("{} {}", url, status)))
                } else {
                    Ok(HealthSample::fail(format!("{} {}", url, status)))
                }
            }
            // Connection refused and similar mean the pool is not serving
            Err(e) if e.is_connect() => Ok(HealthSample::fail(format!("{}: {}", url, e))),
            Err(e) => Err(HealthSourceError::Unavailable(e.to_string())),
        }
    }
}

/// One scripted probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedProbe {
    Pass,
    Fail,
    Error,
    /// Answers `passed` only after `after` has elapsed
    Slow { after: Duration, passed: bool },
}

/// Replays a fixed sequence of probe outcomes; the last one repeats forever
pub struct ScriptedHealthSource {
    script: Mutex<VecDeque<ScriptedProbe>>,
    sampled: Mutex<u32>,
}

impl ScriptedHealthSource {
    pub fn new(script: impl IntoIterator<Item = ScriptedProbe>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            sampled: Mutex::new(0),
        }
    }

    pub fn passing() -> Self {
        Self::new([ScriptedProbe::Pass])
    }

    pub fn failing() -> Self {
        Self::new([ScriptedProbe::Fail])
    }

    pub fn erroring() -> Self {
        Self::new([ScriptedProbe::Error])
    }

    /// Number of samples taken so far
    pub fn sampled(&self) -> u32 {
        *self.sampled.lock()
    }

    fn next_probe(&self) -> ScriptedProbe {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or(ScriptedProbe::Error)
        } else {
            script.front().copied().unwrap_or(ScriptedProbe::Error)
        }
    }
}

#[async_trait]
impl HealthSource for ScriptedHealthSource {
    async fn sample(
        &self,
        _service: &str,
        pool: &PoolHandle,
        _check: &HealthCheckSpec,
    ) -> Result<HealthSample, HealthSourceError> {
        *self.sampled.lock() += 1;
        match self.next_probe() {
            ScriptedProbe::Pass => Ok(HealthSample::pass(format!("{} ok", pool))),
            ScriptedProbe::Fail => Ok(HealthSample::fail(format!("{} returned 503", pool))),
            ScriptedProbe::Error => Err(HealthSourceError::Unavailable(
                "metrics backend unreachable".to_string(),
            )),
            ScriptedProbe::Slow { after, passed } => {
                tokio::time::sleep(after).await;
                if passed {
                    Ok(HealthSample::pass(format!("{} ok after {:?}", pool, after)))
                } else {
                    Ok(HealthSample::fail(format!("{} returned 503 after {:?}", pool, after)))
                }
            }
        }
    }
}
