//! Cloud provisioning collaborator
//!
//! Allocates and releases backend pools. Decommissioning must be idempotent:
//! finalize and rollback retry it, so removing a pool that is already gone
//! is a no-op rather than an error.

use async_trait::async_trait;
use cutover_core::domain::spec::TaskSpec;
use cutover_core::domain::traffic::{PoolColor, PoolHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, info};

/// Errors from the provisioning collaborator
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProvisionError {
    #[error("insufficient capacity: {0}")]
    Capacity(String),

    #[error("image pull failed: {0}")]
    ImagePull(String),

    #[error("provisioning service unavailable: {0}")]
    Unavailable(String),
}

/// Cloud provisioning collaborator
#[async_trait]
pub trait PoolProvisioner: Send + Sync {
    /// Allocates a pool running `task` for the given slot
    async fn provision_pool(
        &self,
        service: &str,
        color: PoolColor,
        task: &TaskSpec,
    ) -> Result<PoolHandle, ProvisionError>;

    /// Releases a pool; succeeds if the pool is already gone
    async fn decommission_pool(&self, pool: &PoolHandle) -> Result<(), ProvisionError>;
}

#[derive(Default)]
struct ProvisionerState {
    active: HashMap<String, TaskSpec>,
    decommissioned: Vec<String>,
    provision_failures: VecDeque<ProvisionError>,
    decommission_failures: u32,
    sequence: u64,
}

/// Local simulation of a compute substrate
///
/// Pools are bookkeeping entries. Failures can be queued to exercise the
/// controller's abort and retry paths.
pub struct InMemoryProvisioner {
    /// `{service}`, `{color}` and `{port}` are substituted
    endpoint_template: Option<String>,
    /// How long a pool takes to come up
    startup_delay: Duration,
    state: Mutex<ProvisionerState>,
}

impl InMemoryProvisioner {
    pub fn new() -> Self {
        Self {
            endpoint_template: None,
            startup_delay: Duration::ZERO,
            state: Mutex::new(ProvisionerState::default()),
        }
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Gives every provisioned pool an endpoint built from `template`
    pub fn with_endpoint_template(mut self, template: impl Into<String>) -> Self {
        self.endpoint_template = Some(template.into());
        self
    }

    /// Makes the next provision call fail with `error`
    pub fn fail_next_provision(&self, error: ProvisionError) {
        self.state.lock().provision_failures.push_back(error);
    }

    /// Makes the next `count` decommission calls fail as unavailable
    pub fn fail_decommissions(&self, count: u32) {
        self.state.lock().decommission_failures = count;
    }

    pub fn is_active(&self, pool: &PoolHandle) -> bool {
        self.state.lock().active.contains_key(&pool.id)
    }

    pub fn active_pools(&self) -> Vec<String> {
        let mut pools: Vec<String> = self.state.lock().active.keys().cloned().collect();
        pools.sort();
        pools
    }

    /// Pool ids removed so far, in order; repeats are not recorded
    pub fn decommissioned(&self) -> Vec<String> {
        self.state.lock().decommissioned.clone()
    }
}

impl Default for InMemoryProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolProvisioner for InMemoryProvisioner {
    async fn provision_pool(
        &self,
        service: &str,
        color: PoolColor,
        task: &TaskSpec,
    ) -> Result<PoolHandle, ProvisionError> {
        if !self.startup_delay.is_zero() {
            tokio::time::sleep(self.startup_delay).await;
        }
        let mut state = self.state.lock();

        if let Some(error) = state.provision_failures.pop_front() {
            return Err(error);
        }

        state.sequence += 1;
        let id = format!("{}-{}-{}", service, color, state.sequence);
        let mut pool = PoolHandle::new(id.clone());
        if let Some(template) = &self.endpoint_template {
            pool = pool.with_endpoint(
                template
                    .replace("{service}", service)
                    .replace("{color}", &color.to_string())
                    .replace("{port}", &task.container_port.to_string()),
            );
        }

        state.active.insert(id, task.clone());
        info!("Provisioned pool {} running {}", pool, task.image);
        Ok(pool)
    }

    async fn decommission_pool(&self, pool: &PoolHandle) -> Result<(), ProvisionError> {
        let mut state = self.state.lock();

        if state.decommission_failures > 0 {
            state.decommission_failures -= 1;
            return Err(ProvisionError::Unavailable(
                "simulated provisioning outage".to_string(),
            ));
        }

        state.active.remove(&pool.id);
        if state.decommissioned.contains(&pool.id) {
            debug!("Pool {} already decommissioned", pool);
        } else {
            state.decommissioned.push(pool.id.clone());
            info!("Decommissioned pool {}", pool);
        }
        Ok(())
    }
}
