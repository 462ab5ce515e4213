//! Deployment Controller
//!
//! Drives one blue/green cutover per service:
//! provision the candidate slot, shift traffic onto it, observe it, then
//! either finalize (retire the incumbent) or roll back (retire the
//! candidate).
//!
//! The controller is the single writer of each service's routing state. A
//! per-service lease is taken when a deployment is created and released when
//! it reaches a terminal state, or when an operator resolves a deployment
//! stuck in `ManualInterventionRequired`.
//!
//! Leases live in memory. After a restart [`DeploymentController::restore`]
//! rebuilds them from the stored deployments.

use cutover_core::domain::artifact::ArtifactRef;
use cutover_core::domain::deployment::{Deployment, DeploymentState, InvalidTransition};
use cutover_core::domain::retry::RetryPolicy;
use cutover_core::domain::spec::{HealthCheckSpec, ServiceDefinition, ShiftPolicy, TaskSpec};
use cutover_core::domain::traffic::{PoolColor, PoolHandle, TrafficWeights};
use cutover_core::dto::service::ServiceStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::router::RouterError;
use crate::adapters::{HealthSource, PoolProvisioner, TrafficRouter};
use crate::repository::{DeploymentRepository, RepositoryError};
use crate::service::monitor::RollbackMonitor;
use crate::service::retry::{RetryExhausted, with_retry};

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("DeploymentInProgress: deployment {deployment_id} already holds service '{service}'")]
    InProgress { service: String, deployment_id: Uuid },

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("deployment {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Everything needed to roll a new task out to a service
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub service: String,
    pub run_id: Option<Uuid>,
    pub artifact_ref: Option<ArtifactRef>,
    pub task_spec: TaskSpec,
    pub health_check: HealthCheckSpec,
    pub shift_policy: ShiftPolicy,
}

impl DeployRequest {
    /// Request for `service` running `task_spec`, with the service's rollout settings
    pub fn for_service(service: &ServiceDefinition, task_spec: TaskSpec) -> Self {
        Self {
            service: service.name.clone(),
            run_id: None,
            artifact_ref: None,
            task_spec,
            health_check: service.health_check.clone(),
            shift_policy: service.shift_policy,
        }
    }
}

/// Tunables shared by every deployment
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub retry: RetryPolicy,
    pub observation_window: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            observation_window: Duration::from_secs(300),
        }
    }
}

/// Routing state of one service as seen by its single writer
#[derive(Debug, Clone)]
struct ServiceLease {
    incumbent_color: PoolColor,
    incumbent_pool: Option<PoolHandle>,
    in_flight: Option<Uuid>,
}

/// Cancellation handle of a deployment this controller is driving
///
/// `state` is the driver's live state, written before the record is saved,
/// so `cancel` never decides on a stale repository read.
struct CancelSignal {
    token: CancellationToken,
    reason: Option<String>,
    state: DeploymentState,
}

enum ShiftOutcome {
    Complete,
    Cancelled,
    Exhausted(RetryExhausted),
}

pub struct DeploymentController {
    provisioner: Arc<dyn PoolProvisioner>,
    router: Arc<dyn TrafficRouter>,
    monitor: RollbackMonitor,
    repository: Arc<dyn DeploymentRepository>,
    settings: DeploySettings,
    leases: Mutex<HashMap<String, ServiceLease>>,
    cancels: Mutex<HashMap<Uuid, CancelSignal>>,
}

impl DeploymentController {
    pub fn new(
        provisioner: Arc<dyn PoolProvisioner>,
        router: Arc<dyn TrafficRouter>,
        health: Arc<dyn HealthSource>,
        repository: Arc<dyn DeploymentRepository>,
        settings: DeploySettings,
    ) -> Self {
        Self {
            provisioner,
            router,
            monitor: RollbackMonitor::new(health),
            repository,
            settings,
            leases: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Makes a service deployable
    ///
    /// A configured incumbent pool is put behind the blue slot with all
    /// traffic on it.
    pub async fn register_service(&self, service: &ServiceDefinition) -> Result<(), RouterError> {
        if let Some(pool) = &service.incumbent_pool {
            self.serve_from(service, PoolColor::Blue, pool).await?;
        }

        self.leases
            .lock()
            .entry(service.name.clone())
            .or_insert_with(|| ServiceLease {
                incumbent_color: PoolColor::Blue,
                incumbent_pool: service.incumbent_pool.clone(),
                in_flight: None,
            });

        info!("Service registered: {}", service.name);
        Ok(())
    }

    /// Registers services after a restart, rebuilding their routing state
    /// from the stored deployments
    ///
    /// A service's incumbent is the candidate of its latest deployment that
    /// ended with the candidate serving, or the configured pool on the blue
    /// slot. Deployments a previous process left in flight cannot be resumed:
    /// they are parked in ManualInterventionRequired, keep their service
    /// locked, and their listener is left as found. Returns the parked ids.
    pub async fn restore<'a>(
        &self,
        services: impl IntoIterator<Item = &'a ServiceDefinition>,
    ) -> Result<Vec<Uuid>, DeployError> {
        // Newest first
        let mut history = self.repository.list_all().await?;

        let mut stranded = Vec::new();
        for d in history.iter_mut() {
            if d.state.is_terminal() || d.state == DeploymentState::ManualInterventionRequired {
                continue;
            }
            let reason = format!("orchestrator restarted while {}", d.state);
            d.strand(reason.clone())?;
            self.repository.save(d).await?;
            error!("Deployment {}: manual intervention required: {}", d.id, reason);
            stranded.push(d.id);
        }

        for service in services {
            let held = history
                .iter()
                .find(|d| {
                    d.service == service.name
                        && d.state == DeploymentState::ManualInterventionRequired
                })
                .map(|d| d.id);
            let (incumbent_color, incumbent_pool) = history
                .iter()
                .find(|d| d.service == service.name && d.candidate_promoted())
                .map_or((PoolColor::Blue, service.incumbent_pool.clone()), |d| {
                    (d.candidate_color, d.candidate_pool.clone())
                });

            match (held, &incumbent_pool) {
                (Some(id), _) => warn!(
                    "Service {} is held by deployment {}, routing left as found",
                    service.name, id
                ),
                (None, Some(pool)) => self.serve_from(service, incumbent_color, pool).await?,
                (None, None) => {}
            }

            self.leases.lock().insert(
                service.name.clone(),
                ServiceLease {
                    incumbent_color,
                    incumbent_pool,
                    in_flight: held,
                },
            );
            info!(
                "Service restored: {} (incumbent {} slot)",
                service.name, incumbent_color
            );
        }

        Ok(stranded)
    }

    /// Creates a deployment in Provisioning and takes the service lease
    ///
    /// Fails with `InProgress` without touching the router if another
    /// deployment holds the service.
    pub async fn begin(&self, req: &DeployRequest) -> Result<Deployment, DeployError> {
        let deployment = {
            let mut leases = self.leases.lock();
            let lease = leases
                .get_mut(&req.service)
                .ok_or_else(|| DeployError::UnknownService(req.service.clone()))?;

            if let Some(deployment_id) = lease.in_flight {
                return Err(DeployError::InProgress {
                    service: req.service.clone(),
                    deployment_id,
                });
            }

            let mut deployment = Deployment::new(
                &req.service,
                req.task_spec.clone(),
                lease.incumbent_color,
                lease.incumbent_pool.clone(),
            );
            deployment.run_id = req.run_id;
            deployment.artifact_ref = req.artifact_ref.clone();
            lease.in_flight = Some(deployment.id);
            deployment
        };

        if let Err(e) = self.repository.save(&deployment).await {
            self.release(&deployment);
            return Err(e.into());
        }

        self.cancels.lock().insert(
            deployment.id,
            CancelSignal {
                token: CancellationToken::new(),
                reason: None,
                state: deployment.state,
            },
        );

        info!(
            "Deployment {} created for {}: {} -> {} slot",
            deployment.id, deployment.service, deployment.task_spec.image, deployment.candidate_color
        );
        Ok(deployment)
    }

    /// Drives a deployment created by [`begin`](Self::begin) until it is
    /// terminal or needs an operator
    pub async fn drive(
        &self,
        mut deployment: Deployment,
        req: &DeployRequest,
    ) -> Result<Deployment, DeployError> {
        let cancel = self
            .cancels
            .lock()
            .get(&deployment.id)
            .map(|s| s.token.clone())
            .unwrap_or_default();

        let result = self.run_phases(&mut deployment, req, &cancel).await;

        self.cancels.lock().remove(&deployment.id);
        self.settle_lease(&deployment);

        if let Err(e) = &result {
            error!("Deployment {} stopped in {}: {}", deployment.id, deployment.state, e);
        }
        result.map(|_| deployment)
    }

    /// [`begin`](Self::begin) followed by [`drive`](Self::drive)
    pub async fn deploy(&self, req: &DeployRequest) -> Result<Deployment, DeployError> {
        let deployment = self.begin(req).await?;
        self.drive(deployment, req).await
    }

    /// Requests cancellation; the deployment rolls back
    ///
    /// Accepted in Provisioning, TrafficShifting and Observing. A shift that
    /// is already in progress completes first. Once the driver has claimed
    /// Finalizing the request is rejected, so an accepted cancel always ends
    /// in a rollback.
    pub async fn cancel(&self, id: Uuid, reason: Option<String>) -> Result<Deployment, DeployError> {
        let deployment = self.get(id).await?;

        let mut cancels = self.cancels.lock();
        let Some(signal) = cancels.get_mut(&id) else {
            return Err(DeployError::InvalidState(if deployment.state.is_cancellable() {
                format!("Deployment {} is not being driven by this orchestrator", id)
            } else {
                format!("Cannot cancel deployment {} in state {}", id, deployment.state)
            }));
        };

        if !signal.state.is_cancellable() {
            return Err(DeployError::InvalidState(format!(
                "Cannot cancel deployment {} in state {}",
                id, signal.state
            )));
        }

        signal
            .reason
            .get_or_insert_with(|| reason.unwrap_or_else(|| "operator request".to_string()));
        signal.token.cancel();

        info!("Deployment {} cancellation requested", id);
        Ok(deployment)
    }

    /// Closes a deployment in ManualInterventionRequired as Aborted
    ///
    /// The operator is expected to have repaired traffic by hand. The slot
    /// holding all traffic afterwards becomes the incumbent.
    pub async fn resolve(&self, id: Uuid, note: String) -> Result<Deployment, DeployError> {
        let mut deployment = self.get(id).await?;

        if deployment.state != DeploymentState::ManualInterventionRequired {
            return Err(DeployError::InvalidState(format!(
                "Deployment {} is {}; only ManualInterventionRequired can be resolved",
                id, deployment.state
            )));
        }

        // The split as the operator left it decides the incumbent, now and
        // after a restart
        deployment.traffic_split = match self.router.current_weights(&deployment.service).await {
            Ok(weights) => weights.weight_of(deployment.candidate_color),
            Err(e) => {
                warn!("Deployment {}: weights unavailable while resolving: {}", id, e);
                0
            }
        };
        let candidate_serving = deployment.traffic_split == 100;

        deployment.transition(
            DeploymentState::Aborted,
            Some(format!("resolved by operator: {}", note)),
        )?;
        self.repository.save(&deployment).await?;

        {
            let mut leases = self.leases.lock();
            if let Some(lease) = leases.get_mut(&deployment.service) {
                if lease.in_flight == Some(id) {
                    if candidate_serving {
                        lease.incumbent_color = deployment.candidate_color;
                        lease.incumbent_pool = deployment.candidate_pool.clone();
                    }
                    lease.in_flight = None;
                }
            }
        }

        info!("Deployment {} resolved by operator: {}", id, note);
        Ok(deployment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Deployment, DeployError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(DeployError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Deployment>, DeployError> {
        Ok(self.repository.list_all().await?)
    }

    pub async fn service_status(&self, name: &str) -> Result<ServiceStatus, DeployError> {
        let lease = self
            .leases
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::UnknownService(name.to_string()))?;

        let weights = self
            .router
            .current_weights(name)
            .await
            .unwrap_or_else(|_| TrafficWeights::all_on(lease.incumbent_color));

        Ok(ServiceStatus {
            name: name.to_string(),
            incumbent_color: lease.incumbent_color,
            incumbent_pool: lease.incumbent_pool,
            weights,
            in_flight_deployment: lease.in_flight,
        })
    }

    /// Puts `pool` behind the `color` slot with all traffic on it
    async fn serve_from(
        &self,
        service: &ServiceDefinition,
        color: PoolColor,
        pool: &PoolHandle,
    ) -> Result<(), RouterError> {
        self.router.attach(&service.name, color, pool).await?;
        self.router
            .register_health_check(&service.name, color, &service.health_check)
            .await?;
        self.router.shift_traffic(&service.name, color, 100).await?;
        Ok(())
    }

    // =========================================================================
    // State machine
    // =========================================================================

    async fn run_phases(
        &self,
        d: &mut Deployment,
        req: &DeployRequest,
        cancel: &CancellationToken,
    ) -> Result<(), DeployError> {
        if let Err(reason) = self.provision(d, req).await {
            return self.abort(d, reason).await;
        }
        if cancel.is_cancelled() {
            let reason = self.cancel_reason(d.id);
            return self.roll_back(d, reason).await;
        }

        self.enter(d, DeploymentState::TrafficShifting, None).await?;
        match self.shift_to_candidate(d, req, cancel).await {
            ShiftOutcome::Complete => {}
            ShiftOutcome::Cancelled => {
                let reason = self.cancel_reason(d.id);
                return self.roll_back(d, reason).await;
            }
            ShiftOutcome::Exhausted(e) => return self.require_intervention(d, e).await,
        }

        self.enter(d, DeploymentState::Observing, None).await?;
        let pool = d.candidate_pool.clone().ok_or_else(|| {
            DeployError::InvalidState(format!("Deployment {} has no candidate pool", d.id))
        })?;
        let verdict = self
            .monitor
            .observe(
                d.id,
                &d.service,
                &pool,
                &req.health_check,
                self.settings.observation_window,
                cancel,
            )
            .await;
        d.last_verdict = Some(verdict.clone());

        if cancel.is_cancelled() {
            let reason = self.cancel_reason(d.id);
            return self.roll_back(d, reason).await;
        }

        if !verdict.healthy {
            return self.roll_back(d, verdict.reason).await;
        }
        if !d.can_finalize() {
            let reason = format!("traffic split {} != 100", d.traffic_split);
            return self.roll_back(d, reason).await;
        }
        if !self.claim_finalize(d.id) {
            let reason = self.cancel_reason(d.id);
            return self.roll_back(d, reason).await;
        }

        self.finalize(d, verdict.reason).await
    }

    /// Provisions and attaches the candidate pool; the error is the abort reason
    async fn provision(&self, d: &mut Deployment, req: &DeployRequest) -> Result<(), String> {
        let pool = self
            .provisioner
            .provision_pool(&d.service, d.candidate_color, &d.task_spec)
            .await
            .map_err(|e| format!("provisioning failed: {}", e))?;

        d.candidate_pool = Some(pool.clone());
        self.persist(d).await;

        self.router
            .attach(&d.service, d.candidate_color, &pool)
            .await
            .map_err(|e| format!("attaching candidate pool failed: {}", e))?;
        self.router
            .register_health_check(&d.service, d.candidate_color, &req.health_check)
            .await
            .map_err(|e| format!("registering health check failed: {}", e))?;

        Ok(())
    }

    async fn shift_to_candidate(
        &self,
        d: &mut Deployment,
        req: &DeployRequest,
        cancel: &CancellationToken,
    ) -> ShiftOutcome {
        let pause = match req.shift_policy {
            ShiftPolicy::AllAtOnce => Duration::ZERO,
            ShiftPolicy::Linear {
                step_interval_seconds,
                ..
            } => Duration::from_secs(step_interval_seconds),
        };
        let service = d.service.clone();
        let candidate = d.candidate_color;

        for (i, weight) in req.shift_policy.steps().into_iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return ShiftOutcome::Cancelled,
                    _ = tokio::time::sleep(pause) => {}
                }
            }

            let operation = format!("shift {} to {}={}", service, candidate, weight);
            let shifted = with_retry(&self.settings.retry, &operation, || {
                self.router.shift_traffic(&service, candidate, weight)
            })
            .await;

            match shifted {
                Ok(weights) => {
                    d.traffic_split = weights.weight_of(candidate);
                    info!("Deployment {}: traffic now {}", d.id, weights);
                    self.persist(d).await;
                }
                Err(e) => return ShiftOutcome::Exhausted(e),
            }

            if cancel.is_cancelled() {
                return ShiftOutcome::Cancelled;
            }
        }

        ShiftOutcome::Complete
    }

    async fn finalize(&self, d: &mut Deployment, note: String) -> Result<(), DeployError> {
        self.enter(d, DeploymentState::Finalizing, Some(note)).await?;

        let service = d.service.clone();
        let incumbent = d.incumbent_color;
        let detached = with_retry(&self.settings.retry, "detach incumbent pool", || {
            self.router.detach(&service, incumbent)
        })
        .await;
        if let Err(e) = detached {
            return self.require_intervention(d, e).await;
        }

        if let Some(pool) = d.incumbent_pool.clone() {
            let decommissioned =
                with_retry(&self.settings.retry, "decommission incumbent pool", || {
                    self.provisioner.decommission_pool(&pool)
                })
                .await;
            if let Err(e) = decommissioned {
                return self.require_intervention(d, e).await;
            }
        }

        self.enter(d, DeploymentState::Finalized, None).await
    }

    async fn roll_back(&self, d: &mut Deployment, reason: String) -> Result<(), DeployError> {
        d.rollback_reason = Some(reason.clone());
        self.enter(d, DeploymentState::RollingBack, Some(reason)).await?;

        let service = d.service.clone();
        let incumbent = d.incumbent_color;
        let candidate = d.candidate_color;

        let shifted = with_retry(&self.settings.retry, "restore incumbent traffic", || {
            self.router.shift_traffic(&service, incumbent, 100)
        })
        .await;
        match shifted {
            Ok(weights) => {
                d.traffic_split = weights.weight_of(candidate);
                info!("Deployment {}: traffic restored to {}", d.id, weights);
                self.persist(d).await;
            }
            Err(e) => return self.require_intervention(d, e).await,
        }

        let detached = with_retry(&self.settings.retry, "detach candidate pool", || {
            self.router.detach(&service, candidate)
        })
        .await;
        if let Err(e) = detached {
            return self.require_intervention(d, e).await;
        }

        if let Some(pool) = d.candidate_pool.clone() {
            let decommissioned =
                with_retry(&self.settings.retry, "decommission candidate pool", || {
                    self.provisioner.decommission_pool(&pool)
                })
                .await;
            if let Err(e) = decommissioned {
                return self.require_intervention(d, e).await;
            }
        }

        self.enter(d, DeploymentState::RolledBack, None).await
    }

    /// Pre-shift failure: release whatever was provisioned, leave traffic alone
    async fn abort(&self, d: &mut Deployment, reason: String) -> Result<(), DeployError> {
        warn!("Deployment {}: aborting: {}", d.id, reason);
        let mut reason = reason;

        if let Some(pool) = d.candidate_pool.clone() {
            if let Err(e) = self.router.detach(&d.service, d.candidate_color).await {
                warn!("Deployment {}: detach during abort failed: {}", d.id, e);
            }
            let decommissioned =
                with_retry(&self.settings.retry, "decommission candidate pool", || {
                    self.provisioner.decommission_pool(&pool)
                })
                .await;
            if let Err(e) = decommissioned {
                reason = format!("{}; candidate pool {} may be leaked: {}", reason, pool, e);
            }
        }

        d.abort_reason = Some(reason.clone());
        self.enter(d, DeploymentState::Aborted, Some(reason)).await
    }

    async fn require_intervention(
        &self,
        d: &mut Deployment,
        exhausted: RetryExhausted,
    ) -> Result<(), DeployError> {
        let reason = exhausted.to_string();
        error!(
            "Deployment {}: manual intervention required: {}",
            d.id, reason
        );
        d.abort_reason = Some(reason.clone());
        self.enter(d, DeploymentState::ManualInterventionRequired, Some(reason))
            .await
    }

    async fn enter(
        &self,
        d: &mut Deployment,
        next: DeploymentState,
        note: Option<String>,
    ) -> Result<(), DeployError> {
        let from = d.state;
        d.transition(next, note)?;
        if let Some(signal) = self.cancels.lock().get_mut(&d.id) {
            signal.state = next;
        }
        info!("Deployment {}: {} -> {}", d.id, from, next);
        self.persist(d).await;
        Ok(())
    }

    /// Saves the record; a persistent storage failure does not stop the rollout
    async fn persist(&self, d: &Deployment) {
        let saved = with_retry(&self.settings.retry, "persist deployment", || {
            self.repository.save(d)
        })
        .await;
        if let Err(e) = saved {
            error!("Deployment {}: {}", d.id, e);
        }
    }

    /// Takes Finalizing away from `cancel`; false if a cancel got in first
    fn claim_finalize(&self, id: Uuid) -> bool {
        match self.cancels.lock().get_mut(&id) {
            Some(signal) if signal.token.is_cancelled() => false,
            Some(signal) => {
                signal.state = DeploymentState::Finalizing;
                true
            }
            None => true,
        }
    }

    fn cancel_reason(&self, id: Uuid) -> String {
        let reason = self
            .cancels
            .lock()
            .get(&id)
            .and_then(|s| s.reason.clone())
            .unwrap_or_else(|| "operator request".to_string());
        format!("Cancelled: {}", reason)
    }

    /// Releases the lease of a terminal deployment, promoting the candidate
    /// slot after a successful cutover
    fn settle_lease(&self, d: &Deployment) {
        let mut leases = self.leases.lock();
        let Some(lease) = leases.get_mut(&d.service) else {
            return;
        };
        if lease.in_flight != Some(d.id) {
            return;
        }

        match d.state {
            DeploymentState::Finalized => {
                lease.incumbent_color = d.candidate_color;
                lease.incumbent_pool = d.candidate_pool.clone();
                lease.in_flight = None;
            }
            DeploymentState::RolledBack | DeploymentState::Aborted => lease.in_flight = None,
            _ => {}
        }
    }

    fn release(&self, d: &Deployment) {
        if let Some(lease) = self.leases.lock().get_mut(&d.service) {
            if lease.in_flight == Some(d.id) {
                lease.in_flight = None;
            }
        }
    }
}
