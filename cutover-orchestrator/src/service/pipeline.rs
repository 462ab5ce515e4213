//! Pipeline Controller
//!
//! Runs Source -> Build -> Deploy for one service. Each stage is attempted
//! at most once per run, and the first failure ends the run. The run record
//! is saved at every stage boundary so its progress can be queried while it
//! executes.

use cutover_core::domain::artifact::{ArtifactRef, ImageDefinition};
use cutover_core::domain::deployment::DeploymentState;
use cutover_core::domain::outcome::Outcome;
use cutover_core::domain::pipeline::{PipelineRun, RunStatus, StageName, StageResult};
use cutover_core::domain::retry::RetryPolicy;
use cutover_core::domain::spec::ServiceDefinition;
use cutover_core::dto::run::TriggerRun;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::{ArtifactStore, BuildExecutor, SourceControl};
use crate::repository::{RepositoryError, RunRepository};
use crate::service::catalog::ServiceCatalog;
use crate::service::deployment::{DeployError, DeployRequest, DeploymentController};
use crate::service::retry::with_retry;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("{0}")]
    ValidationError(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Why a stage failed, and what that means for the run
#[derive(Debug)]
struct StageFailure {
    outcome: Outcome,
    reason: String,
}

impl StageFailure {
    fn new(outcome: Outcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: reason.into(),
        }
    }
}

pub struct PipelineController {
    catalog: Arc<ServiceCatalog>,
    source: Arc<dyn SourceControl>,
    builder: Arc<dyn BuildExecutor>,
    artifacts: Arc<dyn ArtifactStore>,
    deployments: Arc<DeploymentController>,
    runs: Arc<dyn RunRepository>,
    retry: RetryPolicy,
}

impl PipelineController {
    pub fn new(
        catalog: Arc<ServiceCatalog>,
        source: Arc<dyn SourceControl>,
        builder: Arc<dyn BuildExecutor>,
        artifacts: Arc<dyn ArtifactStore>,
        deployments: Arc<DeploymentController>,
        runs: Arc<dyn RunRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            catalog,
            source,
            builder,
            artifacts,
            deployments,
            runs,
            retry,
        }
    }

    /// Creates and stores a Pending run
    pub async fn trigger(&self, req: TriggerRun) -> Result<PipelineRun, PipelineError> {
        let service = self
            .catalog
            .get(&req.service)
            .ok_or_else(|| PipelineError::UnknownService(req.service.clone()))?;

        let branch = req.branch.unwrap_or_else(|| service.branch.clone());
        if branch.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "Branch cannot be empty".to_string(),
            ));
        }

        let run = PipelineRun::new(&service.name, branch);
        self.runs.save(&run).await?;

        info!("Run created: {} for {} ({})", run.id, run.service, run.branch);
        Ok(run)
    }

    /// Executes a Pending run to a terminal status
    pub async fn run(&self, mut run: PipelineRun) -> PipelineRun {
        run.status = RunStatus::Running;
        self.persist(&run).await;
        info!("Run {}: started", run.id);

        let result = match self.catalog.get(&run.service).cloned() {
            Some(service) => self.execute_stages(&mut run, &service).await,
            None => Err(StageFailure::new(
                Outcome::Failed,
                format!("unknown service '{}'", run.service),
            )),
        };

        match result {
            Ok(()) => {
                run.status = RunStatus::Succeeded;
                run.outcome = Some(Outcome::Succeeded);
                info!("Run {}: succeeded", run.id);
            }
            Err(failure) => {
                run.status = RunStatus::Failed;
                run.outcome = Some(failure.outcome);
                warn!("Run {}: failed ({}): {}", run.id, failure.outcome, failure.reason);
            }
        }
        run.finished_at = Some(chrono::Utc::now());
        self.persist(&run).await;

        run
    }

    /// [`trigger`](Self::trigger) then [`run`](Self::run)
    pub async fn execute(&self, req: TriggerRun) -> Result<PipelineRun, PipelineError> {
        let run = self.trigger(req).await?;
        Ok(self.run(run).await)
    }

    pub async fn get_run(&self, id: Uuid) -> Result<PipelineRun, PipelineError> {
        self.runs
            .find_by_id(id)
            .await?
            .ok_or(PipelineError::NotFound(id))
    }

    pub async fn list_runs(&self) -> Result<Vec<PipelineRun>, PipelineError> {
        Ok(self.runs.list_all().await?)
    }

    /// Fails every run a previous process left Pending or Running
    ///
    /// A run that had already handed a deployment to the deployment
    /// controller reports ManualInterventionRequired, like the deployment it
    /// left behind. Returns the ids of the runs closed.
    pub async fn recover_runs(&self) -> Result<Vec<Uuid>, PipelineError> {
        let mut recovered = Vec::new();

        for mut run in self.runs.list_all().await? {
            if run.status.is_terminal() {
                continue;
            }

            let deploying = run.stages.last().is_some_and(|stage| {
                stage.stage == StageName::Deploy
                    && !stage.is_complete()
                    && stage.deployment_id.is_some()
            });
            let outcome = if deploying {
                Outcome::ManualInterventionRequired
            } else {
                Outcome::Failed
            };

            let reason = format!("orchestrator restarted while the run was {}", run.status);
            run.abandon(outcome, reason);
            self.runs.save(&run).await?;

            warn!("Run {}: abandoned by restart ({})", run.id, outcome);
            recovered.push(run.id);
        }

        Ok(recovered)
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn execute_stages(
        &self,
        run: &mut PipelineRun,
        service: &ServiceDefinition,
    ) -> Result<(), StageFailure> {
        self.start_stage(run, StageName::Source).await;
        let revision = self
            .source
            .get_snapshot(&service.repository, &run.branch)
            .await
            .map_err(|e| {
                StageFailure::new(Outcome::SourceUnavailable, format!("SourceUnavailable: {}", e))
            });
        if let Ok(revision) = &revision {
            run.source_revision = Some(revision.clone());
        }
        let revision = self.finish_stage(run, revision).await?;

        self.start_stage(run, StageName::Build).await;
        let artifact = self.build(run.id, service, &revision).await;
        if let (Ok(artifact), Some(stage)) = (&artifact, run.stages.last_mut()) {
            stage.artifact_ref = Some(artifact.clone());
        }
        let artifact = self.finish_stage(run, artifact).await?;

        self.start_stage(run, StageName::Deploy).await;
        let deployed = self.deploy(run, service, artifact).await;
        self.finish_stage(run, deployed).await
    }

    async fn start_stage(&self, run: &mut PipelineRun, name: StageName) {
        run.stages.push(StageResult::running(name));
        self.persist(run).await;
        info!("Run {}: {} stage started", run.id, name);
    }

    /// Records the outcome on the current stage and passes it through
    async fn finish_stage<T>(
        &self,
        run: &mut PipelineRun,
        result: Result<T, StageFailure>,
    ) -> Result<T, StageFailure> {
        if let Some(stage) = run.stages.last_mut() {
            match &result {
                Ok(_) => stage.succeed(),
                Err(failure) => stage.fail(failure.reason.clone()),
            }
            info!("Run {}: {} stage {:?}", run.id, stage.stage, stage.status);
        }
        self.persist(run).await;
        result
    }

    async fn build(
        &self,
        run_id: Uuid,
        service: &ServiceDefinition,
        revision: &str,
    ) -> Result<ArtifactRef, StageFailure> {
        let blob = self
            .builder
            .execute(&service.repository, revision, &service.build)
            .await
            .map_err(|e| StageFailure::new(Outcome::BuildFailed, e.to_string()))?;

        let stage_id = format!("{}/{}", run_id, StageName::Build);
        self.artifacts.put(&stage_id, &blob).await.map_err(|e| {
            StageFailure::new(Outcome::Failed, format!("ArtifactStoreUnavailable: {}", e))
        })
    }

    async fn deploy(
        &self,
        run: &mut PipelineRun,
        service: &ServiceDefinition,
        artifact: ArtifactRef,
    ) -> Result<(), StageFailure> {
        let definition = self.read_image_definition(&artifact).await?;

        let mut req =
            DeployRequest::for_service(service, service.task.with_image(definition.image));
        req.run_id = Some(run.id);
        req.artifact_ref = Some(artifact);

        let deployment = self.deployments.begin(&req).await.map_err(|e| match e {
            DeployError::InProgress { .. } => {
                StageFailure::new(Outcome::DeploymentInProgress, e.to_string())
            }
            other => StageFailure::new(Outcome::Failed, other.to_string()),
        })?;

        if let Some(stage) = run.stages.last_mut() {
            stage.deployment_id = Some(deployment.id);
        }
        self.persist(run).await;

        let deployment = self
            .deployments
            .drive(deployment, &req)
            .await
            .map_err(|e| StageFailure::new(Outcome::Failed, e.to_string()))?;

        let reason = deployment.failure_reason().unwrap_or_default();
        match deployment.state {
            DeploymentState::Finalized => Ok(()),
            DeploymentState::RolledBack => {
                Err(StageFailure::new(Outcome::DeploymentRolledBack, reason))
            }
            DeploymentState::Aborted => Err(StageFailure::new(Outcome::DeploymentAborted, reason)),
            DeploymentState::ManualInterventionRequired => Err(StageFailure::new(
                Outcome::ManualInterventionRequired,
                reason,
            )),
            other => Err(StageFailure::new(
                Outcome::Failed,
                format!("deployment stopped in {}", other),
            )),
        }
    }

    async fn read_image_definition(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<ImageDefinition, StageFailure> {
        let blob = self
            .artifacts
            .get(artifact)
            .await
            .map_err(|e| StageFailure::new(Outcome::Failed, format!("ArtifactInvalid: {}", e)))?;

        let definition: ImageDefinition = serde_json::from_slice(&blob).map_err(|e| {
            StageFailure::new(
                Outcome::Failed,
                format!("ArtifactInvalid: {} is not an image definition: {}", artifact, e),
            )
        })?;

        if definition.image.trim().is_empty() {
            return Err(StageFailure::new(
                Outcome::Failed,
                format!("ArtifactInvalid: {} names an empty image", artifact),
            ));
        }

        Ok(definition)
    }

    /// Saves the run; a persistent storage failure does not stop the run
    async fn persist(&self, run: &PipelineRun) {
        let saved = with_retry(&self.retry, "persist run", || self.runs.save(run)).await;
        if let Err(e) = saved {
            error!("Run {}: {}", run.id, e);
        }
    }
}
