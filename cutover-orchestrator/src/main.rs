use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cutover_orchestrator::adapters::{
    ArtifactStore, CommandBuildExecutor, FsArtifactStore, GitSource, HttpHealthProbe,
    InMemoryArtifactStore, InMemoryProvisioner, InMemoryTrafficRouter,
};
use cutover_orchestrator::api::{self, AppState};
use cutover_orchestrator::config::Config;
use cutover_orchestrator::db;
use cutover_orchestrator::repository::{
    DeploymentRepository, InMemoryDeploymentRepository, InMemoryRunRepository,
    PgDeploymentRepository, PgRunRepository, RunRepository,
};
use cutover_orchestrator::service::{DeploymentController, PipelineController, ServiceCatalog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cutover_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cutover Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    tracing::info!(
        "Collaborator calls retried up to {} attempt(s), at most {:?} of backoff",
        config.retry.max_attempts,
        config.retry.total_backoff()
    );

    let catalog = ServiceCatalog::load(&config.services_file)
        .await
        .with_context(|| {
            format!(
                "Failed to load service catalog from {}",
                config.services_file.display()
            )
        })?;
    tracing::info!("Loaded {} service(s)", catalog.len());
    let catalog = Arc::new(catalog);

    let (runs, deployments): (Arc<dyn RunRepository>, Arc<dyn DeploymentRepository>) =
        match &config.database_url {
            Some(database_url) => {
                tracing::info!("Connecting to database...");
                let pool = db::create_pool(database_url)
                    .await
                    .context("Failed to create database pool")?;
                db::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                tracing::info!("Database connection pool created");
                (
                    Arc::new(PgRunRepository::new(pool.clone())),
                    Arc::new(PgDeploymentRepository::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, state is kept in memory");
                (
                    Arc::new(InMemoryRunRepository::new()),
                    Arc::new(InMemoryDeploymentRepository::new()),
                )
            }
        };

    let artifacts: Arc<dyn ArtifactStore> = match &config.artifact_dir {
        Some(dir) => Arc::new(
            FsArtifactStore::open(dir)
                .await
                .with_context(|| format!("Failed to open artifact store at {}", dir.display()))?,
        ),
        None => Arc::new(InMemoryArtifactStore::new()),
    };

    let mut provisioner = InMemoryProvisioner::new();
    if let Some(template) = &config.pool_endpoint_template {
        provisioner = provisioner.with_endpoint_template(template);
    }
    let health =
        HttpHealthProbe::new(config.probe_timeout).context("Failed to create health probe")?;

    let controller = Arc::new(DeploymentController::new(
        Arc::new(provisioner),
        Arc::new(InMemoryTrafficRouter::new()),
        Arc::new(health),
        deployments,
        config.deploy_settings(),
    ));

    let stranded = controller
        .restore(catalog.iter())
        .await
        .context("Failed to restore service routing")?;
    if !stranded.is_empty() {
        tracing::warn!(
            "{} deployment(s) were in flight at shutdown and need an operator",
            stranded.len()
        );
    }

    let pipeline = Arc::new(PipelineController::new(
        catalog,
        Arc::new(GitSource::new(config.source_timeout)),
        Arc::new(CommandBuildExecutor::new(config.build_timeout)),
        artifacts,
        controller.clone(),
        runs,
        config.retry.clone(),
    ));

    let abandoned = pipeline
        .recover_runs()
        .await
        .context("Failed to recover pipeline runs")?;
    if !abandoned.is_empty() {
        tracing::warn!("{} run(s) were abandoned by the restart", abandoned.len());
    }

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        pipeline,
        deployments: controller,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
