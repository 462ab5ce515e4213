//! Deployment Repository
//!
//! Handles persistence of deployment records. Terminal deployments are kept
//! for audit only.

use async_trait::async_trait;
use cutover_core::domain::deployment::Deployment;
use parking_lot::RwLock;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::RepositoryError;

#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    /// Inserts or replaces a deployment; fails if the stored copy is terminal
    async fn save(&self, deployment: &Deployment) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Deployment>, RepositoryError>;

    /// All deployments, newest first
    async fn list_all(&self) -> Result<Vec<Deployment>, RepositoryError>;
}

/// Postgres-backed deployment repository
pub struct PgDeploymentRepository {
    pool: PgPool,
}

impl PgDeploymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    body: serde_json::Value,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = RepositoryError;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(row.body)?)
    }
}

#[async_trait]
impl DeploymentRepository for PgDeploymentRepository {
    async fn save(&self, deployment: &Deployment) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(deployment)?;

        let result = sqlx::query(
            r#"
            INSERT INTO deployments (id, service, run_id, state, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state, body = EXCLUDED.body, updated_at = EXCLUDED.updated_at
            WHERE deployments.state NOT IN ('Finalized', 'RolledBack', 'Aborted')
            "#,
        )
        .bind(deployment.id)
        .bind(&deployment.service)
        .bind(deployment.run_id)
        .bind(deployment.state.to_string())
        .bind(body)
        .bind(deployment.created_at)
        .bind(deployment.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Immutable(deployment.id));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Deployment>, RepositoryError> {
        let row = sqlx::query_as::<_, DeploymentRow>(
            r#"
            SELECT body
            FROM deployments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Deployment::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Deployment>, RepositoryError> {
        let rows = sqlx::query_as::<_, DeploymentRow>(
            r#"
            SELECT body
            FROM deployments
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Deployment::try_from).collect()
    }
}

/// Deployment repository held in process memory
#[derive(Default)]
pub struct InMemoryDeploymentRepository {
    deployments: RwLock<HashMap<Uuid, Deployment>>,
}

impl InMemoryDeploymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentRepository for InMemoryDeploymentRepository {
    async fn save(&self, deployment: &Deployment) -> Result<(), RepositoryError> {
        let mut deployments = self.deployments.write();
        if deployments
            .get(&deployment.id)
            .is_some_and(|d| d.state.is_terminal())
        {
            return Err(RepositoryError::Immutable(deployment.id));
        }
        deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Deployment>, RepositoryError> {
        Ok(self.deployments.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Deployment>, RepositoryError> {
        let mut deployments: Vec<Deployment> =
            self.deployments.read().values().cloned().collect();
        deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deployments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_core::domain::deployment::DeploymentState;
    use cutover_core::domain::spec::TaskSpec;
    use cutover_core::domain::traffic::PoolColor;

    fn deployment() -> Deployment {
        let task = TaskSpec {
            image: "nginx".to_string(),
            cpu: 256,
            memory_mib: 512,
            container_port: 80,
            desired_count: 1,
        };
        Deployment::new("web", task, PoolColor::Blue, None)
    }

    #[tokio::test]
    async fn test_terminal_deployment_is_frozen() {
        let repo = InMemoryDeploymentRepository::new();
        let mut d = deployment();
        repo.save(&d).await.unwrap();

        d.transition(DeploymentState::Aborted, Some("capacity".to_string()))
            .unwrap();
        repo.save(&d).await.unwrap();

        d.abort_reason = Some("rewritten".to_string());
        assert!(matches!(
            repo.save(&d).await,
            Err(RepositoryError::Immutable(_))
        ));
        let stored = repo.find_by_id(d.id).await.unwrap().unwrap();
        assert_eq!(stored.state, DeploymentState::Aborted);
        assert!(stored.abort_reason.is_none());
    }

    #[tokio::test]
    async fn test_find_missing() {
        let repo = InMemoryDeploymentRepository::new();
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(repo.list_all().await.unwrap().is_empty());
    }
}
