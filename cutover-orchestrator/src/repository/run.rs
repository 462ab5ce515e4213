//! Pipeline Run Repository
//!
//! Handles persistence of pipeline runs.

use async_trait::async_trait;
use cutover_core::domain::pipeline::PipelineRun;
use parking_lot::RwLock;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::RepositoryError;

#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Inserts or replaces a run; fails if the stored copy is terminal
    async fn save(&self, run: &PipelineRun) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PipelineRun>, RepositoryError>;

    /// All runs, newest first
    async fn list_all(&self) -> Result<Vec<PipelineRun>, RepositoryError>;
}

/// Postgres-backed run repository
pub struct PgRunRepository {
    pool: PgPool,
}

impl PgRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    body: serde_json::Value,
}

impl TryFrom<RunRow> for PipelineRun {
    type Error = RepositoryError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(row.body)?)
    }
}

#[async_trait]
impl RunRepository for PgRunRepository {
    async fn save(&self, run: &PipelineRun) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(run)?;

        let result = sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, service, status, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status, body = EXCLUDED.body, updated_at = NOW()
            WHERE pipeline_runs.status NOT IN ('Succeeded', 'Failed')
            "#,
        )
        .bind(run.id)
        .bind(&run.service)
        .bind(run.status.to_string())
        .bind(body)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Immutable(run.id));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PipelineRun>, RepositoryError> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT body
            FROM pipeline_runs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PipelineRun::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<PipelineRun>, RepositoryError> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT body
            FROM pipeline_runs
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PipelineRun::try_from).collect()
    }
}

/// Run repository held in process memory
#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: RwLock<HashMap<Uuid, PipelineRun>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn save(&self, run: &PipelineRun) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write();
        if runs.get(&run.id).is_some_and(|r| r.status.is_terminal()) {
            return Err(RepositoryError::Immutable(run.id));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PipelineRun>, RepositoryError> {
        Ok(self.runs.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<PipelineRun>, RepositoryError> {
        let mut runs: Vec<PipelineRun> = self.runs.read().values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_core::domain::pipeline::RunStatus;

    #[tokio::test]
    async fn test_terminal_run_is_frozen() {
        let repo = InMemoryRunRepository::new();
        let mut run = PipelineRun::new("web", "main");
        repo.save(&run).await.unwrap();

        run.status = RunStatus::Running;
        repo.save(&run).await.unwrap();

        run.status = RunStatus::Failed;
        repo.save(&run).await.unwrap();

        run.status = RunStatus::Succeeded;
        assert!(matches!(
            repo.save(&run).await,
            Err(RepositoryError::Immutable(id)) if id == run.id
        ));
        let stored = repo.find_by_id(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = InMemoryRunRepository::new();
        let mut older = PipelineRun::new("web", "main");
        older.created_at -= chrono::Duration::minutes(5);
        let newer = PipelineRun::new("web", "main");
        repo.save(&older).await.unwrap();
        repo.save(&newer).await.unwrap();

        let ids: Vec<Uuid> = repo.list_all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
