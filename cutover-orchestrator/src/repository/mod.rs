//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository persists one domain record type. Records are stored as
//! JSONB documents alongside a few indexed columns; once a record reaches a
//! terminal status every further write is refused.

pub mod deployment;
pub mod run;

pub use deployment::{DeploymentRepository, InMemoryDeploymentRepository, PgDeploymentRepository};
pub use run::{InMemoryRunRepository, PgRunRepository, RunRepository};

use uuid::Uuid;

/// Repository error type
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored record is terminal and may not change
    #[error("record {0} is terminal and cannot be modified")]
    Immutable(Uuid),
}
