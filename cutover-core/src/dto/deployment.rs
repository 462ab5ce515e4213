//! Deployment DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deployment::{Deployment, DeploymentState};

/// Operator request to cancel an in-flight deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelDeployment {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Operator acknowledgement that traffic was repaired by hand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveDeployment {
    pub note: String,
}

/// Deployment summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub id: Uuid,
    pub service: String,
    pub run_id: Option<Uuid>,
    pub state: DeploymentState,
    pub traffic_split: u8,
    pub image: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Deployment> for DeploymentSummary {
    fn from(deployment: Deployment) -> Self {
        let reason = deployment.failure_reason();
        Self {
            id: deployment.id,
            service: deployment.service,
            run_id: deployment.run_id,
            state: deployment.state,
            traffic_split: deployment.traffic_split,
            image: deployment.task_spec.image,
            reason,
            created_at: deployment.created_at,
            updated_at: deployment.updated_at,
        }
    }
}
