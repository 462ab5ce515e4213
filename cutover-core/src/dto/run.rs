//! Pipeline run DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::outcome::Outcome;
use crate::domain::pipeline::{PipelineRun, RunStatus};

/// Request to trigger a new pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRun {
    pub service: String,
    /// Overrides the service's configured branch
    #[serde(default)]
    pub branch: Option<String>,
}

/// Run summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub service: String,
    pub branch: String,
    pub source_revision: Option<String>,
    pub status: RunStatus,
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<PipelineRun> for RunSummary {
    fn from(run: PipelineRun) -> Self {
        Self {
            id: run.id,
            service: run.service,
            branch: run.branch,
            source_revision: run.source_revision,
            status: run.status,
            outcome: run.outcome,
            created_at: run.created_at,
            finished_at: run.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_conversion() {
        let run = PipelineRun::new("web", "main");
        let summary: RunSummary = run.clone().into();
        assert_eq!(summary.id, run.id);
        assert_eq!(summary.status, RunStatus::Pending);
        assert!(summary.outcome.is_none());
    }

    #[test]
    fn test_trigger_branch_is_optional() {
        let req: TriggerRun = serde_json::from_str(r#"{ "service": "web" }"#).unwrap();
        assert_eq!(req.service, "web");
        assert!(req.branch.is_none());
    }
}
