//! Pipeline run domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::artifact::ArtifactRef;
use crate::domain::outcome::Outcome;

/// One end-to-end execution of Source -> Build -> Deploy
///
/// Owned exclusively by the pipeline controller. Once `status` is terminal
/// the record is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    /// Deployment target this run builds and deploys
    pub service: String,
    pub branch: String,
    /// Resolved by the Source stage; `None` until it succeeds
    pub source_revision: Option<String>,
    pub stages: Vec<StageResult>,
    pub status: RunStatus,
    /// Set together with a terminal `status`
    pub outcome: Option<Outcome>,
    /// Why the run ended without a stage reporting it, e.g. a restart
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Creates a pending run for a service branch
    pub fn new(service: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            service: service.into(),
            branch: branch.into(),
            source_revision: None,
            stages: Vec::new(),
            status: RunStatus::Pending,
            outcome: None,
            failure_reason: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Result recorded for a stage, if the stage was attempted
    pub fn stage(&self, name: StageName) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Ends a run whose executor is gone
    ///
    /// The stage left open, if any, fails with the same reason.
    pub fn abandon(&mut self, outcome: Outcome, reason: impl Into<String>) {
        let reason = reason.into();
        if let Some(stage) = self.stages.last_mut().filter(|s| !s.is_complete()) {
            stage.fail(reason.clone());
        }
        self.status = RunStatus::Failed;
        self.outcome = Some(outcome);
        self.failure_reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    /// The most recent failed stage, if any
    pub fn failed_stage(&self) -> Option<&StageResult> {
        self.stages
            .iter()
            .rev()
            .find(|s| s.status == StageStatus::Failed)
    }
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "Pending"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Succeeded => write!(f, "Succeeded"),
            RunStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// The three pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageName {
    Source,
    Build,
    Deploy,
}

impl StageName {
    /// All stages in the order they execute
    pub const ORDER: [StageName; 3] = [StageName::Source, StageName::Build, StageName::Deploy];
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageName::Source => write!(f, "Source"),
            StageName::Build => write!(f, "Build"),
            StageName::Deploy => write!(f, "Deploy"),
        }
    }
}

/// Status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Result appended to a run by the stage that executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub status: StageStatus,
    pub artifact_ref: Option<ArtifactRef>,
    /// Set on the Deploy stage once a deployment has been created
    pub deployment_id: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageResult {
    /// Starts a stage now
    pub fn running(stage: StageName) -> Self {
        Self {
            stage,
            status: StageStatus::Running,
            artifact_ref: None,
            deployment_id: None,
            failure_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn succeed(&mut self) {
        self.status = StageStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, StageStatus::Succeeded | StageStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_pending() {
        let run = PipelineRun::new("web", "main");
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.stages.is_empty());
        assert!(run.source_revision.is_none());
        assert!(!run.status.is_terminal());
    }

    #[test]
    fn test_stage_lookup_and_failed_stage() {
        let mut run = PipelineRun::new("web", "main");

        let mut source = StageResult::running(StageName::Source);
        source.succeed();
        run.stages.push(source);

        let mut build = StageResult::running(StageName::Build);
        build.fail("compile error");
        run.stages.push(build);

        assert!(run.stage(StageName::Deploy).is_none());
        let failed = run.failed_stage().unwrap();
        assert_eq!(failed.stage, StageName::Build);
        assert_eq!(failed.failure_reason.as_deref(), Some("compile error"));
        assert!(failed.is_complete());
    }

    #[test]
    fn test_abandon_fails_open_stage() {
        let mut run = PipelineRun::new("web", "main");
        let mut source = StageResult::running(StageName::Source);
        source.succeed();
        run.stages.push(source);
        run.stages.push(StageResult::running(StageName::Build));
        run.status = RunStatus::Running;

        run.abandon(Outcome::Failed, "orchestrator restarted");

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.outcome, Some(Outcome::Failed));
        assert_eq!(run.failure_reason.as_deref(), Some("orchestrator restarted"));
        assert!(run.finished_at.is_some());
        assert_eq!(run.stages[0].status, StageStatus::Succeeded);
        let build = run.failed_stage().unwrap();
        assert_eq!(build.stage, StageName::Build);
        assert_eq!(build.failure_reason.as_deref(), Some("orchestrator restarted"));
    }

    #[test]
    fn test_run_without_failure_reason_deserializes() {
        let mut value = serde_json::to_value(PipelineRun::new("web", "main")).unwrap();
        value.as_object_mut().unwrap().remove("failure_reason");
        let run: PipelineRun = serde_json::from_value(value).unwrap();
        assert!(run.failure_reason.is_none());
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            StageName::ORDER,
            [StageName::Source, StageName::Build, StageName::Deploy]
        );
    }
}
