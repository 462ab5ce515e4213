//! Deployment domain types
//!
//! A deployment is one blue/green cutover attempt. The state machine is:
//!
//! ```text
//! Provisioning -> TrafficShifting -> Observing -> Finalizing  -> Finalized
//!                                             \-> RollingBack -> RolledBack
//! any non-terminal state --(provisioning error)--> Aborted
//! TrafficShifting | Finalizing | RollingBack --(retries exhausted)--> ManualInterventionRequired
//! ManualInterventionRequired --(operator resolve)--> Aborted
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::artifact::ArtifactRef;
use crate::domain::health::HealthVerdict;
use crate::domain::spec::TaskSpec;
use crate::domain::traffic::{PoolColor, PoolHandle};

/// Deployment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentState {
    Provisioning,
    TrafficShifting,
    Observing,
    Finalizing,
    RollingBack,
    Finalized,
    RolledBack,
    Aborted,
    /// Traffic state is ambiguous; automation has stopped
    ManualInterventionRequired,
}

impl DeploymentState {
    /// Finalized, RolledBack or Aborted
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentState::Finalized | DeploymentState::RolledBack | DeploymentState::Aborted
        )
    }

    /// States in which an operator cancel is honoured
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            DeploymentState::Provisioning
                | DeploymentState::TrafficShifting
                | DeploymentState::Observing
        )
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(self, next: DeploymentState) -> bool {
        use DeploymentState::*;

        match (self, next) {
            (Provisioning, TrafficShifting | RollingBack | Aborted) => true,
            (TrafficShifting, Observing | RollingBack | ManualInterventionRequired) => true,
            (Observing, Finalizing | RollingBack) => true,
            (Finalizing, Finalized | ManualInterventionRequired) => true,
            (RollingBack, RolledBack | ManualInterventionRequired) => true,
            (ManualInterventionRequired, Aborted) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentState::Provisioning => "Provisioning",
            DeploymentState::TrafficShifting => "TrafficShifting",
            DeploymentState::Observing => "Observing",
            DeploymentState::Finalizing => "Finalizing",
            DeploymentState::RollingBack => "RollingBack",
            DeploymentState::Finalized => "Finalized",
            DeploymentState::RolledBack => "RolledBack",
            DeploymentState::Aborted => "Aborted",
            DeploymentState::ManualInterventionRequired => "ManualInterventionRequired",
        };
        write!(f, "{}", s)
    }
}

/// One entry in a deployment's audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: DeploymentState,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// One blue/green cutover attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub service: String,
    /// Pipeline run that requested this deployment, if any
    pub run_id: Option<Uuid>,
    pub artifact_ref: Option<ArtifactRef>,
    pub task_spec: TaskSpec,
    pub state: DeploymentState,
    /// Slot serving traffic when the deployment started (the blue role)
    pub incumbent_color: PoolColor,
    pub incumbent_pool: Option<PoolHandle>,
    /// Slot receiving the new version (the green role)
    pub candidate_color: PoolColor,
    pub candidate_pool: Option<PoolHandle>,
    /// Weight on the candidate slot, 0-100
    pub traffic_split: u8,
    pub last_verdict: Option<HealthVerdict>,
    pub rollback_reason: Option<String>,
    pub abort_reason: Option<String>,
    pub transitions: Vec<StateTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Creates a deployment in Provisioning
    pub fn new(
        service: impl Into<String>,
        task_spec: TaskSpec,
        incumbent_color: PoolColor,
        incumbent_pool: Option<PoolHandle>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service: service.into(),
            run_id: None,
            artifact_ref: None,
            task_spec,
            state: DeploymentState::Provisioning,
            incumbent_color,
            incumbent_pool,
            candidate_color: incumbent_color.other(),
            candidate_pool: None,
            traffic_split: 0,
            last_verdict: None,
            rollback_reason: None,
            abort_reason: None,
            transitions: vec![StateTransition {
                state: DeploymentState::Provisioning,
                at: now,
                note: None,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves to `next`, appending to the audit trail
    pub fn transition(
        &mut self,
        next: DeploymentState,
        note: Option<String>,
    ) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let now = Utc::now();
        self.state = next;
        self.updated_at = now;
        self.transitions.push(StateTransition {
            state: next,
            at: now,
            note,
        });
        Ok(())
    }

    /// True once the deployment has ended with its candidate serving
    ///
    /// Finalized deployments always do. An operator-resolved deployment does
    /// when all traffic was left on the candidate.
    pub fn candidate_promoted(&self) -> bool {
        match self.state {
            DeploymentState::Finalized => true,
            DeploymentState::Aborted => self.traffic_split == 100,
            _ => false,
        }
    }

    /// Parks a deployment whose driver is gone in ManualInterventionRequired
    ///
    /// Outside the normal transition table: any in-flight state may be
    /// stranded since its traffic split can no longer be trusted.
    pub fn strand(&mut self, reason: impl Into<String>) -> Result<(), InvalidTransition> {
        let next = DeploymentState::ManualInterventionRequired;
        if self.state.is_terminal() || self.state == next {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let reason = reason.into();
        let now = Utc::now();
        self.state = next;
        self.updated_at = now;
        self.abort_reason = Some(reason.clone());
        self.transitions.push(StateTransition {
            state: next,
            at: now,
            note: Some(reason),
        });
        Ok(())
    }

    /// Finalizing is only allowed with all traffic on the candidate and a
    /// healthy most recent verdict
    pub fn can_finalize(&self) -> bool {
        self.traffic_split == 100 && self.last_verdict.as_ref().is_some_and(|v| v.healthy)
    }

    /// Human-readable reason for a non-successful outcome
    pub fn failure_reason(&self) -> Option<String> {
        match self.state {
            DeploymentState::RolledBack => Some(format!(
                "deployment rolled back: {}",
                self.rollback_reason.as_deref().unwrap_or("unknown reason")
            )),
            DeploymentState::Aborted | DeploymentState::ManualInterventionRequired => {
                Some(format!(
                    "deployment {}: {}",
                    if self.state == DeploymentState::Aborted {
                        "aborted"
                    } else {
                        "requires manual intervention"
                    },
                    self.abort_reason.as_deref().unwrap_or("unknown reason")
                ))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid deployment transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: DeploymentState,
    pub to: DeploymentState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> TaskSpec {
        TaskSpec {
            image: "nginx".to_string(),
            cpu: 256,
            memory_mib: 512,
            container_port: 80,
            desired_count: 1,
        }
    }

    #[test]
    fn test_new_deployment_targets_other_slot() {
        let d = Deployment::new("web", task(), PoolColor::Green, None);
        assert_eq!(d.state, DeploymentState::Provisioning);
        assert_eq!(d.candidate_color, PoolColor::Blue);
        assert_eq!(d.traffic_split, 0);
        assert_eq!(d.transitions.len(), 1);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut d = Deployment::new("web", task(), PoolColor::Blue, None);
        d.transition(DeploymentState::TrafficShifting, None).unwrap();
        d.transition(DeploymentState::Observing, None).unwrap();
        d.transition(DeploymentState::Finalizing, None).unwrap();
        d.transition(DeploymentState::Finalized, None).unwrap();
        assert!(d.state.is_terminal());
        assert_eq!(d.transitions.len(), 5);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut d = Deployment::new("web", task(), PoolColor::Blue, None);
        let err = d.transition(DeploymentState::Finalized, None).unwrap_err();
        assert_eq!(err.from, DeploymentState::Provisioning);

        // Observing must never be skipped on the way to Finalizing
        d.transition(DeploymentState::TrafficShifting, None).unwrap();
        assert!(d.transition(DeploymentState::Finalizing, None).is_err());

        // Terminal states are final
        assert!(!DeploymentState::RolledBack.can_transition_to(DeploymentState::Provisioning));
        assert!(!DeploymentState::Aborted.can_transition_to(DeploymentState::RollingBack));
    }

    #[test]
    fn test_manual_intervention_is_not_terminal() {
        assert!(!DeploymentState::ManualInterventionRequired.is_terminal());
        assert!(!DeploymentState::ManualInterventionRequired.is_cancellable());
        assert!(
            DeploymentState::ManualInterventionRequired.can_transition_to(DeploymentState::Aborted)
        );
    }

    #[test]
    fn test_can_finalize_requires_full_split_and_healthy_verdict() {
        let mut d = Deployment::new("web", task(), PoolColor::Blue, None);
        assert!(!d.can_finalize());

        d.traffic_split = 100;
        assert!(!d.can_finalize());

        d.last_verdict = Some(HealthVerdict::unhealthy("5xx spike"));
        assert!(!d.can_finalize());

        d.last_verdict = Some(HealthVerdict::healthy("ok"));
        assert!(d.can_finalize());

        d.traffic_split = 90;
        assert!(!d.can_finalize());
    }

    #[test]
    fn test_candidate_promoted() {
        let mut d = Deployment::new("web", task(), PoolColor::Blue, None);
        d.traffic_split = 100;
        assert!(!d.candidate_promoted());

        d.transition(DeploymentState::Aborted, None).unwrap();
        assert!(d.candidate_promoted());

        d.traffic_split = 0;
        assert!(!d.candidate_promoted());
    }

    #[test]
    fn test_strand_parks_in_flight_deployments() {
        let mut d = Deployment::new("web", task(), PoolColor::Blue, None);
        d.transition(DeploymentState::TrafficShifting, None).unwrap();
        d.strand("orchestrator restarted").unwrap();

        assert_eq!(d.state, DeploymentState::ManualInterventionRequired);
        assert_eq!(d.abort_reason.as_deref(), Some("orchestrator restarted"));
        assert_eq!(d.transitions.len(), 3);
        assert!(d.strand("again").is_err());

        let mut done = Deployment::new("web", task(), PoolColor::Blue, None);
        done.transition(DeploymentState::Aborted, None).unwrap();
        assert!(done.strand("orchestrator restarted").is_err());
        assert_eq!(done.state, DeploymentState::Aborted);
    }

    #[test]
    fn test_failure_reason() {
        let mut d = Deployment::new("web", task(), PoolColor::Blue, None);
        assert!(d.failure_reason().is_none());

        d.state = DeploymentState::RolledBack;
        d.rollback_reason = Some("5xx spike".to_string());
        assert_eq!(
            d.failure_reason().unwrap(),
            "deployment rolled back: 5xx spike"
        );
    }
}
