//! Terminal outcomes and their process exit codes

use serde::{Deserialize, Serialize};

/// Why a pipeline run ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Succeeded,
    SourceUnavailable,
    BuildFailed,
    DeploymentRolledBack,
    DeploymentAborted,
    DeploymentInProgress,
    ManualInterventionRequired,
    /// Anything else, e.g. an unreadable artifact or a storage failure
    Failed,
}

impl Outcome {
    /// Exit code used by the operator CLI
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Succeeded => 0,
            Outcome::Failed => 1,
            Outcome::BuildFailed => 2,
            Outcome::DeploymentRolledBack => 3,
            Outcome::DeploymentAborted => 4,
            Outcome::DeploymentInProgress => 5,
            Outcome::SourceUnavailable => 6,
            Outcome::ManualInterventionRequired => 7,
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::Succeeded
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Succeeded => "Succeeded",
            Outcome::SourceUnavailable => "SourceUnavailable",
            Outcome::BuildFailed => "BuildFailed",
            Outcome::DeploymentRolledBack => "DeploymentRolledBack",
            Outcome::DeploymentAborted => "DeploymentAborted",
            Outcome::DeploymentInProgress => "DeploymentInProgress",
            Outcome::ManualInterventionRequired => "ManualInterventionRequired",
            Outcome::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let all = [
            Outcome::Succeeded,
            Outcome::SourceUnavailable,
            Outcome::BuildFailed,
            Outcome::DeploymentRolledBack,
            Outcome::DeploymentAborted,
            Outcome::DeploymentInProgress,
            Outcome::ManualInterventionRequired,
            Outcome::Failed,
        ];
        let mut codes: Vec<u8> = all.iter().map(|o| o.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        assert_eq!(Outcome::Succeeded.exit_code(), 0);
        assert!(all.iter().filter(|o| o.is_success()).count() == 1);
    }
}
