//! Health observation domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason recorded when an observation window closes without a usable verdict
pub const OBSERVATION_TIMEOUT: &str = "ObservationTimeout";

/// Binary outcome of post-cutover observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub healthy: bool,
    pub reason: String,
    pub observed_at: DateTime<Utc>,
}

impl HealthVerdict {
    pub fn healthy(reason: impl Into<String>) -> Self {
        Self {
            healthy: true,
            reason: reason.into(),
            observed_at: Utc::now(),
        }
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self {
            healthy: false,
            reason: reason.into(),
            observed_at: Utc::now(),
        }
    }

    /// Unhealthy verdict for a window that closed without evidence
    pub fn timed_out() -> Self {
        Self::unhealthy(OBSERVATION_TIMEOUT)
    }

    pub fn is_timeout(&self) -> bool {
        !self.healthy && self.reason == OBSERVATION_TIMEOUT
    }
}

/// A single pass/fail probe result for one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSample {
    pub passed: bool,
    /// Free-form detail, e.g. status code or error rate
    pub detail: String,
    pub observed_at: DateTime<Utc>,
}

impl HealthSample {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
            observed_at: Utc::now(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
            observed_at: Utc::now(),
        }
    }
}
