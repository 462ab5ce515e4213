//! Declarative configuration objects for collaborators
//!
//! Every spec is a plain serde struct with a `validate()` that names the
//! offending field. Unknown fields are rejected so typos in service files
//! surface at start-up instead of silently falling back to defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::traffic::PoolHandle;

/// Validation failure in a configuration object
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {message}")]
pub struct SpecError {
    pub field: String,
    pub message: String,
}

impl SpecError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Build executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSpec {
    /// Build environment image
    pub image: String,
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,
    /// Needed for builds that themselves run a container engine
    #[serde(default)]
    pub privileged: bool,
    /// Program and arguments the build executor runs
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl BuildSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.image.trim().is_empty() {
            return Err(SpecError::invalid("build.image", "cannot be empty"));
        }
        validate_resources("build", self.cpu, self.memory_mib)?;
        if self.command.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(SpecError::invalid("build.command", "program cannot be empty"));
        }
        Ok(())
    }
}

/// Container task to run in a backend pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub image: String,
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,
    #[serde(default = "default_container_port")]
    pub container_port: u16,
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
}

impl TaskSpec {
    /// Copy of this template with the image replaced
    pub fn with_image(&self, image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.image.trim().is_empty() {
            return Err(SpecError::invalid("task.image", "cannot be empty"));
        }
        validate_resources("task", self.cpu, self.memory_mib)?;
        if self.container_port == 0 {
            return Err(SpecError::invalid("task.container_port", "must be non-zero"));
        }
        if self.desired_count == 0 {
            return Err(SpecError::invalid("task.desired_count", "must be at least 1"));
        }
        Ok(())
    }
}

/// Liveness probe attached to a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckSpec {
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Consecutive failed probes that make a failure "sustained"
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl HealthCheckSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        if !self.path.starts_with('/') {
            return Err(SpecError::invalid("health_check.path", "must start with '/'"));
        }
        if self.interval_seconds == 0 {
            return Err(SpecError::invalid(
                "health_check.interval_seconds",
                "must be greater than 0",
            ));
        }
        if self.failure_threshold == 0 {
            return Err(SpecError::invalid(
                "health_check.failure_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            interval_seconds: default_interval_seconds(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// How traffic moves from the incumbent to the candidate pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ShiftPolicy {
    /// A single jump to 100% on the candidate
    #[default]
    AllAtOnce,
    /// Fixed steps with a pause between them, ending at 100%
    Linear {
        step_percent: u8,
        step_interval_seconds: u64,
    },
}

impl ShiftPolicy {
    /// Candidate weights to apply, in order; always ends at 100
    pub fn steps(&self) -> Vec<u8> {
        match *self {
            ShiftPolicy::AllAtOnce => vec![100],
            ShiftPolicy::Linear { step_percent, .. } => {
                let step = step_percent.clamp(1, 100);
                let mut steps: Vec<u8> = (1..)
                    .map(|i: u16| (u16::from(step) * i).min(100) as u8)
                    .take_while(|w| *w < 100)
                    .collect();
                steps.push(100);
                steps
            }
        }
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if let ShiftPolicy::Linear { step_percent, .. } = self {
            if *step_percent == 0 || *step_percent > 100 {
                return Err(SpecError::invalid(
                    "shift_policy.step_percent",
                    "must be between 1 and 100",
                ));
            }
        }
        Ok(())
    }
}

/// A deployment target and everything needed to build and roll it out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    pub name: String,
    /// Source repository URL handed to the source collaborator
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub build: BuildSpec,
    /// Template; the image is replaced by the build output
    pub task: TaskSpec,
    #[serde(default)]
    pub health_check: HealthCheckSpec,
    #[serde(default)]
    pub shift_policy: ShiftPolicy,
    /// Pool already serving the blue slot before the first deployment
    #[serde(default)]
    pub incumbent_pool: Option<PoolHandle>,
}

impl ServiceDefinition {
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::invalid("name", "cannot be empty"));
        }
        if self.name.len() > 255 {
            return Err(SpecError::invalid("name", "is too long (max 255 characters)"));
        }
        if self.repository.trim().is_empty() {
            return Err(SpecError::invalid("repository", "cannot be empty"));
        }
        if self.branch.trim().is_empty() {
            return Err(SpecError::invalid("branch", "cannot be empty"));
        }
        self.build.validate()?;
        self.task.validate()?;
        self.health_check.validate()?;
        self.shift_policy.validate()?;
        Ok(())
    }
}

fn validate_resources(prefix: &str, cpu: u32, memory_mib: u32) -> Result<(), SpecError> {
    if cpu == 0 {
        return Err(SpecError::invalid(format!("{prefix}.cpu"), "must be greater than 0"));
    }
    if memory_mib == 0 {
        return Err(SpecError::invalid(
            format!("{prefix}.memory_mib"),
            "must be greater than 0",
        ));
    }
    Ok(())
}

fn default_cpu() -> u32 {
    256
}

fn default_memory_mib() -> u32 {
    512
}

fn default_container_port() -> u16 {
    80
}

fn default_desired_count() -> u32 {
    1
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_interval_seconds() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_branch() -> String {
    "main".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_json() -> &'static str {
        r#"{
            "name": "hello",
            "repository": "https://github.com/example/hello.git",
            "build": { "image": "amazonlinux:2", "command": ["./build.sh"] },
            "task": { "image": "nginx" }
        }"#
    }

    #[test]
    fn test_service_defaults() {
        let service: ServiceDefinition = serde_json::from_str(service_json()).unwrap();
        assert_eq!(service.branch, "main");
        assert_eq!(service.task.cpu, 256);
        assert_eq!(service.task.memory_mib, 512);
        assert_eq!(service.task.container_port, 80);
        assert_eq!(service.health_check.path, "/");
        assert_eq!(service.shift_policy, ShiftPolicy::AllAtOnce);
        assert!(service.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{ "path": "/", "intervalSeconds": 5 }"#;
        let result: Result<HealthCheckSpec, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_names_field() {
        let mut service: ServiceDefinition = serde_json::from_str(service_json()).unwrap();
        service.health_check.failure_threshold = 0;
        let err = service.validate().unwrap_err();
        assert_eq!(err.field, "health_check.failure_threshold");

        let mut service: ServiceDefinition = serde_json::from_str(service_json()).unwrap();
        service.task.image = " ".to_string();
        assert_eq!(service.validate().unwrap_err().field, "task.image");
    }

    #[test]
    fn test_with_image_keeps_resources() {
        let task = TaskSpec {
            image: "IMAGE1_NAME".to_string(),
            cpu: 512,
            memory_mib: 1024,
            container_port: 8080,
            desired_count: 2,
        };
        let resolved = task.with_image("registry/app:abc123");
        assert_eq!(resolved.image, "registry/app:abc123");
        assert_eq!(resolved.cpu, 512);
        assert_eq!(resolved.container_port, 8080);
    }

    #[test]
    fn test_shift_policy_steps() {
        assert_eq!(ShiftPolicy::AllAtOnce.steps(), vec![100]);
        let linear = ShiftPolicy::Linear {
            step_percent: 30,
            step_interval_seconds: 60,
        };
        assert_eq!(linear.steps(), vec![30, 60, 90, 100]);
        let exact = ShiftPolicy::Linear {
            step_percent: 50,
            step_interval_seconds: 1,
        };
        assert_eq!(exact.steps(), vec![50, 100]);
    }

    #[test]
    fn test_shift_policy_serde() {
        let json = r#"{ "type": "linear", "step_percent": 10, "step_interval_seconds": 30 }"#;
        let policy: ShiftPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(
            policy,
            ShiftPolicy::Linear {
                step_percent: 10,
                step_interval_seconds: 30
            }
        );
        let zero = ShiftPolicy::Linear {
            step_percent: 0,
            step_interval_seconds: 1,
        };
        assert!(zero.validate().is_err());
    }
}
