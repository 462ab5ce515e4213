//! Build executor collaborator
//!
//! Runs a build against a source revision and returns the produced blob.
//! The blob is stored as-is; its format is only interpreted by the Deploy
//! stage.

use async_trait::async_trait;
use cutover_core::domain::artifact::ImageDefinition;
use cutover_core::domain::spec::BuildSpec;
use parking_lot::Mutex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from the build executor
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    /// The build ran and failed; the message is the executor's own output
    #[error("{0}")]
    Failed(String),

    #[error("build timed out after {0:?}")]
    TimedOut(Duration),

    #[error("build executor unavailable: {0}")]
    Unavailable(String),

    #[error("build misconfigured: {0}")]
    Misconfigured(String),
}

/// Build executor collaborator
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// Builds `source_revision` of `repository` and returns the artifact blob
    async fn execute(
        &self,
        repository: &str,
        source_revision: &str,
        spec: &BuildSpec,
    ) -> Result<Vec<u8>, BuildError>;
}

/// Runs `BuildSpec::command` as a local process
///
/// The process receives the revision and build settings through its
/// environment. Its stdout is the artifact; a non-zero exit fails the build
/// with its stderr.
pub struct CommandBuildExecutor {
    timeout: Duration,
}

impl CommandBuildExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl BuildExecutor for CommandBuildExecutor {
    async fn execute(
        &self,
        repository: &str,
        source_revision: &str,
        spec: &BuildSpec,
    ) -> Result<Vec<u8>, BuildError> {
        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| BuildError::Misconfigured("build command is empty".to_string()))?;

        info!("Building {} at {} with {}", repository, source_revision, program);

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&spec.env)
            .env("SOURCE_REPOSITORY", repository)
            .env("SOURCE_REVISION", source_revision)
            .env("BUILD_IMAGE", &spec.image)
            .env("BUILD_CPU", spec.cpu.to_string())
            .env("BUILD_MEMORY_MIB", spec.memory_mib.to_string())
            .env("BUILD_PRIVILEGED", spec.privileged.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| BuildError::TimedOut(self.timeout))?
            .map_err(|e| BuildError::Unavailable(format!("failed to execute '{}': {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("build exited with {}", output.status)
            } else {
                stderr
            };
            return Err(BuildError::Failed(reason));
        }

        debug!("Build produced {} bytes", output.stdout.len());
        Ok(output.stdout)
    }
}

/// Returns a fixed result for every build
///
/// Used for local simulations where no build toolchain is available.
pub struct StaticBuildExecutor {
    result: Result<Vec<u8>, BuildError>,
    builds: Mutex<Vec<String>>,
}

impl StaticBuildExecutor {
    /// Every build succeeds with `{"image": image}`
    pub fn image(image: &str) -> Self {
        let definition = ImageDefinition {
            image: image.to_string(),
        };
        Self::output(serde_json::to_vec(&definition).unwrap_or_default())
    }

    pub fn output(blob: Vec<u8>) -> Self {
        Self {
            result: Ok(blob),
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            result: Err(BuildError::Failed(reason.into())),
            builds: Mutex::new(Vec::new()),
        }
    }

    /// Revisions built so far
    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().clone()
    }
}

#[async_trait]
impl BuildExecutor for StaticBuildExecutor {
    async fn execute(
        &self,
        _repository: &str,
        source_revision: &str,
        _spec: &BuildSpec,
    ) -> Result<Vec<u8>, BuildError> {
        self.builds.lock().push(source_revision.to_string());
        self.result.clone()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec(command: &[&str]) -> BuildSpec {
        BuildSpec {
            image: "amazonlinux:2".to_string(),
            cpu: 256,
            memory_mib: 512,
            privileged: false,
            command: command.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::from([("EXTRA".to_string(), "x".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_stdout_is_artifact() {
        let executor = CommandBuildExecutor::new(Duration::from_secs(10));
        let blob = executor
            .execute(
                "repo",
                "abc123",
                &spec(&["sh", "-c", "printf '%s-%s' \"$SOURCE_REVISION\" \"$EXTRA\""]),
            )
            .await
            .unwrap();
        assert_eq!(blob, b"abc123-x");
    }

    #[tokio::test]
    async fn test_failure_reports_stderr_verbatim() {
        let executor = CommandBuildExecutor::new(Duration::from_secs(10));
        let err = executor
            .execute(
                "repo",
                "abc123",
                &spec(&["sh", "-c", "echo 'error: tests failed' >&2; exit 3"]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "error: tests failed");
    }

    #[tokio::test]
    async fn test_empty_command_is_misconfigured() {
        let executor = CommandBuildExecutor::new(Duration::from_secs(10));
        let err = executor.execute("repo", "abc", &spec(&[])).await.unwrap_err();
        assert!(matches!(err, BuildError::Misconfigured(_)));
    }
}
