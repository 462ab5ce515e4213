//! Source control collaborator
//!
//! Resolves a branch to an immutable revision. Any failure here surfaces to
//! the pipeline as `SourceUnavailable`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Errors from the source collaborator
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("branch '{0}' not found")]
    BranchNotFound(String),
}

/// Source control collaborator
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Returns the revision currently at the tip of `branch`
    async fn get_snapshot(&self, repository: &str, branch: &str) -> Result<String, SourceError>;
}

/// Resolves branches with `git ls-remote`
pub struct GitSource {
    timeout: Duration,
}

impl GitSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl SourceControl for GitSource {
    async fn get_snapshot(&self, repository: &str, branch: &str) -> Result<String, SourceError> {
        let refname = format!("refs/heads/{}", branch);
        debug!("Resolving {} in {}", refname, repository);

        let output = tokio::time::timeout(
            self.timeout,
            Command::new("git")
                .arg("ls-remote")
                .arg(repository)
                .arg(&refname)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SourceError::Unavailable(format!("git ls-remote timed out after {:?}", self.timeout)))?
        .map_err(|e| SourceError::Unavailable(format!("failed to execute git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Unavailable(stderr.trim().to_string()));
        }

        parse_ls_remote(&String::from_utf8_lossy(&output.stdout), &refname)
            .ok_or_else(|| SourceError::BranchNotFound(branch.to_string()))
    }
}

/// Extracts the revision for `refname` from `git ls-remote` output
fn parse_ls_remote(stdout: &str, refname: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let sha = parts.next()?;
        let name = parts.next()?;
        (name == refname && sha.len() == 40 && sha.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| sha.to_string())
    })
}

/// Fixed branch -> revision table, for pinned deployments and simulations
#[derive(Default)]
pub struct StaticSource {
    revisions: Mutex<HashMap<String, String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_revision(self, branch: impl Into<String>, revision: impl Into<String>) -> Self {
        self.revisions.lock().insert(branch.into(), revision.into());
        self
    }
}

#[async_trait]
impl SourceControl for StaticSource {
    async fn get_snapshot(&self, _repository: &str, branch: &str) -> Result<String, SourceError> {
        self.revisions
            .lock()
            .get(branch)
            .cloned()
            .ok_or_else(|| SourceError::BranchNotFound(branch.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";

    #[test]
    fn test_parse_ls_remote() {
        let out = format!(
            "{SHA}\trefs/heads/main\n0000000000000000000000000000000000000000\trefs/heads/mainline\n"
        );
        assert_eq!(parse_ls_remote(&out, "refs/heads/main"), Some(SHA.to_string()));
        assert_eq!(parse_ls_remote(&out, "refs/heads/dev"), None);
        assert_eq!(parse_ls_remote("garbage", "refs/heads/main"), None);
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::new().with_revision("main", SHA);
        assert_eq!(source.get_snapshot("repo", "main").await.unwrap(), SHA);
        assert!(matches!(
            source.get_snapshot("repo", "dev").await,
            Err(SourceError::BranchNotFound(_))
        ));
    }
}
