//! Artifact store
//!
//! Content-addressed handoff of build outputs between stages. References are
//! the sha256 of the content, so a reference can never resolve to different
//! bytes than the ones that produced it. There is no delete: retention is an
//! external concern.

use async_trait::async_trait;
use cutover_core::domain::artifact::ArtifactRef;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Errors from the artifact store
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact {0} not found")]
    NotFound(ArtifactRef),

    #[error("artifact {0} is corrupted: content hash mismatch")]
    Corrupted(ArtifactRef),

    #[error("artifact storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-addressed blob store
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores `blob`, recording `stage_id` as its producer
    async fn put(&self, stage_id: &str, blob: &[u8]) -> Result<ArtifactRef, ArtifactError>;

    /// Returns the exact bytes behind `artifact`
    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError>;
}

/// Computes the content address of a blob
pub fn content_ref(blob: &[u8]) -> ArtifactRef {
    ArtifactRef::from_sha256(Sha256::digest(blob).into())
}

/// In-process artifact store
#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<ArtifactRef, Vec<u8>>>,
    producers: Mutex<HashMap<ArtifactRef, Vec<String>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage ids that have put this artifact
    pub fn producers(&self, artifact: &ArtifactRef) -> Vec<String> {
        self.producers.lock().get(artifact).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, stage_id: &str, blob: &[u8]) -> Result<ArtifactRef, ArtifactError> {
        let artifact = content_ref(blob);

        self.blobs
            .lock()
            .entry(artifact.clone())
            .or_insert_with(|| blob.to_vec());
        self.producers
            .lock()
            .entry(artifact.clone())
            .or_default()
            .push(stage_id.to_string());

        debug!("Stored artifact {} from {}", artifact, stage_id);
        Ok(artifact)
    }

    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError> {
        self.blobs
            .lock()
            .get(artifact)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(artifact.clone()))
    }
}

/// Artifact store backed by a directory of content-addressed files
///
/// Blobs are written to a temporary file and renamed into place, so a
/// reader never observes a partially written artifact.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates the store, creating `root` if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        self.root.join(artifact.digest())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, stage_id: &str, blob: &[u8]) -> Result<ArtifactRef, ArtifactError> {
        let artifact = content_ref(blob);
        let path = self.path_for(&artifact);

        if tokio::fs::try_exists(&path).await? {
            debug!("Artifact {} already stored, skipping write", artifact);
            return Ok(artifact);
        }

        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", artifact.digest(), uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;

        info!("Stored artifact {} ({} bytes) from {}", artifact, blob.len(), stage_id);
        Ok(artifact)
    }

    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError> {
        let blob = match tokio::fs::read(self.path_for(artifact)).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(artifact.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if content_ref(&blob) != *artifact {
            return Err(ArtifactError::Corrupted(artifact.clone()));
        }

        Ok(blob)
    }
}
