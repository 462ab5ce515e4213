//! Adapters Module
//!
//! Narrow interfaces to the external collaborators the controllers depend on,
//! plus the concrete implementations shipped with the orchestrator.
//!
//! All collaborators are trait-based so the controllers can be driven by
//! in-memory implementations in tests and local simulations.

pub mod artifact;
pub mod build;
pub mod health;
pub mod provisioner;
pub mod router;
pub mod source;

// Re-export traits
pub use artifact::ArtifactStore;
pub use build::BuildExecutor;
pub use health::HealthSource;
pub use provisioner::PoolProvisioner;
pub use router::TrafficRouter;
pub use source::SourceControl;

// Re-export implementations
pub use artifact::{FsArtifactStore, InMemoryArtifactStore};
pub use build::{CommandBuildExecutor, StaticBuildExecutor};
pub use health::{HttpHealthProbe, ScriptedHealthSource, ScriptedProbe};
pub use provisioner::InMemoryProvisioner;
pub use router::InMemoryTrafficRouter;
pub use source::{GitSource, StaticSource};
