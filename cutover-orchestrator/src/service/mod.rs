//! Service Module
//!
//! Business logic layer for the orchestrator.
//! The two controllers own the pipeline and deployment state machines; the
//! rest of the module is what they are built from.

pub mod catalog;
pub mod deployment;
pub mod monitor;
pub mod pipeline;
pub mod retry;

pub use catalog::ServiceCatalog;
pub use deployment::{DeployError, DeployRequest, DeploySettings, DeploymentController};
pub use monitor::RollbackMonitor;
pub use pipeline::{PipelineController, PipelineError};
