//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deployment;
mod run;
mod service;

pub use deployment::DeploymentCommands;
pub use run::RunCommands;
pub use service::ServiceCommands;

use anyhow::Result;
use clap::Subcommand;
use cutover_core::domain::outcome::Outcome;
use std::process::ExitCode;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Deployments
    Deployment {
        #[command(subcommand)]
        command: DeploymentCommands,
    },
    /// Deployment targets
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module and returns the
/// process exit code.
pub async fn handle_command(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Deployment { command } => {
            deployment::handle_deployment_command(command, config).await
        }
        Commands::Service { command } => service::handle_service_command(command, config).await,
    }
}

/// Exit code for a finished run
fn exit_code(outcome: Outcome) -> ExitCode {
    ExitCode::from(outcome.exit_code())
}

/// Print any serializable value as pretty JSON
fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
