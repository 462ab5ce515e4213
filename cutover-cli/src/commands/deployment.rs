//! Deployment command handlers
//!
//! Inspecting deployments and the two operator actions on them.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use cutover_client::OrchestratorClient;
use cutover_core::domain::deployment::{Deployment, DeploymentState};
use cutover_core::dto::deployment::DeploymentSummary;
use std::process::ExitCode;

use super::print_json;
use crate::config::Config;
use crate::id_resolver::resolve_deployment_id;
use crate::types::IdOrPrefix;

/// Deployment subcommands
#[derive(Subcommand)]
pub enum DeploymentCommands {
    /// List all deployments
    List,
    /// Get deployment details
    Get {
        /// Deployment ID or unambiguous prefix
        id: String,

        /// Print the raw deployment as JSON
        #[arg(long)]
        json: bool,
    },
    /// Roll an in-flight deployment back to the incumbent
    Cancel {
        /// Deployment ID or unambiguous prefix
        id: String,

        /// Recorded in the rollback reason
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Close a deployment that needed manual intervention
    Resolve {
        /// Deployment ID or unambiguous prefix
        id: String,

        /// What was done to repair traffic
        #[arg(short, long)]
        note: String,
    },
}

/// Handle deployment commands
pub async fn handle_deployment_command(
    command: DeploymentCommands,
    config: &Config,
) -> Result<ExitCode> {
    let client = config.client();

    match command {
        DeploymentCommands::List => list_deployments(&client).await,
        DeploymentCommands::Get { id, json } => get_deployment(&client, &id, json).await,
        DeploymentCommands::Cancel { id, reason } => {
            cancel_deployment(&client, &id, reason).await
        }
        DeploymentCommands::Resolve { id, note } => resolve_deployment(&client, &id, note).await,
    }
}

/// List all deployments
async fn list_deployments(client: &OrchestratorClient) -> Result<ExitCode> {
    let deployments = client.list_deployments().await?;

    if deployments.is_empty() {
        println!("{}", "No deployments found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} deployment(s):", deployments.len()).bold()
        );
        println!();
        for deployment in deployments {
            print_deployment_summary(&deployment);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Get and display a single deployment
async fn get_deployment(client: &OrchestratorClient, id: &str, json: bool) -> Result<ExitCode> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_deployment_id(client, &id_or_prefix).await?;

    let deployment = client.get_deployment(uuid).await?;

    if json {
        print_json(&deployment)?;
    } else {
        print_deployment_details(&deployment);
    }

    Ok(ExitCode::SUCCESS)
}

/// Request a rollback of an in-flight deployment
async fn cancel_deployment(
    client: &OrchestratorClient,
    id: &str,
    reason: Option<String>,
) -> Result<ExitCode> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_deployment_id(client, &id_or_prefix).await?;

    let deployment = client.cancel_deployment(uuid, reason).await?;

    println!("{}", "✓ Cancellation requested!".green().bold());
    println!("  Deployment: {}", deployment.id.to_string().cyan());
    println!(
        "  State:      {} {}",
        colorize_state(deployment.state),
        "(rolling back to the incumbent)".dimmed()
    );

    Ok(ExitCode::SUCCESS)
}

/// Close a deployment after manual repair
async fn resolve_deployment(client: &OrchestratorClient, id: &str, note: String) -> Result<ExitCode> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_deployment_id(client, &id_or_prefix).await?;

    let deployment = client.resolve_deployment(uuid, note).await?;

    println!(
        "{}",
        format!("✓ Deployment {} resolved.", deployment.id)
            .green()
            .bold()
    );
    println!("  State: {}", colorize_state(deployment.state));

    Ok(ExitCode::SUCCESS)
}

/// Colorize deployment state
fn colorize_state(state: DeploymentState) -> ColoredString {
    let s = state.to_string();
    match state {
        DeploymentState::Finalized => s.green(),
        DeploymentState::RolledBack | DeploymentState::Aborted => s.red(),
        DeploymentState::ManualInterventionRequired => s.red().bold(),
        DeploymentState::RollingBack => s.yellow(),
        _ => s.blue(),
    }
}

/// Print a deployment summary
fn print_deployment_summary(deployment: &DeploymentSummary) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        deployment.service.bold(),
        colorize_state(deployment.state)
    );
    println!("    ID:      {}", deployment.id.to_string().dimmed());
    println!("    Image:   {}", deployment.image.dimmed());
    println!(
        "    Traffic: {}",
        format!("{}% on candidate", deployment.traffic_split).dimmed()
    );
    if let Some(reason) = &deployment.reason {
        println!("    Reason:  {}", reason.red());
    }
    println!(
        "    Updated: {}",
        deployment
            .updated_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

/// Print detailed deployment information
fn print_deployment_details(deployment: &Deployment) {
    println!("{}", "Deployment Details:".bold());
    println!("  ID:        {}", deployment.id.to_string().cyan());
    println!("  Service:   {}", deployment.service.bold());
    if let Some(run_id) = deployment.run_id {
        println!("  Run:       {}", run_id);
    }
    println!("  State:     {}", colorize_state(deployment.state));
    println!("  Image:     {}", deployment.task_spec.image);
    if let Some(artifact) = &deployment.artifact_ref {
        println!("  Artifact:  {}", artifact);
    }
    println!(
        "  Incumbent: {} {}",
        deployment.incumbent_color,
        deployment
            .incumbent_pool
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "(none)".to_string())
            .dimmed()
    );
    println!(
        "  Candidate: {} {}",
        deployment.candidate_color,
        deployment
            .candidate_pool
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "(not provisioned)".to_string())
            .dimmed()
    );
    println!("  Traffic:   {}% on candidate", deployment.traffic_split);
    if let Some(verdict) = &deployment.last_verdict {
        let label = if verdict.healthy {
            "healthy".green()
        } else {
            "unhealthy".red()
        };
        println!("  Verdict:   {} ({})", label, verdict.reason);
    }
    if let Some(reason) = deployment.failure_reason() {
        println!("  Reason:    {}", reason.red());
    }

    println!("\n{}", "History:".bold());
    for transition in &deployment.transitions {
        println!(
            "  {} {}{}",
            transition
                .at
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed(),
            colorize_state(transition.state),
            transition
                .note
                .as_ref()
                .map(|n| format!(" - {}", n))
                .unwrap_or_default()
        );
    }
}
