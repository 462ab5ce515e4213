//! Run command handlers
//!
//! Triggering pipeline runs and inspecting their stages.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use cutover_client::OrchestratorClient;
use cutover_core::domain::outcome::Outcome;
use cutover_core::domain::pipeline::{PipelineRun, RunStatus, StageResult, StageStatus};
use cutover_core::dto::run::{RunSummary, TriggerRun};
use std::process::ExitCode;
use std::time::Duration;

use super::{exit_code, print_json};
use crate::config::Config;
use crate::id_resolver::resolve_run_id;
use crate::types::IdOrPrefix;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Trigger a run for a service
    Trigger {
        /// Service name
        service: String,

        /// Branch to build instead of the service's configured branch
        #[arg(short, long)]
        branch: Option<String>,

        /// Wait for the run to finish and exit with its outcome
        #[arg(short, long)]
        wait: bool,

        /// Seconds between status polls while waiting
        #[arg(long, default_value = "5")]
        poll_interval: u64,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List all runs
    List,
    /// Get run details; exits with the run's outcome when it has finished
    Get {
        /// Run ID or unambiguous prefix
        id: String,

        /// Print the raw run as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<ExitCode> {
    let client = config.client();

    match command {
        RunCommands::Trigger {
            service,
            branch,
            wait,
            poll_interval,
            timeout,
        } => {
            trigger_run(
                &client,
                service,
                branch,
                wait.then(|| {
                    (
                        Duration::from_secs(poll_interval.max(1)),
                        timeout.map(Duration::from_secs),
                    )
                }),
            )
            .await
        }
        RunCommands::List => list_runs(&client).await,
        RunCommands::Get { id, json } => get_run(&client, &id, json).await,
    }
}

/// Trigger a run, optionally waiting for its outcome
async fn trigger_run(
    client: &OrchestratorClient,
    service: String,
    branch: Option<String>,
    wait: Option<(Duration, Option<Duration>)>,
) -> Result<ExitCode> {
    let run = client.trigger_run(TriggerRun { service, branch }).await?;

    println!("{}", "✓ Run triggered successfully!".green().bold());
    println!("  Run ID:  {}", run.id.to_string().cyan());
    println!("  Service: {}", run.service.bold());
    println!("  Branch:  {}", run.branch.dimmed());

    let Some((poll_interval, timeout)) = wait else {
        return Ok(ExitCode::SUCCESS);
    };

    println!();
    println!("{}", "Waiting for run to finish...".dimmed());
    let run = client.wait_for_run(run.id, poll_interval, timeout).await?;

    println!();
    print_run_details(&run);
    Ok(run.outcome.map(exit_code).unwrap_or(ExitCode::FAILURE))
}

/// List all runs
async fn list_runs(client: &OrchestratorClient) -> Result<ExitCode> {
    let runs = client.list_runs().await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in runs {
            print_run_summary(&run);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Get and display a single run
async fn get_run(client: &OrchestratorClient, id: &str, json: bool) -> Result<ExitCode> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_run_id(client, &id_or_prefix).await?;

    let run = client.get_run(uuid).await?;

    if json {
        print_json(&run)?;
    } else {
        print_run_details(&run);
    }

    Ok(run.outcome.map(exit_code).unwrap_or(ExitCode::SUCCESS))
}

/// Colorize run status
fn colorize_status(status: RunStatus) -> ColoredString {
    let s = status.to_string();
    match status {
        RunStatus::Pending => s.yellow(),
        RunStatus::Running => s.blue(),
        RunStatus::Succeeded => s.green(),
        RunStatus::Failed => s.red(),
    }
}

fn colorize_outcome(outcome: Outcome) -> ColoredString {
    let s = outcome.to_string();
    match outcome {
        Outcome::Succeeded => s.green().bold(),
        Outcome::DeploymentInProgress => s.yellow().bold(),
        _ => s.red().bold(),
    }
}

/// Print a run summary
fn print_run_summary(run: &RunSummary) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        run.service.bold(),
        colorize_status(run.status)
    );
    println!("    ID:       {}", run.id.to_string().dimmed());
    println!("    Branch:   {}", run.branch.dimmed());
    if let Some(revision) = &run.source_revision {
        println!("    Revision: {}", revision.dimmed());
    }
    if let Some(outcome) = run.outcome {
        println!("    Outcome:  {}", colorize_outcome(outcome));
    }
    println!(
        "    Created:  {}",
        run.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

/// Print detailed run information
fn print_run_details(run: &PipelineRun) {
    println!("{}", "Run Details:".bold());
    println!("  ID:       {}", run.id.to_string().cyan());
    println!("  Service:  {}", run.service.bold());
    println!("  Branch:   {}", run.branch);
    if let Some(revision) = &run.source_revision {
        println!("  Revision: {}", revision);
    }
    println!("  Status:   {}", colorize_status(run.status));
    if let Some(outcome) = run.outcome {
        println!("  Outcome:  {}", colorize_outcome(outcome));
    }
    if let Some(reason) = &run.failure_reason {
        println!("  Reason:   {}", reason.red());
    }
    println!("  Created:  {}", run.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(finished) = run.finished_at {
        println!("  Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }

    if !run.stages.is_empty() {
        println!("\n{}", "Stages:".bold());
        for stage in &run.stages {
            print_stage(stage);
        }
    }
}

fn print_stage(stage: &StageResult) {
    let marker = match stage.status {
        StageStatus::Succeeded => "✓".green(),
        StageStatus::Failed => "✗".red(),
        StageStatus::Running => "●".blue(),
        StageStatus::Pending => "○".dimmed(),
    };
    println!("  {} {}", marker, stage.stage.to_string().bold());
    if let Some(artifact) = &stage.artifact_ref {
        println!("      Artifact:   {}", artifact.to_string().dimmed());
    }
    if let Some(deployment_id) = stage.deployment_id {
        println!("      Deployment: {}", deployment_id.to_string().dimmed());
    }
    if let Some(reason) = &stage.failure_reason {
        println!("      Reason:     {}", reason.red());
    }
}
