//! Cutover CLI
//!
//! Command-line interface for operating the Cutover orchestrator.
//!
//! The process exit code reflects the outcome of the run or deployment the
//! command reported on, so the CLI can gate scripts:
//! 0 success, 1 error, 2 build failed, 3 rolled back, 4 aborted,
//! 5 deployment in progress, 6 source unavailable, 7 manual intervention.

mod commands;
mod config;
mod id_resolver;
mod types;

use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use config::{Config, DEFAULT_ORCHESTRATOR_URL, ORCHESTRATOR_URL_ENV};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cutover")]
#[command(about = "Cutover blue/green deployment CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(long, env = ORCHESTRATOR_URL_ENV, default_value = DEFAULT_ORCHESTRATOR_URL)]
    orchestrator_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match Config::new(&cli.orchestrator_url) {
        Ok(config) => handle_command(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
