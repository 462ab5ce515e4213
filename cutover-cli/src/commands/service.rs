//! Service command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use cutover_core::domain::traffic::PoolColor;
use std::process::ExitCode;

use crate::config::Config;

/// Service subcommands
#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Show which slot is serving and where traffic goes
    Status {
        /// Service name
        name: String,
    },
}

/// Handle service commands
pub async fn handle_service_command(command: ServiceCommands, config: &Config) -> Result<ExitCode> {
    let client = config.client();

    match command {
        ServiceCommands::Status { name } => {
            let status = client.get_service_status(&name).await?;

            println!("{}", format!("Service {}:", status.name).bold());
            println!(
                "  Incumbent: {} {}",
                status.incumbent_color.to_string().cyan(),
                status
                    .incumbent_pool
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "(none)".to_string())
                    .dimmed()
            );
            println!(
                "  Weights:   blue {}% / green {}%",
                status.weights.weight_of(PoolColor::Blue),
                status.weights.weight_of(PoolColor::Green)
            );
            match status.in_flight_deployment {
                Some(id) => println!("  In flight: {}", id.to_string().yellow()),
                None => println!("  In flight: {}", "none".dimmed()),
            }

            Ok(ExitCode::SUCCESS)
        }
    }
}
