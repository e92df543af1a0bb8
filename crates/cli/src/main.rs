//! Fleetwire CLI - Main Entry Point
//!
//! Drives the two provisioning pipelines: cloud-init document generation and
//! two-phase WireGuard mesh setup (identity + publish, then peer resolution).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{check, generate, peers, setup, status};

/// Fleetwire - cloud-init generation and WireGuard mesh provisioning
#[derive(Parser)]
#[command(name = "fleetwire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Fleet inventory file
    #[arg(long, default_value = "inventory.toml", global = true)]
    inventory: PathBuf,

    /// Shared artifact store directory
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a cloud-init document from a manifest
    Generate(generate::GenerateArgs),

    /// Validate the inventory and mesh address assignments
    Check(check::CheckArgs),

    /// Phase 1: baseline setup, identity setup, and artifact publish
    Setup(setup::SetupArgs),

    /// Phase 2: resolve and optionally apply the peer configuration
    Peers(peers::PeersArgs),

    /// Show published artifact state across the fleet
    Status(status::StatusArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let store_path = cli
        .store
        .unwrap_or_else(fleetwire_common::default_artifact_path);

    match cli.command {
        Commands::Generate(args) => generate::execute(args, cli.format).await?,
        Commands::Check(args) => check::execute(args, &cli.inventory, cli.format).await?,
        Commands::Setup(args) => {
            setup::execute(args, &cli.inventory, &store_path, cli.format).await?
        }
        Commands::Peers(args) => {
            peers::execute(args, &cli.inventory, &store_path, cli.format).await?
        }
        Commands::Status(args) => {
            status::execute(args, &cli.inventory, &store_path, cli.format).await?
        }
        Commands::Version => {
            println!("Fleetwire CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Cloud-init generation and WireGuard mesh provisioning");
        }
    }

    Ok(())
}
