//! relcheck CLI - Main Entry Point
//!
//! Lists and runs the related best-sellers scenarios against a live
//! storefront, and checks the local browser toolchain.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use relcheck_cli::commands::{config, doctor, list, run};
use relcheck_cli::output;
use relcheck_common::{SuiteConfig, DEFAULT_CONFIG_FILE};

/// relcheck - related best-sellers acceptance suite
#[derive(Parser)]
#[command(name = "relcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Suite configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "RELCHECK_CONFIG", global = true)]
    config: PathBuf,

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
    /// List the scenario catalog
    List(list::ListArgs),

    /// Run scenarios against the storefront
    Run(run::RunArgs),

    /// Check node, Playwright and the storefront
    Doctor(doctor::DoctorArgs),

    /// Show or create the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),

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

    match cli.command {
        Commands::List(args) => list::execute(args, cli.format).await?,
        Commands::Run(args) => {
            let config = SuiteConfig::load_with_env(&cli.config)?;
            run::execute(args, config, cli.format).await?
        }
        Commands::Doctor(args) => {
            let config = SuiteConfig::load_with_env(&cli.config)?;
            doctor::execute(args, config, cli.format).await?
        }
        Commands::Config(cmd) => config::execute(cmd, &cli.config, cli.format).await?,
        Commands::Version => {
            println!("relcheck v{}", relcheck_common::VERSION);
            println!("Related best-sellers acceptance suite");
        }
    }

    Ok(())
}
