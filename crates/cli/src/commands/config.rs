//! Config Commands
//!
//! Show the effective configuration or write a starter file.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use std::path::Path;

use relcheck_common::SuiteConfig;

use crate::output::{print_success, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration after file and environment overrides
    Show,

    /// Write the default configuration to the config path
    Init(InitArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn render(config: &SuiteConfig, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(config)?,
        OutputFormat::Yaml => serde_yaml::to_string(config)?,
        OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(config)?,
    })
}

pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    SuiteConfig::default().save(path)?;
    Ok(())
}

pub async fn execute(cmd: ConfigCommands, path: &Path, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = SuiteConfig::load_with_env(path)?;
            println!("{}", render(&config, format)?);
        }
        ConfigCommands::Init(args) => {
            init(path, args.force)?;
            print_success(&format!("Wrote default configuration to {}", path.display()));
        }
    }
    Ok(())
}
