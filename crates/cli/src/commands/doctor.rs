//! Doctor Command
//!
//! Checks everything a live run needs: node, the Playwright package and a
//! reachable storefront.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use relcheck_common::SuiteConfig;
use relcheck_e2e::playwright::{check_playwright_installed, node_version};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct DoctorArgs {
    /// Skip the network request to the storefront
    #[arg(long)]
    pub offline: bool,

    /// Timeout for the storefront request, in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,
}

/// Outcome of one readiness check
#[derive(Serialize, Clone)]
pub struct CheckRow {
    pub check: String,
    pub ok: bool,
    pub detail: String,
}

impl CheckRow {
    fn new(check: &str, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            ok,
            detail: detail.into(),
        }
    }
}

impl TableDisplay for CheckRow {
    fn headers() -> Vec<&'static str> {
        vec!["Check", "Status", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let status = if self.ok {
            "✓ ok".green().to_string()
        } else {
            "✗ failed".red().to_string()
        };
        vec![self.check.clone(), status, self.detail.clone()]
    }
}

fn check_config(config: &SuiteConfig) -> CheckRow {
    match config.validate() {
        Ok(()) => CheckRow::new(
            "config",
            true,
            format!(
                "{} on {}, {} worker(s), {} retries",
                config.target.base_url, config.browser.browser, config.runner.workers, config.runner.retries
            ),
        ),
        Err(e) => CheckRow::new("config", false, e.to_string()),
    }
}

async fn check_node(config: &SuiteConfig) -> CheckRow {
    match node_version(&config.browser.node_command).await {
        Some(version) => CheckRow::new("node", true, version),
        None => CheckRow::new(
            "node",
            false,
            format!("'{}' did not run; install Node.js 18+", config.browser.node_command),
        ),
    }
}

async fn check_playwright(config: &SuiteConfig) -> CheckRow {
    match check_playwright_installed(&config.browser).await {
        Ok(()) => CheckRow::new("playwright", true, "module resolves"),
        Err(e) => CheckRow::new("playwright", false, e.to_string()),
    }
}

async fn check_target(config: &SuiteConfig, timeout: Duration) -> CheckRow {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => return CheckRow::new("target", false, e.to_string()),
    };

    debug!("GET {}", config.target.base_url);
    match client.get(&config.target.base_url).send().await {
        Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
            CheckRow::new("target", true, format!("{} answered {}", config.target.base_url, resp.status()))
        }
        Ok(resp) => CheckRow::new(
            "target",
            false,
            format!("{} answered {}", config.target.base_url, resp.status()),
        ),
        Err(e) => CheckRow::new("target", false, e.to_string()),
    }
}

pub async fn execute(args: DoctorArgs, config: SuiteConfig, format: OutputFormat) -> Result<()> {
    let mut checks = vec![
        check_config(&config),
        check_node(&config).await,
        check_playwright(&config).await,
    ];
    if !args.offline {
        checks.push(check_target(&config, Duration::from_secs(args.timeout)).await);
    }

    print_list(&checks, format);

    if checks.iter().any(|c| !c.ok) {
        std::process::exit(1);
    }
    Ok(())
}
