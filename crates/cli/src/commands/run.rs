//! Run Command
//!
//! Runs the selected scenarios through Playwright and writes the results file.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use relcheck_common::{Browser, SuiteConfig};
use relcheck_e2e::playwright::check_playwright_installed;
use relcheck_e2e::{
    PlaywrightLauncher, ScenarioFilter, ScenarioId, ScenarioResult, ScenarioStatus, TestRunner,
};

use crate::output::{print_error, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Default)]
pub struct RunArgs {
    /// Run only these scenarios (e.g. TC-01, repeatable)
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Run only scenarios carrying this tag (repeatable)
    #[arg(short, long)]
    pub tag: Vec<String>,

    /// Run only scenarios whose title contains this text
    #[arg(short, long)]
    pub grep: Option<String>,

    /// Storefront to test
    #[arg(long)]
    pub base_url: Option<String>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long)]
    pub browser: Option<Browser>,

    /// Show the browser window
    #[arg(long, conflicts_with = "headless")]
    pub headed: bool,

    /// Hide the browser window
    #[arg(long)]
    pub headless: bool,

    /// Retries per failed scenario
    #[arg(long)]
    pub retries: Option<u32>,

    /// Concurrent browser sessions
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Directory for test-results.json and screenshots
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// Command-line flags win over file and environment
    pub fn apply(&self, config: &mut SuiteConfig) {
        if let Some(url) = &self.base_url {
            config.target.base_url = url.clone();
        }
        if let Some(browser) = self.browser {
            config.browser.browser = browser;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(retries) = self.retries {
            config.runner.retries = retries;
        }
        if let Some(workers) = self.workers {
            config.runner.workers = workers;
        }
        if let Some(output) = &self.output {
            config.runner.output_dir = output.clone();
        }
    }

    pub fn filter(&self) -> Result<ScenarioFilter> {
        let ids = self
            .ids
            .iter()
            .map(|id| id.parse::<ScenarioId>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScenarioFilter {
            ids,
            tags: self.tag.clone(),
            grep: self.grep.clone(),
        })
    }
}

/// Per-scenario outcome for display
#[derive(Serialize, Clone)]
pub struct ResultRow {
    pub id: String,
    pub title: String,
    pub status: ScenarioStatus,
    pub attempts: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl From<&ScenarioResult> for ResultRow {
    fn from(result: &ScenarioResult) -> Self {
        Self {
            id: result.code.clone(),
            title: result.title.clone(),
            status: result.status,
            attempts: result.attempts.len(),
            duration_ms: result.duration_ms,
            error: result.error.clone(),
        }
    }
}

impl TableDisplay for ResultRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Title", "Status", "Attempts", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        let status = match self.status {
            ScenarioStatus::Passed => "✓ passed".green().to_string(),
            ScenarioStatus::Flaky => "✓ flaky".yellow().to_string(),
            ScenarioStatus::Failed => "✗ failed".red().to_string(),
        };
        vec![
            self.id.clone(),
            self.title.clone(),
            status,
            self.attempts.to_string(),
            format!("{} ms", self.duration_ms),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

pub async fn execute(args: RunArgs, mut config: SuiteConfig, format: OutputFormat) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;
    let filter = args.filter()?;

    check_playwright_installed(&config.browser)
        .await
        .context("browser toolchain is not ready, see `relcheck doctor`")?;

    info!(
        "Running against {} on {} ({})",
        config.target.base_url,
        config.browser.browser,
        if config.browser.headless { "headless" } else { "headed" }
    );

    let launcher = Arc::new(PlaywrightLauncher::new(config.browser.clone()));
    let runner = TestRunner::new(launcher, config);
    let results = runner.run(&filter).await?;
    let path = runner.write_results(&results)?;

    let rows: Vec<ResultRow> = results.results.iter().map(ResultRow::from).collect();
    print_list(&rows, format);

    if format == OutputFormat::Table || format == OutputFormat::Plain {
        let summary = format!(
            "{} passed, {} failed, {} flaky in {} ms (results in {})",
            results.passed,
            results.failed,
            results.flaky,
            results.duration_ms,
            path.display()
        );
        if results.failed > 0 {
            print_error(&summary);
        } else if results.flaky > 0 {
            print_warning(&summary);
        } else {
            print_success(&summary);
        }
    }

    if !results.success() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config() {
        let args = RunArgs {
            base_url: Some("https://shop.test".to_string()),
            browser: Some(Browser::Webkit),
            headless: true,
            retries: Some(3),
            workers: Some(2),
            output: Some(PathBuf::from("out")),
            ..Default::default()
        };
        let mut config = SuiteConfig::default();
        args.apply(&mut config);

        assert_eq!(config.target.base_url, "https://shop.test");
        assert_eq!(config.browser.browser, Browser::Webkit);
        assert!(config.browser.headless);
        assert_eq!(config.runner.retries, 3);
        assert_eq!(config.runner.workers, 2);
        assert_eq!(config.runner.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn unset_flags_keep_the_config() {
        let mut config = SuiteConfig::default();
        config.browser.headless = true;
        RunArgs::default().apply(&mut config);
        assert_eq!(config, {
            let mut expected = SuiteConfig::default();
            expected.browser.headless = true;
            expected
        });
    }

    #[test]
    fn ids_are_parsed_into_the_filter() {
        let args = RunArgs {
            ids: vec!["tc-03".to_string(), "TC-12".to_string()],
            tag: vec!["price".to_string()],
            ..Default::default()
        };
        let filter = args.filter().unwrap();
        assert_eq!(filter.ids, vec![ScenarioId::Tc03, ScenarioId::Tc12]);
        assert_eq!(filter.select(), vec![ScenarioId::Tc12]);

        let bad = RunArgs {
            ids: vec!["TC-99".to_string()],
            ..Default::default()
        };
        assert!(bad.filter().is_err());
    }
}
