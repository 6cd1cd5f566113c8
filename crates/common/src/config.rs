//! Suite configuration
//!
//! Loaded from TOML when a file is present, otherwise defaults. Environment
//! overrides are applied on top so CI can tune the run without editing files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::predicates::{Category, DEFAULT_CATEGORY, DEFAULT_PRICE_TOLERANCE};

/// Browser engine a session is launched with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(Error::invalid("browser", format!("unknown browser '{}'", other))),
        }
    }
}

/// Complete suite configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub target: TargetConfig,
    pub browser: BrowserConfig,
    pub runner: RunnerSettings,
    pub rules: RulesConfig,
}

/// Site under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.ebay.com".to_string(),
        }
    }
}

/// How browser sessions are launched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: Browser,

    /// The target site rejects most headless traffic, so headed is the default
    pub headless: bool,

    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node executable used to host the Playwright bridge
    pub node_command: String,

    /// Extra module search path so the bridge can `require('playwright')`
    pub node_path: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: false,
            viewport_width: 1280,
            viewport_height: 720,
            node_command: "node".to_string(),
            node_path: None,
        }
    }
}

/// Scheduling of scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub retries: u32,
    pub workers: usize,
    pub scenario_timeout_ms: u64,
    pub output_dir: PathBuf,
    pub screenshot_on_failure: bool,

    /// Record a Playwright trace during the first retry of a scenario
    pub trace_on_retry: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            retries: 0,
            workers: 4,
            scenario_timeout_ms: 90_000,
            output_dir: PathBuf::from("test-results"),
            screenshot_on_failure: true,
            trace_on_retry: true,
        }
    }
}

impl RunnerSettings {
    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.scenario_timeout_ms)
    }
}

/// Business rules and the waits used while reading live content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub max_related_items: usize,
    pub price_tolerance: f64,
    pub category: String,
    pub section_timeout_ms: u64,
    pub results_timeout_ms: u64,
    pub load_budget_ms: u64,
    pub poll_interval_ms: u64,
    pub offline_error_timeout_ms: u64,
    pub high_price_floor: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_related_items: 6,
            price_tolerance: DEFAULT_PRICE_TOLERANCE,
            category: DEFAULT_CATEGORY.to_string(),
            section_timeout_ms: 10_000,
            results_timeout_ms: 10_000,
            load_budget_ms: 3_000,
            poll_interval_ms: 500,
            offline_error_timeout_ms: 5_000,
            high_price_floor: 400.0,
        }
    }
}

impl RulesConfig {
    pub fn category(&self) -> Category {
        Category::new(&self.category)
    }

    pub fn section_timeout(&self) -> Duration {
        Duration::from_millis(self.section_timeout_ms)
    }

    pub fn results_timeout(&self) -> Duration {
        Duration::from_millis(self.results_timeout_ms)
    }

    pub fn load_budget(&self) -> Duration {
        Duration::from_millis(self.load_budget_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn offline_error_timeout(&self) -> Duration {
        Duration::from_millis(self.offline_error_timeout_ms)
    }
}

impl SuiteConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from file, then apply overrides from the process environment
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides read through `lookup`
    ///
    /// `CI` switches to two retries on a single worker. `CI=0` and
    /// `CI=false` leave it off.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("CI").is_some_and(|v| !v.is_empty() && v != "0" && v != "false") {
            self.runner.retries = 2;
            self.runner.workers = 1;
        }
        if let Some(url) = lookup("RELCHECK_BASE_URL") {
            self.target.base_url = url;
        }
        if let Some(headless) = lookup("RELCHECK_HEADLESS") {
            self.browser.headless = parse_flag("RELCHECK_HEADLESS", &headless)?;
        }
        if let Some(browser) = lookup("RELCHECK_BROWSER") {
            self.browser.browser = browser.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let rules = &self.rules;
        if !(0.0..1.0).contains(&rules.price_tolerance) {
            return Err(Error::invalid("rules.price_tolerance", "must be in [0, 1)"));
        }
        if rules.category.trim().is_empty() {
            return Err(Error::invalid("rules.category", "must not be empty"));
        }
        if rules.poll_interval_ms == 0 {
            return Err(Error::invalid("rules.poll_interval_ms", "must be positive"));
        }
        if self.runner.workers == 0 {
            return Err(Error::invalid("runner.workers", "must be at least 1"));
        }
        if self.target.base_url.trim().is_empty() {
            return Err(Error::invalid("target.base_url", "must not be empty"));
        }
        Ok(())
    }
}

fn parse_flag(field: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::invalid(field, format!("expected a boolean, got '{}'", other))),
    }
}
