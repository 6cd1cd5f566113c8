//! Scenario runner: selection, workers, retries and the results file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use relcheck_common::{Browser, SuiteConfig};

use crate::driver::Launcher;
use crate::error::{E2eError, E2eResult};
use crate::playwright::{screenshot_path, trace_path};
use crate::scenarios::{ScenarioContext, ScenarioId, ScenarioMeta};

/// Which scenarios to run; empty criteria select everything
#[derive(Debug, Clone, Default)]
pub struct ScenarioFilter {
    pub ids: Vec<ScenarioId>,
    pub tags: Vec<String>,
    /// Case-insensitive substring of the title
    pub grep: Option<String>,
}

impl ScenarioFilter {
    pub fn matches(&self, meta: &ScenarioMeta) -> bool {
        let id_ok = self.ids.is_empty() || self.ids.contains(&meta.id);
        let tag_ok = self.tags.is_empty() || self.tags.iter().any(|t| meta.has_tag(t));
        let grep_ok = self
            .grep
            .as_ref()
            .map_or(true, |g| meta.title.to_lowercase().contains(&g.to_lowercase()));
        id_ok && tag_ok && grep_ok
    }

    pub fn select(&self) -> Vec<ScenarioId> {
        ScenarioId::ALL
            .iter()
            .copied()
            .filter(|id| self.matches(&id.meta()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Failed at least once, then passed on a retry
    Flaky,
}

/// One try at a scenario, in its own browser session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt: u32,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
    /// Playwright trace archive, recorded on the first retry
    pub trace: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub code: String,
    pub title: String,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    /// Error of the last failed attempt
    pub error: Option<String>,
    pub attempts: Vec<AttemptResult>,
}

impl ScenarioResult {
    fn from_attempts(meta: &ScenarioMeta, attempts: Vec<AttemptResult>) -> Self {
        let passed = attempts.last().is_some_and(|a| a.success);
        let status = match (passed, attempts.len()) {
            (true, 1) => ScenarioStatus::Passed,
            (true, _) => ScenarioStatus::Flaky,
            (false, _) => ScenarioStatus::Failed,
        };
        Self {
            code: meta.code.to_string(),
            title: meta.title.to_string(),
            status,
            duration_ms: attempts.iter().map(|a| a.duration_ms).sum(),
            error: attempts.iter().rev().find_map(|a| a.error.clone()),
            attempts,
        }
    }

    pub fn success(&self) -> bool {
        self.status != ScenarioStatus::Failed
    }
}

/// Result of running a selection of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub base_url: String,
    pub browser: Browser,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub flaky: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Runs scenarios, each attempt in a fresh session from the launcher
pub struct TestRunner {
    launcher: Arc<dyn Launcher>,
    config: Arc<SuiteConfig>,
}

impl TestRunner {
    pub fn new(launcher: Arc<dyn Launcher>, config: SuiteConfig) -> Self {
        Self {
            launcher,
            config: Arc::new(config),
        }
    }

    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        self.run(&ScenarioFilter::default()).await
    }

    /// Run the scenarios selected by `filter`, up to `runner.workers` at a time
    pub async fn run(&self, filter: &ScenarioFilter) -> E2eResult<TestSuiteResult> {
        let selected = filter.select();
        if selected.is_empty() {
            return Err(E2eError::ScenarioNotFound(format!("no scenario matches {:?}", filter)));
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let workers = self.config.runner.workers.max(1);
        info!(
            "Running {} scenario(s) against {} with {} worker(s) [run {}]",
            selected.len(),
            self.config.target.base_url,
            workers,
            run_id
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for (index, id) in selected.iter().copied().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let launcher = Arc::clone(&self.launcher);
            let config = Arc::clone(&self.config);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, run_with_retries(launcher.as_ref(), &config, id).await)
            });
        }

        let mut slots: Vec<Option<ScenarioResult>> = vec![None; selected.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    log_result(&result);
                    slots[index] = Some(result);
                }
                Err(e) => error!("Scenario worker ended abnormally: {}", e),
            }
        }

        let results: Vec<ScenarioResult> = slots
            .into_iter()
            .zip(&selected)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| {
                    let attempt = AttemptResult {
                        attempt: 1,
                        success: false,
                        duration_ms: 0,
                        error: Some("scenario worker ended abnormally".to_string()),
                        screenshot: None,
                        trace: None,
                    };
                    ScenarioResult::from_attempts(&id.meta(), vec![attempt])
                })
            })
            .collect();

        let count = |status| results.iter().filter(|r| r.status == status).count();
        let (passed, failed, flaky) = (
            count(ScenarioStatus::Passed),
            count(ScenarioStatus::Failed),
            count(ScenarioStatus::Flaky),
        );
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} flaky ({} ms)",
            passed, failed, flaky, duration_ms
        );

        Ok(TestSuiteResult {
            run_id,
            started_at,
            base_url: self.config.target.base_url.clone(),
            browser: self.config.browser.browser,
            total: results.len(),
            passed,
            failed,
            flaky,
            duration_ms,
            results,
        })
    }

    /// Run one scenario with retries, outside the worker pool
    pub async fn run_scenario(&self, id: ScenarioId) -> ScenarioResult {
        run_with_retries(self.launcher.as_ref(), &self.config, id).await
    }

    /// Write results to `<output_dir>/test-results.json`
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        let output_dir = &self.config.runner.output_dir;
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

fn log_result(result: &ScenarioResult) {
    match result.status {
        ScenarioStatus::Passed => info!("✓ {} {} ({} ms)", result.code, result.title, result.duration_ms),
        ScenarioStatus::Flaky => warn!(
            "✓ {} {} ({} ms, flaky after {} attempts)",
            result.code,
            result.title,
            result.duration_ms,
            result.attempts.len()
        ),
        ScenarioStatus::Failed => error!(
            "✗ {} {} - {}",
            result.code,
            result.title,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

async fn run_with_retries(launcher: &dyn Launcher, config: &SuiteConfig, id: ScenarioId) -> ScenarioResult {
    let meta = id.meta();
    let max_attempts = config.runner.retries + 1;
    let mut attempts = Vec::new();

    for attempt in 1..=max_attempts {
        let result = run_attempt(launcher, config, &meta, attempt).await;
        let success = result.success;
        if !success && attempt < max_attempts {
            warn!(
                "{} attempt {}/{} failed, retrying: {}",
                meta.code,
                attempt,
                max_attempts,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        attempts.push(result);
        if success {
            break;
        }
    }

    ScenarioResult::from_attempts(&meta, attempts)
}

async fn run_attempt(
    launcher: &dyn Launcher,
    config: &SuiteConfig,
    meta: &ScenarioMeta,
    attempt: u32,
) -> AttemptResult {
    let start = Instant::now();
    let finished = |error: Option<String>, screenshot: Option<PathBuf>, trace: Option<PathBuf>| AttemptResult {
        attempt,
        success: error.is_none(),
        duration_ms: start.elapsed().as_millis() as u64,
        error,
        screenshot,
        trace,
    };

    debug!("Launching session for {} attempt {}", meta.code, attempt);
    let options = meta.profile.session_options(config);
    let driver = match launcher.launch(&options).await {
        Ok(driver) => driver,
        Err(e) => {
            let error = format!("{}: could not start browser: {}", meta.code, e);
            return finished(Some(error), None, None);
        }
    };

    let tracing = if config.runner.trace_on_retry && attempt == 2 {
        match driver.start_trace().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not start trace for {}: {}", meta.code, e);
                false
            }
        }
    } else {
        false
    };

    let ctx = ScenarioContext::new(meta.id, driver.as_ref(), config);
    let timeout = config.runner.scenario_timeout();
    let outcome = match tokio::time::timeout(timeout, drive(&ctx)).await {
        Ok(outcome) => outcome.map_err(|e| e.in_scenario(meta.code)),
        Err(_) => Err(E2eError::ScenarioTimeout {
            scenario: meta.code.to_string(),
            timeout_ms: config.runner.scenario_timeout_ms,
        }),
    };

    let mut screenshot = None;
    if outcome.is_err() && config.runner.screenshot_on_failure {
        let path = screenshot_path(&config.runner.output_dir, meta.code, attempt);
        match driver.screenshot(&path).await {
            Ok(()) => screenshot = Some(path),
            Err(e) => warn!("Could not capture screenshot for {}: {}", meta.code, e),
        }
    }

    let mut trace = None;
    if tracing {
        let path = trace_path(&config.runner.output_dir, meta.code, attempt);
        match driver.stop_trace(&path).await {
            Ok(()) => {
                info!("Trace for {} written to {}", meta.code, path.display());
                trace = Some(path);
            }
            Err(e) => warn!("Could not save trace for {}: {}", meta.code, e),
        }
    }

    if let Err(e) = driver.close().await {
        debug!("Closing session for {} failed: {}", meta.code, e);
    }

    finished(outcome.err().map(|e| e.to_string()), screenshot, trace)
}

async fn drive(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    ctx.prepare().await?;
    ctx.id.run(ctx).await
}
