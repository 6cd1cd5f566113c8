//! Playwright browser automation
//!
//! Each session runs a small Node bridge (`bridge.js`) that keeps one browser,
//! context and page alive and answers line-delimited JSON requests on stdio.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use relcheck_common::{Browser, BrowserConfig};

use crate::driver::{BrowserDriver, Geolocation, Launcher, LoadState, SessionOptions, WaitState};
use crate::error::{DriverError, DriverResult};
use crate::locator::Locator;

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

/// A request sent to the bridge
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Launch(&'a SessionOptions),
    Goto { url: &'a str },
    WaitForLoad { state: LoadState, timeout_ms: u64 },
    CurrentUrl,
    Fill { locator: &'a Locator, value: &'a str },
    Click { locator: &'a Locator },
    PressKey { key: &'a str },
    ScrollBy { dx: i64, dy: i64 },
    WaitFor { locator: &'a Locator, state: WaitState, timeout_ms: u64 },
    Count { locator: &'a Locator },
    InnerText { locator: &'a Locator },
    AllInnerTexts { locator: &'a Locator },
    Attribute { locator: &'a Locator, name: &'a str },
    IsVisible { locator: &'a Locator },
    IsFocused { locator: &'a Locator },
    ClearCookies,
    AbortAllRequests,
    SetGeolocation { latitude: f64, longitude: f64 },
    SetExtraHeaders { headers: &'a BTreeMap<String, String> },
    Screenshot { path: &'a Path },
    StartTrace,
    StopTrace { path: &'a Path },
    Close,
}

impl BridgeCommand<'_> {
    /// What a timeout on this command was waiting for
    fn target(&self) -> String {
        match self {
            BridgeCommand::Goto { url } => format!("navigation to {}", url),
            BridgeCommand::WaitForLoad { state, .. } => format!("load state {:?}", state),
            BridgeCommand::Fill { locator, .. }
            | BridgeCommand::Click { locator }
            | BridgeCommand::WaitFor { locator, .. }
            | BridgeCommand::Count { locator }
            | BridgeCommand::InnerText { locator }
            | BridgeCommand::AllInnerTexts { locator }
            | BridgeCommand::Attribute { locator, .. }
            | BridgeCommand::IsVisible { locator }
            | BridgeCommand::IsFocused { locator } => locator.to_string(),
            other => format!("{:?}", other),
        }
    }

    fn timeout_ms(&self) -> Option<u64> {
        match self {
            BridgeCommand::WaitForLoad { timeout_ms, .. } | BridgeCommand::WaitFor { timeout_ms, .. } => {
                Some(*timeout_ms)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<BridgeFailure>,
}

#[derive(Debug, Clone, Deserialize)]
struct BridgeFailure {
    kind: FailureKind,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FailureKind {
    Timeout,
    Navigation,
    Action,
    Protocol,
}

impl BridgeFailure {
    fn into_error(self, command: &BridgeCommand<'_>, action_timeout_ms: u64) -> DriverError {
        match self.kind {
            FailureKind::Timeout => DriverError::Timeout {
                what: command.target(),
                timeout_ms: command.timeout_ms().unwrap_or(action_timeout_ms),
            },
            FailureKind::Navigation => DriverError::Navigation {
                url: match command {
                    BridgeCommand::Goto { url } => url.to_string(),
                    _ => String::new(),
                },
                reason: self.message,
            },
            FailureKind::Action => DriverError::Action(self.message),
            FailureKind::Protocol => DriverError::Protocol(self.message),
        }
    }
}

struct BridgeIo {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// A live Playwright session backed by one bridge process
pub struct PlaywrightSession {
    browser: Browser,
    action_timeout_ms: u64,
    io: Mutex<BridgeIo>,
    /// Holds the staged bridge script for the lifetime of the process
    _script_dir: TempDir,
}

impl PlaywrightSession {
    /// Spawn the bridge and launch a browser with `options`
    pub async fn spawn(config: &BrowserConfig, options: &SessionOptions) -> DriverResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut cmd = Command::new(&config.node_command);
        cmd.arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd.spawn().map_err(|e| {
            DriverError::Bridge(format!("failed to spawn {}: {}", config.node_command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Bridge("bridge stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "relcheck::bridge", "{}", line);
                }
            });
        }

        let session = Self {
            browser: options.browser,
            action_timeout_ms: options.action_timeout_ms,
            io: Mutex::new(BridgeIo {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 0,
            }),
            _script_dir: script_dir,
        };

        session.call(&BridgeCommand::Launch(options)).await?;
        info!(
            "Launched {} (headless: {}) against {}",
            options.browser, options.headless, options.base_url
        );
        Ok(session)
    }

    async fn call(&self, command: &BridgeCommand<'_>) -> DriverResult<serde_json::Value> {
        let mut io = self.io.lock().await;
        io.next_id += 1;
        let id = io.next_id;

        let mut line = serde_json::to_string(&BridgeRequest { id, command })?;
        line.push('\n');
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        loop {
            let Some(line) = io.stdout.next_line().await? else {
                let status = io.child.try_wait()?;
                return Err(DriverError::Bridge(format!(
                    "bridge exited while waiting for response {} ({:?})",
                    id, status
                )));
            };

            let response: BridgeResponse = match serde_json::from_str(&line) {
                Ok(response) => response,
                Err(_) => {
                    // console output from page scripts or Playwright itself
                    debug!(target: "relcheck::bridge", "{}", line);
                    continue;
                }
            };

            if response.id != id {
                warn!("Dropping stale bridge response {} (expected {})", response.id, id);
                continue;
            }

            if response.ok {
                return Ok(response.value);
            }
            let failure = response.error.unwrap_or(BridgeFailure {
                kind: FailureKind::Protocol,
                message: "failure without error payload".to_string(),
            });
            return Err(failure.into_error(command, self.action_timeout_ms));
        }
    }

    async fn call_unit(&self, command: BridgeCommand<'_>) -> DriverResult<()> {
        self.call(&command).await.map(|_| ())
    }

    async fn call_as<T: serde::de::DeserializeOwned>(&self, command: BridgeCommand<'_>) -> DriverResult<T> {
        let value = self.call(&command).await?;
        serde_json::from_value(value).map_err(|e| {
            DriverError::Protocol(format!("unexpected result for {}: {}", command.target(), e))
        })
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightSession {
    fn browser(&self) -> Browser {
        self.browser
    }

    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.call_unit(BridgeCommand::Goto { url }).await
    }

    async fn wait_for_load(&self, state: LoadState, timeout: Duration) -> DriverResult<()> {
        self.call_unit(BridgeCommand::WaitForLoad {
            state,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.call_as(BridgeCommand::CurrentUrl).await
    }

    async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()> {
        self.call_unit(BridgeCommand::Fill { locator, value }).await
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        self.call_unit(BridgeCommand::Click { locator }).await
    }

    async fn press_key(&self, key: &str) -> DriverResult<()> {
        self.call_unit(BridgeCommand::PressKey { key }).await
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> DriverResult<()> {
        self.call_unit(BridgeCommand::ScrollBy { dx, dy }).await
    }

    async fn wait_for(&self, locator: &Locator, state: WaitState, timeout: Duration) -> DriverResult<()> {
        self.call_unit(BridgeCommand::WaitFor {
            locator,
            state,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
    }

    async fn count(&self, locator: &Locator) -> DriverResult<usize> {
        self.call_as(BridgeCommand::Count { locator }).await
    }

    async fn inner_text(&self, locator: &Locator) -> DriverResult<String> {
        self.call_as(BridgeCommand::InnerText { locator }).await
    }

    async fn all_inner_texts(&self, locator: &Locator) -> DriverResult<Vec<String>> {
        self.call_as(BridgeCommand::AllInnerTexts { locator }).await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> DriverResult<Option<String>> {
        self.call_as(BridgeCommand::Attribute { locator, name }).await
    }

    async fn is_visible(&self, locator: &Locator) -> DriverResult<bool> {
        self.call_as(BridgeCommand::IsVisible { locator }).await
    }

    async fn is_focused(&self, locator: &Locator) -> DriverResult<bool> {
        self.call_as(BridgeCommand::IsFocused { locator }).await
    }

    async fn clear_cookies(&self) -> DriverResult<()> {
        self.call_unit(BridgeCommand::ClearCookies).await
    }

    async fn abort_all_requests(&self) -> DriverResult<()> {
        self.call_unit(BridgeCommand::AbortAllRequests).await
    }

    async fn set_geolocation(&self, position: Geolocation) -> DriverResult<()> {
        self.call_unit(BridgeCommand::SetGeolocation {
            latitude: position.latitude,
            longitude: position.longitude,
        })
        .await
    }

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> DriverResult<()> {
        self.call_unit(BridgeCommand::SetExtraHeaders { headers }).await
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.call_unit(BridgeCommand::Screenshot { path }).await
    }

    async fn start_trace(&self) -> DriverResult<()> {
        self.call_unit(BridgeCommand::StartTrace).await
    }

    async fn stop_trace(&self, path: &Path) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.call_unit(BridgeCommand::StopTrace { path }).await
    }

    async fn close(&self) -> DriverResult<()> {
        self.call_unit(BridgeCommand::Close).await?;
        let mut io = self.io.lock().await;
        io.stdin.shutdown().await?;
        match tokio::time::timeout(Duration::from_secs(5), io.child.wait()).await {
            Ok(status) => debug!("Bridge exited: {:?}", status?),
            Err(_) => {
                warn!("Bridge did not exit, killing it");
                io.child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Launches one Playwright bridge per session
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    config: BrowserConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Launcher for PlaywrightLauncher {
    async fn launch(&self, options: &SessionOptions) -> DriverResult<Box<dyn BrowserDriver>> {
        let session = PlaywrightSession::spawn(&self.config, options).await?;
        Ok(Box::new(session))
    }
}

/// Node version string, or `None` when the executable cannot run
pub async fn node_version(node_command: &str) -> Option<String> {
    let output = Command::new(node_command)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check that the bridge will be able to `require('playwright')`
pub async fn check_playwright_installed(config: &BrowserConfig) -> DriverResult<()> {
    let mut cmd = Command::new(&config.node_command);
    cmd.args(["-e", "require('playwright')"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(node_path) = &config.node_path {
        cmd.env("NODE_PATH", node_path);
    }

    match cmd.status().await {
        Ok(status) if status.success() => Ok(()),
        _ => Err(DriverError::PlaywrightNotFound),
    }
}

/// Where failure screenshots for a scenario attempt are written
pub fn screenshot_path(output_dir: &Path, scenario: &str, attempt: u32) -> PathBuf {
    output_dir
        .join("screenshots")
        .join(format!("{}-attempt{}.png", scenario, attempt))
}

/// Where the trace of a retried scenario attempt is written
pub fn trace_path(output_dir: &Path, scenario: &str, attempt: u32) -> PathBuf {
    output_dir
        .join("traces")
        .join(format!("{}-attempt{}.zip", scenario, attempt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::TextMatch;
    use relcheck_common::SuiteConfig;
    use serde_json::json;

    #[test]
    fn requests_are_flat_json_with_an_op() {
        let locator = Locator::css("#prcIsum");
        let command = BridgeCommand::WaitFor {
            locator: &locator,
            state: WaitState::Visible,
            timeout_ms: 10_000,
        };
        let value = serde_json::to_value(BridgeRequest { id: 7, command: &command }).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["op"], "wait_for");
        assert_eq!(value["state"], "visible");
        assert_eq!(value["timeout_ms"], 10_000);
        assert_eq!(value["locator"]["steps"][0]["selector"]["css"], "#prcIsum");
    }

    #[test]
    fn launch_carries_session_options() {
        let options = SessionOptions::from_config(&SuiteConfig::default());
        let command = BridgeCommand::Launch(&options);
        let value = serde_json::to_value(BridgeRequest { id: 1, command: &command }).unwrap();
        assert_eq!(value["op"], "launch");
        assert_eq!(value["browser"], "chromium");
        assert_eq!(value["base_url"], "https://www.ebay.com");
        assert_eq!(value["viewport"], json!({ "width": 1280, "height": 720 }));
    }

    #[test]
    fn timeout_failures_name_the_locator() {
        let locator = Locator::role("heading", Some(TextMatch::pattern_i("results")));
        let command = BridgeCommand::WaitFor {
            locator: &locator,
            state: WaitState::Visible,
            timeout_ms: 250,
        };
        let response: BridgeResponse = serde_json::from_value(json!({
            "id": 3,
            "ok": false,
            "error": { "kind": "timeout", "message": "Timeout 250ms exceeded." }
        }))
        .unwrap();
        let error = response.error.unwrap().into_error(&command, 10_000);
        match error {
            DriverError::Timeout { what, timeout_ms } => {
                assert_eq!(what, "role=heading[name=/results/i]");
                assert_eq!(timeout_ms, 250);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn navigation_failures_keep_the_url() {
        let command = BridgeCommand::Goto { url: "/" };
        let failure = BridgeFailure {
            kind: FailureKind::Navigation,
            message: "net::ERR_FAILED".to_string(),
        };
        assert!(matches!(
            failure.into_error(&command, 10_000),
            DriverError::Navigation { url, .. } if url == "/"
        ));
    }

    #[test]
    fn artifacts_are_named_per_attempt() {
        let path = screenshot_path(Path::new("out"), "TC-04", 2);
        assert_eq!(path, Path::new("out/screenshots/TC-04-attempt2.png"));
        let trace = trace_path(Path::new("out"), "TC-04", 2);
        assert_eq!(trace, Path::new("out/traces/TC-04-attempt2.zip"));
    }

    #[test]
    fn stop_trace_carries_the_archive_path() {
        let path = PathBuf::from("out/traces/TC-01-attempt2.zip");
        let command = BridgeCommand::StopTrace { path: &path };
        let value = serde_json::to_value(BridgeRequest { id: 4, command: &command }).unwrap();
        assert_eq!(value["op"], "stop_trace");
        assert_eq!(value["path"], "out/traces/TC-01-attempt2.zip");
    }

    #[test]
    fn bridge_script_handles_every_command() {
        for op in [
            "launch", "goto", "wait_for_load", "current_url", "fill", "click", "press_key",
            "scroll_by", "wait_for", "count", "inner_text", "all_inner_texts", "attribute",
            "is_visible", "is_focused", "clear_cookies", "abort_all_requests", "set_geolocation",
            "set_extra_headers", "screenshot", "start_trace", "stop_trace", "close",
        ] {
            assert!(BRIDGE_SCRIPT.contains(&format!("{}:", op)) || BRIDGE_SCRIPT.contains(&format!("  {},", op)),
                "bridge.js has no handler for {}", op);
        }
    }
}
