//! The browsing-session seam
//!
//! Page objects only ever talk to a `BrowserDriver`. The live suite plugs in the
//! Playwright bridge; unit and integration tests plug in the in-memory browser
//! from `crate::fake`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use relcheck_common::{Browser, SuiteConfig};

use crate::error::DriverResult;
use crate::locator::Locator;

/// Page load milestones, named as Playwright names them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl Geolocation {
    pub const LONDON: Geolocation = Geolocation {
        latitude: 51.5074,
        longitude: -0.1278,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Everything fixed when a session is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub browser: Browser,
    pub headless: bool,
    pub base_url: String,
    pub viewport: Viewport,
    pub is_mobile: bool,
    pub locale: Option<String>,
    pub geolocation: Option<Geolocation>,
    pub extra_headers: BTreeMap<String, String>,
    /// Default timeout for actions such as click or read-text
    pub action_timeout_ms: u64,
}

impl SessionOptions {
    pub fn from_config(config: &SuiteConfig) -> Self {
        Self {
            browser: config.browser.browser,
            headless: config.browser.headless,
            base_url: config.target.base_url.clone(),
            viewport: Viewport {
                width: config.browser.viewport_width,
                height: config.browser.viewport_height,
            },
            is_mobile: false,
            locale: None,
            geolocation: None,
            extra_headers: BTreeMap::new(),
            action_timeout_ms: config.rules.section_timeout_ms,
        }
    }
}

/// A single, exclusively owned browsing session
///
/// Every call is one ordered step. Waits that run out report
/// `DriverError::Timeout` so callers can tell "not there" from "broken".
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    fn browser(&self) -> Browser;

    /// Navigate; relative URLs resolve against the session's base URL
    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn wait_for_load(&self, state: LoadState, timeout: Duration) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()>;

    async fn click(&self, locator: &Locator) -> DriverResult<()>;

    async fn press_key(&self, key: &str) -> DriverResult<()>;

    async fn scroll_by(&self, dx: i64, dy: i64) -> DriverResult<()>;

    async fn wait_for(&self, locator: &Locator, state: WaitState, timeout: Duration) -> DriverResult<()>;

    async fn count(&self, locator: &Locator) -> DriverResult<usize>;

    async fn inner_text(&self, locator: &Locator) -> DriverResult<String>;

    async fn all_inner_texts(&self, locator: &Locator) -> DriverResult<Vec<String>>;

    async fn attribute(&self, locator: &Locator, name: &str) -> DriverResult<Option<String>>;

    /// Instant check, never waits
    async fn is_visible(&self, locator: &Locator) -> DriverResult<bool>;

    async fn is_focused(&self, locator: &Locator) -> DriverResult<bool>;

    async fn clear_cookies(&self) -> DriverResult<()>;

    /// Abort every request issued from now on
    async fn abort_all_requests(&self) -> DriverResult<()>;

    /// Grant the geolocation permission and pin the position
    async fn set_geolocation(&self, position: Geolocation) -> DriverResult<()>;

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> DriverResult<()>;

    async fn screenshot(&self, path: &Path) -> DriverResult<()>;

    /// Start recording a trace with screenshots and DOM snapshots
    async fn start_trace(&self) -> DriverResult<()>;

    /// Stop the running trace and write it as a zip archive at `path`
    async fn stop_trace(&self, path: &Path) -> DriverResult<()>;

    async fn close(&self) -> DriverResult<()>;
}

/// Creates fresh sessions; one per scenario attempt
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, options: &SessionOptions) -> DriverResult<Box<dyn BrowserDriver>>;
}

/// Turning "not there in time" into an empty answer
pub trait TolerateAbsence<T> {
    /// `Timeout` becomes `T::default()`, any other error is kept
    fn or_absent(self) -> DriverResult<T>;
}

impl<T: Default> TolerateAbsence<T> for DriverResult<T> {
    fn or_absent(self) -> DriverResult<T> {
        match self {
            Err(e) if e.is_timeout() => {
                tracing::debug!("treating as absent: {}", e);
                Ok(T::default())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;

    #[test]
    fn timeouts_become_defaults() {
        let timed_out: DriverResult<usize> = Err(DriverError::Timeout {
            what: "ul li".to_string(),
            timeout_ms: 10,
        });
        assert_eq!(timed_out.or_absent().unwrap(), 0);

        let broken: DriverResult<bool> = Err(DriverError::Bridge("gone".to_string()));
        assert!(broken.or_absent().is_err());
    }

    #[test]
    fn load_state_uses_playwright_names() {
        assert_eq!(serde_json::to_string(&LoadState::NetworkIdle).unwrap(), "\"networkidle\"");
        assert_eq!(
            serde_json::to_string(&LoadState::DomContentLoaded).unwrap(),
            "\"domcontentloaded\""
        );
    }

    #[test]
    fn session_options_follow_config() {
        let mut config = SuiteConfig::default();
        config.browser.headless = true;
        config.browser.viewport_width = 1440;
        let options = SessionOptions::from_config(&config);
        assert!(options.headless);
        assert_eq!(options.viewport.width, 1440);
        assert_eq!(options.base_url, "https://www.ebay.com");
        assert_eq!(options.action_timeout_ms, 10_000);
    }
}
