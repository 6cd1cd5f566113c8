//! relcheck E2E Test Framework
//!
//! This crate drives a real browser against a live storefront and checks the
//! related best-sellers section of product pages:
//! - Controls Playwright through a long-lived Node bridge speaking JSON lines
//! - Exposes the storefront as page objects over a `BrowserDriver` seam
//! - Ships the fifteen-scenario catalog and a retrying, concurrent runner
//! - Includes an in-memory browser so everything above runs deterministically
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Scenario Runner (Rust)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── select(filter) -> [ScenarioId]                       │
//! │    ├── Launcher::launch(options) -> Box<dyn BrowserDriver>  │
//! │    ├── ScenarioId::run(ctx) -> E2eResult<()>                │
//! │    └── write_results() -> test-results.json                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pages                                                      │
//! │    ├── ListingPage { open, search, open_first_organic }     │
//! │    └── ProductPage { items, titles, prices, sponsored, ... }│
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver                                              │
//! │    ├── PlaywrightSession (node bridge.js)                   │
//! │    └── FakeSession (in-memory FakeSite)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod driver;
pub mod error;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
pub mod locator;
pub mod pages;
pub mod playwright;
pub mod runner;
pub mod scenarios;

pub use driver::{BrowserDriver, Launcher, SessionOptions, TolerateAbsence};
pub use error::{DriverError, DriverResult, E2eError, E2eResult};
pub use locator::{Locator, TextMatch};
pub use pages::{ListingPage, ProductPage};
pub use playwright::{PlaywrightLauncher, PlaywrightSession};
pub use runner::{ScenarioFilter, ScenarioResult, ScenarioStatus, TestRunner, TestSuiteResult};
pub use scenarios::{catalog, ScenarioId, ScenarioMeta};
