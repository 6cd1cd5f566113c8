//! relcheck Common Library
//!
//! Pure business-rule predicates for related best-seller items, plus the
//! configuration shared by the runner and the CLI.

pub mod config;
pub mod error;
pub mod predicates;

pub use config::{Browser, BrowserConfig, RulesConfig, RunnerSettings, SuiteConfig, TargetConfig};
pub use error::{Error, Result};
pub use predicates::{
    is_in_price_range, is_same_category, parse_money, Category, Money, PriceRange, RelatedItem,
    DEFAULT_CATEGORY, DEFAULT_PRICE_TOLERANCE,
};

/// relcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "relcheck.toml";
