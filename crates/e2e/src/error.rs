//! Error types for E2E testing

use thiserror::Error;

/// Failures reported by a browser session
#[derive(Error, Debug)]
pub enum DriverError {
    /// The element or state did not show up in time. Callers that read live
    /// content treat this as "not present".
    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Browser action failed: {0}")]
    Action(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Browser bridge error: {0}")]
    Bridge(String),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Errors surfaced by page objects, scenarios and the runner
#[derive(Error, Debug)]
pub enum E2eError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A business rule did not hold. The only failure a scenario is meant to have.
    #[error("{scenario}: assertion failed: {condition}")]
    AssertionFailed { scenario: String, condition: String },

    #[error("Scenario {scenario} timed out after {timeout_ms} ms")]
    ScenarioTimeout { scenario: String, timeout_ms: u64 },

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] relcheck_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl E2eError {
    /// An unmet condition, attributed to a scenario later by `in_scenario`
    pub fn assertion(condition: impl Into<String>) -> Self {
        E2eError::AssertionFailed {
            scenario: String::new(),
            condition: condition.into(),
        }
    }

    /// Attribute an assertion failure to `scenario` unless it already names one
    pub fn in_scenario(self, code: &str) -> Self {
        match self {
            E2eError::AssertionFailed { scenario, condition } if scenario.is_empty() => {
                E2eError::AssertionFailed {
                    scenario: code.to_string(),
                    condition,
                }
            }
            other => other,
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, E2eError::AssertionFailed { .. })
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertions_pick_up_the_scenario_once() {
        let err = E2eError::assertion("image 2 has no alt text").in_scenario("TC-07");
        assert_eq!(err.to_string(), "TC-07: assertion failed: image 2 has no alt text");
        let err = err.in_scenario("TC-01");
        assert!(err.to_string().starts_with("TC-07"));
        assert!(err.is_assertion());
    }

    #[test]
    fn other_errors_pass_through() {
        let err = E2eError::from(DriverError::Action("detached".to_string())).in_scenario("TC-04");
        assert!(!err.is_assertion());
        assert_eq!(err.to_string(), "Browser action failed: detached");
    }
}
