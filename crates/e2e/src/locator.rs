//! Element locators as plain data
//!
//! A `Locator` is a chain of steps starting at the page. The Playwright bridge
//! turns the chain into `page.getByRole(..).nth(..)` calls; the in-memory
//! browser resolves the same chain against its element tree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a text, accessible name or label is matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TextMatch {
    /// Case-insensitive substring, whitespace trimmed
    Substring(String),
    /// Whole string, case-sensitive
    Exact(String),
    /// Regular expression
    Pattern { source: String, ignore_case: bool },
}

impl TextMatch {
    pub fn substring(text: &str) -> Self {
        TextMatch::Substring(text.to_string())
    }

    pub fn exact(text: &str) -> Self {
        TextMatch::Exact(text.to_string())
    }

    /// Case-insensitive regular expression, the `/.../i` form
    pub fn pattern_i(source: &str) -> Self {
        TextMatch::Pattern {
            source: source.to_string(),
            ignore_case: true,
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Substring(text) => write!(f, "\"{}\"", text),
            TextMatch::Exact(text) => write!(f, "\"{}\"s", text),
            TextMatch::Pattern { source, ignore_case } => {
                write!(f, "/{}/{}", source, if *ignore_case { "i" } else { "" })
            }
        }
    }
}

/// One way of finding elements below the current scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Selector {
    Css { css: String },
    Role { role: String, name: Option<TextMatch> },
    Label { text: TextMatch },
    Text { text: TextMatch },
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css { css } => write!(f, "css={}", css),
            Selector::Role { role, name: Some(name) } => write!(f, "role={}[name={}]", role, name),
            Selector::Role { role, name: None } => write!(f, "role={}", role),
            Selector::Label { text } => write!(f, "label={}", text),
            Selector::Text { text } => write!(f, "text={}", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LocatorStep {
    Find { selector: Selector },
    Nth { index: usize },
    /// Keep only matches that contain nothing matching `inner` (resolved from
    /// the page, the way Playwright's `filter({ hasNot })` does)
    HasNot { inner: Locator },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Locator {
    steps: Vec<LocatorStep>,
}

impl Locator {
    fn start(selector: Selector) -> Self {
        Locator {
            steps: vec![LocatorStep::Find { selector }],
        }
    }

    pub fn css(css: &str) -> Self {
        Self::start(Selector::Css { css: css.to_string() })
    }

    pub fn role(role: &str, name: Option<TextMatch>) -> Self {
        Self::start(Selector::Role {
            role: role.to_string(),
            name,
        })
    }

    pub fn label(text: TextMatch) -> Self {
        Self::start(Selector::Label { text })
    }

    pub fn text(text: TextMatch) -> Self {
        Self::start(Selector::Text { text })
    }

    pub fn steps(&self) -> &[LocatorStep] {
        &self.steps
    }

    fn then(&self, step: LocatorStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Locator { steps }
    }

    pub fn find(&self, selector: Selector) -> Self {
        self.then(LocatorStep::Find { selector })
    }

    pub fn within_css(&self, css: &str) -> Self {
        self.find(Selector::Css { css: css.to_string() })
    }

    pub fn within_role(&self, role: &str, name: Option<TextMatch>) -> Self {
        self.find(Selector::Role {
            role: role.to_string(),
            name,
        })
    }

    pub fn within_text(&self, text: TextMatch) -> Self {
        self.find(Selector::Text { text })
    }

    pub fn nth(&self, index: usize) -> Self {
        self.then(LocatorStep::Nth { index })
    }

    pub fn first(&self) -> Self {
        self.nth(0)
    }

    pub fn has_not(&self, inner: Locator) -> Self {
        self.then(LocatorStep::HasNot { inner })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            match step {
                LocatorStep::Find { selector } => write!(f, "{}", selector)?,
                LocatorStep::Nth { index } => write!(f, "nth={}", index)?,
                LocatorStep::HasNot { inner } => write!(f, "has-not=({})", inner)?,
            }
        }
        Ok(())
    }
}
