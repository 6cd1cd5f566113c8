//! List Command
//!
//! Shows the scenario catalog without launching a browser.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use relcheck_e2e::scenarios::{Priority, ScenarioKind, SessionProfile};
use relcheck_e2e::{catalog, ScenarioMeta};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ListArgs {
    /// Show only scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

/// Catalog entry for display
#[derive(Serialize, Clone)]
pub struct ScenarioRow {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub kind: ScenarioKind,
    pub query: String,
    pub tags: Vec<String>,
    pub profile: SessionProfile,
}

impl From<&ScenarioMeta> for ScenarioRow {
    fn from(meta: &ScenarioMeta) -> Self {
        Self {
            id: meta.code.to_string(),
            title: meta.title.to_string(),
            priority: meta.priority,
            kind: meta.kind,
            query: meta.query.to_string(),
            tags: meta.tags.iter().map(|t| t.to_string()).collect(),
            profile: meta.profile,
        }
    }
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Title", "Priority", "Kind", "Query", "Tags", "Session"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.title.clone(),
            format!("{:?}", self.priority),
            format!("{:?}", self.kind),
            self.query.clone(),
            self.tags.join(", "),
            format!("{:?}", self.profile).to_lowercase(),
        ]
    }
}

pub fn rows(tag: Option<&str>) -> Vec<ScenarioRow> {
    catalog()
        .iter()
        .filter(|meta| tag.map_or(true, |t| meta.has_tag(t)))
        .map(ScenarioRow::from)
        .collect()
}

pub async fn execute(args: ListArgs, format: OutputFormat) -> Result<()> {
    print_list(&rows(args.tag.as_deref()), format);
    Ok(())
}
