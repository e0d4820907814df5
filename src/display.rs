//! Run summary output
//!
//! Prints what a run produced, either as a short colored report for humans
//! or as a single JSON object for scripts:
//!
//! ```json
//! {
//!   "runId": "6f0c...",
//!   "variant": "weighted",
//!   "records": 1834,
//!   "groupNodes": 41,
//!   "userNodes": 312,
//!   "edges": 312,
//!   "unresolvedMembers": 3,
//!   ...
//! }
//! ```

use crate::models::RunSummary;
use anyhow::{Context, Result};
use colored::Colorize;

pub struct SummaryDisplay;

impl Default for SummaryDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryDisplay {
    pub fn new() -> Self {
        Self
    }

    pub fn display(&self, summary: &RunSummary, json_output: bool) -> Result<()> {
        if json_output {
            println!("{}", self.render_json(summary)?);
        } else {
            println!("{}", self.render_text(summary));
        }
        Ok(())
    }

    pub fn render_json(&self, summary: &RunSummary) -> Result<String> {
        serde_json::to_string_pretty(summary).context("Failed to serialize run summary")
    }

    pub fn render_text(&self, summary: &RunSummary) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{} {} graph written ({} groups, {} user rows, {} edges)",
            "✅".bright_green(),
            summary.variant.as_str().bright_white().bold(),
            summary.group_nodes.to_string().bright_white().bold(),
            summary.user_nodes.to_string().bright_white().bold(),
            summary.edges.to_string().bright_white().bold(),
        ));

        if summary.records > 0 {
            lines.push(format!(
                "   {} records • {} users • {} accounts • {} CPU seconds",
                summary.records.to_string().bright_cyan(),
                summary.users.to_string().bright_cyan(),
                summary.accounts.to_string().bright_cyan(),
                summary.grand_total_cpu_seconds.to_string().bright_green(),
            ));
        }

        lines.push(format!(
            "   {} groups resolved, {} skipped",
            summary.groups_resolved.to_string().bright_cyan(),
            summary.groups_skipped.to_string().bright_yellow(),
        ));

        if summary.staff_members_skipped > 0 {
            lines.push(format!(
                "   {} staff memberships hidden",
                summary.staff_members_skipped.to_string().bright_yellow()
            ));
        }
        if summary.unresolved_members > 0 {
            lines.push(format!(
                "   {} {} nested group references ignored",
                "⚠️ ".bright_yellow(),
                summary.unresolved_members.to_string().bright_yellow()
            ));
        }

        lines.push(format!(
            "   {} {}",
            summary.output.nodes.display().to_string().bright_white(),
            summary.output.edges.display().to_string().bright_white(),
        ));

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputPaths, Variant};
    use std::path::PathBuf;

    fn summary() -> RunSummary {
        RunSummary {
            run_id: "run-1".to_string(),
            variant: Variant::Weighted,
            records: 2,
            users: 2,
            accounts: 1,
            grand_total_cpu_seconds: 150,
            groups_resolved: 1,
            groups_skipped: 0,
            group_nodes: 1,
            user_nodes: 2,
            edges: 2,
            staff_members_skipped: 0,
            unresolved_members: 1,
            output: OutputPaths {
                nodes: PathBuf::from("nodes.csv"),
                edges: PathBuf::from("edges.csv"),
            },
        }
    }

    #[test]
    fn test_render_json() {
        let json = SummaryDisplay::new().render_json(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["variant"], "weighted");
        assert_eq!(value["edges"], 2);
        assert_eq!(value["unresolvedMembers"], 1);
        assert_eq!(value["output"]["nodesFile"], "nodes.csv");
    }

    #[test]
    fn test_render_text() {
        colored::control::set_override(false);
        let text = SummaryDisplay::new().render_text(&summary());
        assert!(text.contains("weighted graph written (1 groups, 2 user rows, 2 edges)"));
        assert!(text.contains("nested group references ignored"));
        assert!(!text.contains("staff memberships hidden"));
    }
}
