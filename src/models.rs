//! Core Data Models
//!
//! Data structures shared by every stage of the pipeline, from a single parsed
//! accounting line up to the emitted graph.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`UsageRecord`] - one `user|account|cpuSeconds` line
//! 2. **Aggregation**: [`UsageTotals`] - per-user and per-account CPU time sums
//! 3. **Membership**: [`Group`] - a directory group with its raw member references
//! 4. **Output**: [`Graph`] - [`Node`] and [`Edge`] rows ready for the CSV sink
//! 5. **Reporting**: [`RunSummary`] - counts describing one completed run

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Which flavour of node table to produce.
///
/// `Weighted` colors nodes by normalized CPU time and carries a `Type`
/// column. `Simplified` needs no accounting log; color is a plain
/// group/user discriminator and the `Type` column is omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Weighted,
    Simplified,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Weighted => "weighted",
            Variant::Simplified => "simplified",
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" => Ok(Variant::Weighted),
            "simplified" => Ok(Variant::Simplified),
            other => Err(format!("unknown variant '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub user: String,
    pub account: String,
    pub cpu_seconds: u64,
}

/// Exact integer CPU time sums built from the accounting log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub user_totals: HashMap<String, u64>,
    pub account_totals: HashMap<String, u64>,
    pub grand_total: u64,
    /// Records that contributed to the sums
    pub records: usize,
    /// Lines dropped because the user field was empty, the line was blank,
    /// or (with `skip_malformed`) the line did not parse
    pub skipped_lines: usize,
}

impl UsageTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record to every sum. Returns `None` and leaves the totals
    /// untouched if any sum would exceed `u64::MAX`.
    pub fn add(&mut self, record: &UsageRecord) -> Option<()> {
        let cpu = record.cpu_seconds;
        let user = self.user(&record.user).checked_add(cpu)?;
        let account = self.account(&record.account).checked_add(cpu)?;
        let grand_total = self.grand_total.checked_add(cpu)?;

        self.user_totals.insert(record.user.clone(), user);
        self.account_totals.insert(record.account.clone(), account);
        self.grand_total = grand_total;
        self.records += 1;
        Some(())
    }

    pub fn user(&self, user: &str) -> u64 {
        self.user_totals.get(user).copied().unwrap_or(0)
    }

    pub fn account(&self, account: &str) -> u64 {
        self.account_totals.get(account).copied().unwrap_or(0)
    }

    pub fn max_user(&self) -> u64 {
        self.user_totals.values().copied().max().unwrap_or(0)
    }

    pub fn max_account(&self) -> u64 {
        self.account_totals.values().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// A directory group and its raw member references, in directory order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    User,
    Group,
}

impl NodeKind {
    /// Value of the `Type` column: groups are 1, users are 0
    pub fn type_code(&self) -> u8 {
        match self {
            NodeKind::Group => 1,
            NodeKind::User => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub color: f64,
    pub size: u32,
    pub kind: NodeKind,
}

/// Directed membership edge: `source` (user) belongs to `target` (group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub target: String,
    pub source: String,
}

/// Counters collected while building the graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub groups_skipped: usize,
    pub staff_members_skipped: usize,
    pub unresolved_members: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stats: BuildStats,
}

impl Graph {
    pub fn group_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Group)
    }

    pub fn user_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::User)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputPaths {
    #[serde(rename = "nodesFile")]
    pub nodes: PathBuf,
    #[serde(rename = "edgesFile")]
    pub edges: PathBuf,
}

/// Everything a caller may want to report about one completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(rename = "runId")]
    pub run_id: String,
    pub variant: Variant,
    pub records: usize,
    pub users: usize,
    pub accounts: usize,
    #[serde(rename = "grandTotalCpuSeconds")]
    pub grand_total_cpu_seconds: u64,
    #[serde(rename = "groupsResolved")]
    pub groups_resolved: usize,
    #[serde(rename = "groupsSkipped")]
    pub groups_skipped: usize,
    #[serde(rename = "groupNodes")]
    pub group_nodes: usize,
    #[serde(rename = "userNodes")]
    pub user_nodes: usize,
    pub edges: usize,
    #[serde(rename = "staffMembersSkipped")]
    pub staff_members_skipped: usize,
    #[serde(rename = "unresolvedMembers")]
    pub unresolved_members: usize,
    pub output: OutputPaths,
}
