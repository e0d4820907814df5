//! Run orchestration
//!
//! [`NetplotAnalyzer`] drives one batch run end to end:
//!
//! 1. **Accounting**: aggregate the log file (or `sacct` output) into totals.
//!    This happens first so a missing log aborts before the directory is
//!    contacted. The simplified variant skips this step.
//! 2. **Membership**: resolve groups from LDAP or a JSON snapshot, optionally
//!    saving them as a snapshot.
//! 3. **Policy**: build the exclusion policy, collecting staff members from
//!    the resolved groups.
//! 4. **Graph**: build node and edge rows.
//! 5. **Output**: write both CSV files atomically and report a summary.
//!
//! Any error aborts the run; no CSV is replaced unless both are written.

use crate::aggregator::UsageAggregator;
use crate::config::Config;
use crate::directory::{save_snapshot, LdapDirectory, MembershipResolver, SnapshotDirectory};
use crate::display::SummaryDisplay;
use crate::error::NetplotError;
use crate::graph::GraphBuilder;
use crate::models::{Group, RunSummary, UsageTotals, Variant};
use crate::output::CsvSink;
use crate::policy::ExclusionPolicy;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Where accounting data comes from
#[derive(Debug, Clone)]
pub enum UsageSource {
    File(PathBuf),
    Sacct { since: NaiveDate },
    None,
}

/// Where group membership comes from
#[derive(Debug, Clone)]
pub enum GroupSource {
    Ldap,
    Snapshot(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub usage: UsageSource,
    pub groups: GroupSource,
    pub save_snapshot: Option<PathBuf>,
}

pub struct NetplotAnalyzer {
    config: Config,
    display: SummaryDisplay,
}

impl NetplotAnalyzer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            display: SummaryDisplay::new(),
        }
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("netplot_run", run_id = %run_id);
        self.run_inner(request, run_id).instrument(span).await
    }

    async fn run_inner(&self, request: RunRequest, run_id: String) -> Result<RunSummary> {
        let variant = self.config.graph.variant;
        let totals = self.load_usage(&request.usage, variant).await?;
        let groups = self.load_groups(&request.groups).await?;

        if let Some(path) = &request.save_snapshot {
            save_snapshot(path, &groups)
                .with_context(|| format!("Failed to save snapshot to {}", path.display()))?;
        }

        let policy = ExclusionPolicy::from_config(&self.config.graph, &groups);
        let graph = GraphBuilder::new(&policy, variant, self.config.graph.username_labels)
            .build(&groups, &totals);

        let output = CsvSink::new(&self.config.output, variant)
            .write(&graph)
            .context("Failed to write graph CSV files")?;

        let summary = RunSummary {
            run_id,
            variant,
            records: totals.records,
            users: totals.user_totals.len(),
            accounts: totals.account_totals.len(),
            grand_total_cpu_seconds: totals.grand_total,
            groups_resolved: groups.len(),
            groups_skipped: graph.stats.groups_skipped,
            group_nodes: graph.group_nodes().count(),
            user_nodes: graph.user_nodes().count(),
            edges: graph.edges.len(),
            staff_members_skipped: graph.stats.staff_members_skipped,
            unresolved_members: graph.stats.unresolved_members,
            output,
        };

        info!(
            groups = summary.group_nodes,
            users = summary.user_nodes,
            edges = summary.edges,
            unresolved = summary.unresolved_members,
            "Run complete"
        );
        Ok(summary)
    }

    async fn load_usage(&self, source: &UsageSource, variant: Variant) -> Result<UsageTotals> {
        if variant == Variant::Simplified {
            if !matches!(source, UsageSource::None) {
                info!("Simplified variant ignores accounting input");
            }
            return Ok(UsageTotals::new());
        }

        let aggregator = UsageAggregator::new(&self.config.accounting);
        let totals = match source {
            UsageSource::File(path) => aggregator.aggregate_file(path)?,
            UsageSource::Sacct { since } => aggregator.collect_from_sacct(*since).await?,
            UsageSource::None => return Err(NetplotError::InputMissing.into()),
        };
        Ok(totals)
    }

    async fn load_groups(&self, source: &GroupSource) -> Result<Vec<Group>> {
        let resolver = MembershipResolver::from_config(&self.config.directory);
        let groups = match source {
            GroupSource::Ldap => {
                let session = LdapDirectory::connect(&self.config.directory).await?;
                resolver.resolve_groups(session).await?
            }
            GroupSource::Snapshot(path) => {
                resolver
                    .resolve_groups(SnapshotDirectory::open(path)?)
                    .await?
            }
        };
        Ok(groups)
    }

    /// Run and print the summary.
    pub async fn run_command(&self, request: RunRequest, json_output: bool) -> Result<RunSummary> {
        let summary = self.run(request).await?;
        self.display.display(&summary, json_output)?;
        Ok(summary)
    }
}
