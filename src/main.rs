use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process;

use usage_netplot::analyzer::{GroupSource, RunRequest, UsageSource};
use usage_netplot::config::Config;
use usage_netplot::logging::init_logging;
use usage_netplot::models::Variant;
use usage_netplot::NetplotAnalyzer;

#[derive(Parser)]
#[command(name = "usage-netplot")]
#[command(about = "Build Gephi node/edge CSVs from cluster CPU accounting and LDAP group membership")]
#[command(version)]
struct Cli {
    /// Accounting log (`user|account|cpuSeconds` per line), e.g. from
    /// `sacct -a -P -n -s CD -o User,Account,CPUTimeRAW`
    input: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run sacct for jobs completed since this date (YYYY-MM-DD) instead of reading INPUT
    #[arg(long, value_name = "DATE", conflicts_with = "input")]
    since: Option<String>,

    /// Read groups from a JSON snapshot instead of querying LDAP
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Save the resolved groups as a JSON snapshot
    #[arg(long, value_name = "PATH")]
    save_snapshot: Option<PathBuf>,

    /// Node table flavour
    #[arg(long, value_enum)]
    variant: Option<Variant>,

    /// Keep members of staff groups in the graph
    #[arg(long)]
    include_staff: bool,

    /// Show usernames as labels on user nodes
    #[arg(long)]
    labels: bool,

    /// Additional group to leave out (repeatable)
    #[arg(long = "skip-group", value_name = "NAME")]
    skip_groups: Vec<String>,

    /// Directory for nodes.csv and edges.csv
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut Config) {
        if let Some(variant) = self.variant {
            config.graph.variant = variant;
        }
        if self.include_staff {
            config.graph.include_staff_users = true;
        }
        if self.labels {
            config.graph.username_labels = true;
        }
        for group in &self.skip_groups {
            if !config.graph.groups_to_skip.contains(group) {
                config.graph.groups_to_skip.push(group.clone());
            }
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
    }

    fn request(&self) -> Result<RunRequest> {
        let usage = match (&self.input, &self.since) {
            (Some(path), _) => UsageSource::File(path.clone()),
            (None, Some(since)) => {
                let date = chrono::NaiveDate::parse_from_str(since, "%Y-%m-%d").with_context(
                    || format!("Invalid since date format: {}. Use YYYY-MM-DD", since),
                )?;
                UsageSource::Sacct { since: date }
            }
            (None, None) => UsageSource::None,
        };

        let groups = match &self.snapshot {
            Some(path) => GroupSource::Snapshot(path.clone()),
            None => GroupSource::Ldap,
        };

        Ok(RunRequest {
            usage,
            groups,
            save_snapshot: self.save_snapshot.clone(),
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = cli.json;

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return handle_error(e, json),
    };
    cli.apply_to(&mut config);
    if let Err(e) = config.validate() {
        return handle_error(e, json);
    }

    let log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => return handle_error(e, json),
    };

    let request = match cli.request() {
        Ok(request) => request,
        Err(e) => return handle_error(e, json),
    };

    let analyzer = NetplotAnalyzer::new(config);
    let result = analyzer.run_command(request, json).await;

    // Flush file logs before a possible process::exit
    drop(log_guard);

    match result {
        Ok(_) => Ok(()),
        Err(e) => handle_error(e, json),
    }
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<(), anyhow::Error> {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
