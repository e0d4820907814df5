//! Usage Netplot Library
//!
//! Turns two independent data sources into a graph for network visualization
//! tools such as Gephi:
//!
//! - a cluster accounting log of `user|account|cpuSeconds` lines
//! - the directory groups that are members of one parent group
//!
//! Groups and users become nodes, memberships become edges, and CPU time
//! drives node color.
//!
//! ## Architecture Overview
//!
//! - [`aggregator`] - accounting log parsing and per-user/per-account sums
//! - [`directory`] - group membership lookup (LDAP or JSON snapshot)
//! - [`member`] - distinguished-name parsing and user identity extraction
//! - [`policy`] - skip-list and staff exclusion rules
//! - [`graph`] - node and edge construction with color normalization
//! - [`output`] - atomic `nodes.csv` / `edges.csv` writing
//! - [`analyzer`] - end-to-end run orchestration
//! - [`config`] - configuration with file and environment support
//! - [`logging`] - structured logging setup
//! - [`display`] - run summary output
//!
//! ## Main Entry Point
//!
//! ```rust,no_run
//! use usage_netplot::{NetplotAnalyzer, Config};
//! use usage_netplot::analyzer::{GroupSource, RunRequest, UsageSource};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let analyzer = NetplotAnalyzer::new(Config::default());
//! let request = RunRequest {
//!     usage: UsageSource::File("cputime.txt".into()),
//!     groups: GroupSource::Ldap,
//!     save_snapshot: None,
//! };
//! let summary = analyzer.run(request).await?;
//! println!("{} edges", summary.edges);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod analyzer;
pub mod config;
pub mod directory;
pub mod display;
pub mod error;
pub mod graph;
pub mod logging;
pub mod member;
pub mod models;
pub mod output;
pub mod policy;

pub use analyzer::NetplotAnalyzer;
pub use config::Config;
pub use error::{NetplotError, Result};
pub use models::*;
