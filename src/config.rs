//! Configuration system
//!
//! Provides configuration management with:
//! - Config file loading (optional, TOML)
//! - Environment variable overrides
//! - Runtime defaults matching the Mt Moran deployment
//! - Validation before any input is touched
//!
//! Precedence is defaults < file < environment < command line flags. The
//! configuration is built once at startup and passed down explicitly.

use crate::models::Variant;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Directory server connection and query scope
    pub directory: DirectoryConfig,

    /// Graph inclusion and presentation policy
    pub graph: GraphConfig,

    /// Accounting log parsing
    pub accounting: AccountingConfig,

    /// Output file locations
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub uri: String,
    pub base_dn: String,
    pub parent_group_dn: String,
    pub starttls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub groups_to_skip: Vec<String>,
    pub staff_groups: Vec<String>,
    pub include_staff_users: bool,
    pub username_labels: bool,
    pub variant: Variant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    pub field_delimiter: char,
    pub skip_malformed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub nodes_file: String,
    pub edges_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            uri: "ldap://arccidm1.arcc.uwyo.edu".to_string(),
            base_dn: "dc=arcc,dc=uwyo,dc=edu".to_string(),
            parent_group_dn: "cn=mountmoran,cn=groups,cn=accounts,dc=arcc,dc=uwyo,dc=edu"
                .to_string(),
            starttls: true,
            bind_dn: None,
            bind_password: None,
            timeout_secs: 30,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            groups_to_skip: vec![
                "arcc".to_string(),
                "arccinterns".to_string(),
                "bc-201606".to_string(),
            ],
            staff_groups: vec!["arcc".to_string(), "arccinterns".to_string()],
            include_staff_users: false,
            username_labels: false,
            variant: Variant::Weighted,
        }
    }
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            field_delimiter: '|',
            skip_malformed: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            nodes_file: "nodes.csv".to_string(),
            edges_file: "edges.csv".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, or the first file found in
    /// the default locations, then apply environment overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default_file()?,
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn load_default_file() -> Result<Self> {
        let config_paths = [
            PathBuf::from("usage-netplot.toml"),
            PathBuf::from(".usage-netplot.toml"),
            dirs::config_dir()
                .map(|d| d.join("usage-netplot").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                return Self::load_from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }
        if let Ok(val) = env::var("NETPLOT_LOG_DIR") {
            self.logging.directory = PathBuf::from(val);
        }

        // Directory overrides
        if let Ok(val) = env::var("NETPLOT_LDAP_URI") {
            self.directory.uri = val;
        }
        if let Ok(val) = env::var("NETPLOT_BASE_DN") {
            self.directory.base_dn = val;
        }
        if let Ok(val) = env::var("NETPLOT_PARENT_GROUP_DN") {
            self.directory.parent_group_dn = val;
        }
        if let Ok(val) = env::var("NETPLOT_BIND_DN") {
            self.directory.bind_dn = Some(val);
        }
        if let Ok(val) = env::var("NETPLOT_BIND_PASSWORD") {
            self.directory.bind_password = Some(val);
        }

        // Graph overrides
        if let Ok(val) = env::var("NETPLOT_INCLUDE_STAFF") {
            self.graph.include_staff_users = val
                .parse()
                .context("Invalid NETPLOT_INCLUDE_STAFF")?;
        }
        if let Ok(val) = env::var("NETPLOT_USERNAME_LABELS") {
            self.graph.username_labels = val
                .parse()
                .context("Invalid NETPLOT_USERNAME_LABELS")?;
        }
        if let Ok(val) = env::var("NETPLOT_VARIANT") {
            self.graph.variant = val
                .parse()
                .map_err(|e: String| anyhow::anyhow!("Invalid NETPLOT_VARIANT: {}", e))?;
        }

        // Output overrides
        if let Ok(val) = env::var("NETPLOT_OUTPUT_DIR") {
            self.output.directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let uri = self.directory.uri.trim();
        if uri.is_empty() {
            return Err(anyhow::anyhow!("Directory URI must not be empty"));
        }
        if !["ldap://", "ldaps://", "ldapi://"]
            .iter()
            .any(|scheme| uri.starts_with(scheme))
        {
            return Err(anyhow::anyhow!(
                "Directory URI must start with ldap://, ldaps:// or ldapi://, got {}",
                uri
            ));
        }
        if self.directory.base_dn.trim().is_empty() {
            return Err(anyhow::anyhow!("Search base DN must not be empty"));
        }
        if self.directory.parent_group_dn.trim().is_empty() {
            return Err(anyhow::anyhow!("Parent group DN must not be empty"));
        }
        if self.directory.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Directory timeout must be greater than 0"));
        }

        if self.output.nodes_file.trim().is_empty() || self.output.edges_file.trim().is_empty() {
            return Err(anyhow::anyhow!("Output file names must not be empty"));
        }
        if self.output.nodes_file == self.output.edges_file {
            return Err(anyhow::anyhow!(
                "Node and edge outputs must be different files, both are {}",
                self.output.nodes_file
            ));
        }

        if self.accounting.field_delimiter.is_whitespace() {
            return Err(anyhow::anyhow!("Field delimiter must not be whitespace"));
        }

        Ok(())
    }
}
