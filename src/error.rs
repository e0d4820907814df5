//! Error types for the accounting-to-graph pipeline
//!
//! Every fatal condition of a run maps onto one [`NetplotError`] variant. Two
//! conditions are deliberately absent: an all-zero usage log normalizes to
//! zero colors, and sub-group member references are dropped silently (they
//! are only counted in the run summary).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetplotError {
    #[error("Cannot read accounting log {path}: {source}")]
    InputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No accounting log given (required for the weighted variant)")]
    InputMissing,

    #[error("Malformed accounting record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Accounting command failed: {0}")]
    AccountingCommand(String),

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Directory authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid directory snapshot {path}: {reason}")]
    Snapshot { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for library operations
pub type Result<T> = std::result::Result<T, NetplotError>;
