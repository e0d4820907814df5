//! Accounting log aggregation
//!
//! Reads `user|account|cpuSeconds` lines (the output of
//! `sacct -a -P -n -s CD -o User,Account,CPUTimeRAW`) and sums CPU time per
//! user and per account. Sums are exact `u64` arithmetic.
//!
//! Lines whose user field is empty are job steps with no owner and are
//! skipped, as are blank lines. Anything else that does not have exactly
//! three fields with an integer third field is a malformed record: fatal by
//! default, skipped with a warning when `skip_malformed` is set. A record
//! that would push any sum past `u64::MAX` is treated the same way.

use crate::config::AccountingConfig;
use crate::error::{NetplotError, Result};
use crate::models::{UsageRecord, UsageTotals};
use chrono::NaiveDate;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

pub struct UsageAggregator {
    delimiter: char,
    skip_malformed: bool,
}

impl Default for UsageAggregator {
    fn default() -> Self {
        Self::new(&AccountingConfig::default())
    }
}

impl UsageAggregator {
    pub fn new(config: &AccountingConfig) -> Self {
        Self {
            delimiter: config.field_delimiter,
            skip_malformed: config.skip_malformed,
        }
    }

    /// Parse one line. `Ok(None)` means the line carries no attributable usage.
    pub fn parse_line(&self, line: &str, line_number: usize) -> Result<Option<UsageRecord>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split(self.delimiter).collect();
        let user = fields[0].trim();
        if user.is_empty() {
            return Ok(None);
        }

        if fields.len() != 3 {
            return Err(NetplotError::MalformedRecord {
                line: line_number,
                reason: format!("expected 3 fields, found {}", fields.len()),
            });
        }

        let raw_cpu = fields[2].trim();
        let cpu_seconds = raw_cpu
            .parse::<u64>()
            .map_err(|_| NetplotError::MalformedRecord {
                line: line_number,
                reason: format!("CPU time '{}' is not a non-negative integer", raw_cpu),
            })?;

        Ok(Some(UsageRecord {
            user: user.to_string(),
            account: fields[1].trim().to_string(),
            cpu_seconds,
        }))
    }

    pub fn aggregate<I, S>(&self, lines: I) -> Result<UsageTotals>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut totals = UsageTotals::new();
        for (index, line) in lines.into_iter().enumerate() {
            self.accumulate(&mut totals, line.as_ref(), index + 1)?;
        }

        if totals.is_empty() {
            warn!("Accounting input contained no usable records");
        }
        debug!(
            records = totals.records,
            skipped = totals.skipped_lines,
            users = totals.user_totals.len(),
            accounts = totals.account_totals.len(),
            grand_total = totals.grand_total,
            "Aggregated accounting records"
        );
        Ok(totals)
    }

    fn accumulate(&self, totals: &mut UsageTotals, line: &str, line_number: usize) -> Result<()> {
        let result = self
            .parse_line(line, line_number)
            .and_then(|record| match record {
                Some(record) => Self::add_record(totals, &record, line_number).map(|()| true),
                None => Ok(false),
            });

        match result {
            Ok(true) => {}
            Ok(false) => totals.skipped_lines += 1,
            Err(e) if self.skip_malformed => {
                warn!(line = line_number, error = %e, "Skipping malformed accounting record");
                totals.skipped_lines += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn add_record(totals: &mut UsageTotals, record: &UsageRecord, line_number: usize) -> Result<()> {
        totals.add(record).ok_or_else(|| NetplotError::MalformedRecord {
            line: line_number,
            reason: format!(
                "adding {} CPU seconds for {}/{} overflows the totals",
                record.cpu_seconds, record.user, record.account
            ),
        })
    }

    pub fn aggregate_file(&self, path: &Path) -> Result<UsageTotals> {
        let file = File::open(path).map_err(|source| NetplotError::InputUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "Reading accounting log");
        let reader = BufReader::new(file);
        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(line.map_err(|source| NetplotError::InputUnavailable {
                path: path.to_path_buf(),
                source,
            })?);
        }

        self.aggregate(lines)
    }

    /// Run `sacct` for jobs completed since `since` and aggregate its output.
    pub async fn collect_from_sacct(&self, since: NaiveDate) -> Result<UsageTotals> {
        let args = sacct_args(since);
        info!(since = %since, "Collecting accounting data via sacct");
        self.aggregate_command_output("sacct", &args).await
    }

    pub(crate) async fn aggregate_command_output(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<UsageTotals> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                NetplotError::AccountingCommand(format!("failed to execute {}: {}", program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                exit_code = output.status.code(),
                stderr = %stderr,
                "Accounting command failed"
            );
            return Err(NetplotError::AccountingCommand(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        self.aggregate(stdout.lines())
    }
}

/// Arguments for pipe-separated, headerless output of completed jobs.
pub fn sacct_args(since: NaiveDate) -> Vec<String> {
    let start = since.format("%m%d%y").to_string();
    [
        "--starttime",
        start.as_str(),
        "-a",
        "-P",
        "-n",
        "-s",
        "CD",
        "-o",
        "User,Account,CPUTimeRAW",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let aggregator = UsageAggregator::default();
        let record = aggregator.parse_line("alice|proj1|100\n", 1).unwrap().unwrap();
        assert_eq!(record.user, "alice");
        assert_eq!(record.account, "proj1");
        assert_eq!(record.cpu_seconds, 100);
    }

    #[test]
    fn test_empty_user_and_blank_lines_skipped() {
        let aggregator = UsageAggregator::default();
        assert!(aggregator.parse_line("|proj1|100", 1).unwrap().is_none());
        assert!(aggregator.parse_line("   ", 2).unwrap().is_none());
        // unattributed steps often have fewer fields; they are still just skipped
        assert!(aggregator.parse_line("||", 3).unwrap().is_none());
    }

    #[test]
    fn test_malformed_cpu_time() {
        let aggregator = UsageAggregator::default();
        let err = aggregator.parse_line("alice|proj1|abc", 7).unwrap_err();
        assert!(matches!(err, NetplotError::MalformedRecord { line: 7, .. }));
        assert!(aggregator.parse_line("alice|proj1|-5", 1).is_err());
    }

    #[test]
    fn test_wrong_field_count() {
        let aggregator = UsageAggregator::default();
        assert!(aggregator.parse_line("alice|proj1", 1).is_err());
        assert!(aggregator.parse_line("alice|proj1|1|2", 1).is_err());
    }

    #[test]
    fn test_aggregate_sums() {
        let aggregator = UsageAggregator::default();
        let totals = aggregator
            .aggregate(["alice|proj1|100", "bob|proj1|50", "alice|proj2|25", "|proj2|999", ""])
            .unwrap();
        assert_eq!(totals.user("alice"), 125);
        assert_eq!(totals.user("bob"), 50);
        assert_eq!(totals.account("proj1"), 150);
        assert_eq!(totals.account("proj2"), 25);
        assert_eq!(totals.grand_total, 175);
        assert_eq!(totals.records, 3);
        assert_eq!(totals.skipped_lines, 2);
    }

    #[test]
    fn test_overflowing_sum_is_malformed() {
        let aggregator = UsageAggregator::default();
        let err = aggregator
            .aggregate(["alice|p|18446744073709551615", "bob|p|1"])
            .unwrap_err();
        assert!(matches!(err, NetplotError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_overflowing_record_skipped_in_lenient_mode() {
        let aggregator = UsageAggregator::new(&AccountingConfig {
            field_delimiter: '|',
            skip_malformed: true,
        });
        let totals = aggregator
            .aggregate(["alice|p|18446744073709551615", "bob|p|1", "bob|q|1"])
            .unwrap();
        assert_eq!(totals.account("p"), u64::MAX);
        assert_eq!(totals.user("bob"), 1);
        assert_eq!(totals.grand_total, u64::MAX);
        assert_eq!(totals.records, 1);
        assert_eq!(totals.skipped_lines, 2);
    }

    #[test]
    fn test_fields_trimmed_individually() {
        let aggregator = UsageAggregator::default();
        let record = aggregator
            .parse_line(" alice | proj1 | 100 ", 1)
            .unwrap()
            .unwrap();
        assert_eq!(record.user, "alice");
        assert_eq!(record.account, "proj1");
    }

    #[test]
    fn test_skip_malformed_mode() {
        let aggregator = UsageAggregator::new(&AccountingConfig {
            field_delimiter: '|',
            skip_malformed: true,
        });
        let totals = aggregator
            .aggregate(["alice|proj1|100", "bob|proj1|lots"])
            .unwrap();
        assert_eq!(totals.grand_total, 100);
        assert_eq!(totals.skipped_lines, 1);
    }

    #[test]
    fn test_strict_mode_fails_whole_run() {
        let aggregator = UsageAggregator::default();
        let result = aggregator.aggregate(["alice|proj1|100", "bob|proj1|lots"]);
        assert!(matches!(
            result,
            Err(NetplotError::MalformedRecord { line: 2, .. })
        ));
    }

    #[test]
    fn test_empty_input_gives_empty_totals() {
        let aggregator = UsageAggregator::default();
        let totals = aggregator.aggregate(Vec::<String>::new()).unwrap();
        assert!(totals.is_empty());
        assert_eq!(totals.grand_total, 0);
    }

    #[test]
    fn test_missing_file() {
        let aggregator = UsageAggregator::default();
        let err = aggregator
            .aggregate_file(Path::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(matches!(err, NetplotError::InputUnavailable { .. }));
    }

    #[test]
    fn test_sacct_args() {
        let since = NaiveDate::from_ymd_opt(2016, 6, 1).unwrap();
        let args = sacct_args(since);
        assert_eq!(args[0], "--starttime");
        assert_eq!(args[1], "060116");
        assert_eq!(args.last().map(String::as_str), Some("User,Account,CPUTimeRAW"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_aggregated() {
        let aggregator = UsageAggregator::default();
        let args = vec!["-c".to_string(), "printf 'alice|proj1|10\\nbob|proj1|5\\n'".to_string()];
        let totals = aggregator.aggregate_command_output("sh", &args).await.unwrap();
        assert_eq!(totals.account("proj1"), 15);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure() {
        let aggregator = UsageAggregator::default();
        let args = vec!["-c".to_string(), "echo nope >&2; exit 3".to_string()];
        let err = aggregator
            .aggregate_command_output("sh", &args)
            .await
            .unwrap_err();
        assert!(matches!(err, NetplotError::AccountingCommand(_)));
    }
}
