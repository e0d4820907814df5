#![allow(dead_code)]

use anyhow::Result;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

pub const USERS_BASE: &str = "cn=users,cn=accounts,dc=arcc,dc=uwyo,dc=edu";
pub const GROUPS_BASE: &str = "cn=groups,cn=accounts,dc=arcc,dc=uwyo,dc=edu";

pub fn user_dn(uid: &str) -> String {
    format!("uid={},{}", uid, USERS_BASE)
}

pub fn group_dn(cn: &str) -> String {
    format!("cn={},{}", cn, GROUPS_BASE)
}

pub fn write_log(dir: &Path, lines: &[&str]) -> Result<PathBuf> {
    let path = dir.join("cputime.txt");
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(&path, content)?;
    Ok(path)
}

/// Write a directory snapshot. Members are given as uids; entries starting
/// with `cn=` are treated as sub-group names.
pub fn write_snapshot(dir: &Path, groups: &[(&str, &[&str])]) -> Result<PathBuf> {
    let path = dir.join("groups.json");
    let entries: Vec<_> = groups
        .iter()
        .map(|(name, members)| {
            let members: Vec<String> = members
                .iter()
                .map(|m| match m.strip_prefix("cn=") {
                    Some(sub) => group_dn(sub),
                    None => user_dn(m),
                })
                .collect();
            json!({ "name": name, "members": members })
        })
        .collect();
    fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
    Ok(path)
}

/// Parse a CSV file into rows of fields, header included.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}
