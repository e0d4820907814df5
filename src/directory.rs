//! Directory group membership
//!
//! [`MembershipResolver`] asks a [`DirectoryClient`] for every group that is a
//! direct member of the parent group and returns them in directory order.
//! Member references are returned raw; nested groups are not followed.
//!
//! Two clients exist:
//! - [`LdapDirectory`] - a live LDAP session (StartTLS + simple bind)
//! - [`SnapshotDirectory`] - groups loaded from a JSON snapshot, for offline
//!   and reproducible runs
//!
//! The resolver owns the session it is given and closes it on every exit
//! path, successful or not.

use crate::config::DirectoryConfig;
use crate::error::{NetplotError, Result};
use crate::models::Group;
use crate::member::parse_dn;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A read-only source of group entries.
#[allow(async_fn_in_trait)]
pub trait DirectoryClient {
    /// Subtree search under `base_dn` for entries that are direct members of
    /// `parent_group_dn`.
    async fn search_groups(&mut self, base_dn: &str, parent_group_dn: &str) -> Result<Vec<Group>>;

    /// Release the session.
    async fn close(self) -> Result<()>;
}

pub struct MembershipResolver {
    base_dn: String,
    parent_group_dn: String,
}

impl MembershipResolver {
    pub fn new(base_dn: impl Into<String>, parent_group_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            parent_group_dn: parent_group_dn.into(),
        }
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(&config.base_dn, &config.parent_group_dn)
    }

    pub async fn resolve_groups<D: DirectoryClient>(&self, mut client: D) -> Result<Vec<Group>> {
        let result = client
            .search_groups(&self.base_dn, &self.parent_group_dn)
            .await;

        if let Err(e) = client.close().await {
            warn!(error = %e, "Failed to close directory session cleanly");
        }

        let groups = result?;
        info!(
            groups = groups.len(),
            parent = %self.parent_group_dn,
            "Resolved directory groups"
        );
        Ok(groups)
    }
}

/// DN and password for the simple bind. A password without a DN is
/// ignored and the bind is anonymous.
fn bind_credentials(config: &DirectoryConfig) -> (&str, &str) {
    match config.bind_dn.as_deref() {
        Some(dn) => (dn, config.bind_password.as_deref().unwrap_or("")),
        None => {
            if config.bind_password.is_some() {
                warn!("Bind password set without bind DN, binding anonymously");
            }
            ("", "")
        }
    }
}

pub fn member_of_filter(parent_group_dn: &str) -> String {
    format!("(memberOf={})", ldap3::ldap_escape(parent_group_dn))
}

/// Build a [`Group`] from a search entry's DN and attributes.
///
/// The group name is the first `cn` value, falling back to the value of the
/// entry's first RDN. A missing `member` attribute is an empty group.
pub fn group_from_attrs(dn: &str, mut attrs: HashMap<String, Vec<String>>) -> Group {
    let cn = take_attr(&mut attrs, "cn").and_then(|values| values.into_iter().next());
    let name = cn.unwrap_or_else(|| first_rdn_value(dn).unwrap_or_else(|| dn.to_string()));
    let members = take_attr(&mut attrs, "member").unwrap_or_default();
    Group { name, members }
}

fn take_attr(attrs: &mut HashMap<String, Vec<String>>, name: &str) -> Option<Vec<String>> {
    let key = attrs.keys().find(|k| k.eq_ignore_ascii_case(name))?.clone();
    attrs.remove(&key)
}

fn first_rdn_value(dn: &str) -> Option<String> {
    let rdns = parse_dn(dn).ok()?;
    let first = rdns.first()?.attributes().first()?;
    Some(first.value.clone())
}

/// A bound LDAP session.
pub struct LdapDirectory {
    ldap: Ldap,
    timeout: Duration,
}

impl LdapDirectory {
    /// Connect (upgrading with StartTLS when configured) and bind.
    ///
    /// Without a bind DN the bind is anonymous.
    pub async fn connect(config: &DirectoryConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let use_starttls = config.starttls && config.uri.starts_with("ldap://");
        let settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_starttls(use_starttls);

        debug!(uri = %config.uri, starttls = use_starttls, "Connecting to directory");
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &config.uri)
            .await
            .map_err(|e| {
                NetplotError::DirectoryUnavailable(format!("connect to {}: {}", config.uri, e))
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection error");
            }
        });

        let (bind_dn, bind_password) = bind_credentials(config);

        let bound = ldap
            .with_timeout(timeout)
            .simple_bind(bind_dn, bind_password)
            .await
            .and_then(|result| result.success());
        if let Err(e) = bound {
            let _ = ldap.unbind().await;
            return Err(NetplotError::AuthenticationFailed(e.to_string()));
        }

        info!(uri = %config.uri, anonymous = bind_dn.is_empty(), "Bound to directory");
        Ok(Self { ldap, timeout })
    }
}

impl DirectoryClient for LdapDirectory {
    async fn search_groups(&mut self, base_dn: &str, parent_group_dn: &str) -> Result<Vec<Group>> {
        let filter = member_of_filter(parent_group_dn);
        debug!(base = %base_dn, filter = %filter, "Searching directory");

        let (entries, _result) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base_dn, Scope::Subtree, &filter, vec!["cn", "member"])
            .await
            .and_then(|search| search.success())
            .map_err(|e| NetplotError::DirectoryUnavailable(format!("search failed: {}", e)))?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                group_from_attrs(&entry.dn, entry.attrs)
            })
            .collect())
    }

    async fn close(mut self) -> Result<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| NetplotError::DirectoryUnavailable(format!("unbind failed: {}", e)))
    }
}

/// Groups captured earlier with [`save_snapshot`] (or written by hand).
///
/// The snapshot already is the result of the parent-group search, so the
/// search scope arguments are ignored.
pub struct SnapshotDirectory {
    groups: Vec<Group>,
}

impl SnapshotDirectory {
    pub fn from_groups(groups: Vec<Group>) -> Self {
        Self { groups }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| NetplotError::Snapshot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let groups: Vec<Group> =
            serde_json::from_str(&content).map_err(|e| NetplotError::Snapshot {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        info!(path = %path.display(), groups = groups.len(), "Loaded directory snapshot");
        Ok(Self { groups })
    }
}

impl DirectoryClient for SnapshotDirectory {
    async fn search_groups(&mut self, base_dn: &str, parent_group_dn: &str) -> Result<Vec<Group>> {
        debug!(
            base = %base_dn,
            parent = %parent_group_dn,
            "Serving groups from snapshot"
        );
        Ok(std::mem::take(&mut self.groups))
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Write resolved groups as a JSON snapshot, replacing `path` atomically.
pub fn save_snapshot(path: &Path, groups: &[Group]) -> Result<PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let output_err = |source: std::io::Error| NetplotError::Output {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(output_err)?;
    serde_json::to_writer_pretty(&mut tmp, groups)
        .map_err(|e| output_err(std::io::Error::other(e)))?;
    tmp.write_all(b"\n").map_err(output_err)?;
    tmp.as_file().sync_all().map_err(output_err)?;
    tmp.persist(path).map_err(|e| output_err(e.error))?;

    info!(path = %path.display(), groups = groups.len(), "Saved directory snapshot");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingDirectory {
        closed: std::rc::Rc<std::cell::Cell<bool>>,
    }

    impl DirectoryClient for FailingDirectory {
        async fn search_groups(&mut self, _: &str, _: &str) -> Result<Vec<Group>> {
            Err(NetplotError::DirectoryUnavailable("search timed out".into()))
        }

        async fn close(self) -> Result<()> {
            self.closed.set(true);
            Ok(())
        }
    }

    #[test]
    fn test_bind_credentials() {
        let mut config = DirectoryConfig::default();
        assert_eq!(bind_credentials(&config), ("", ""));

        config.bind_password = Some("secret".to_string());
        assert_eq!(bind_credentials(&config), ("", ""));

        config.bind_dn = Some("uid=reader,dc=x".to_string());
        assert_eq!(bind_credentials(&config), ("uid=reader,dc=x", "secret"));
    }

    #[test]
    fn test_filter() {
        assert_eq!(
            member_of_filter("cn=mountmoran,cn=groups,dc=x"),
            "(memberOf=cn=mountmoran,cn=groups,dc=x)"
        );
        assert_eq!(member_of_filter("cn=a(b)"), r"(memberOf=cn=a\28b\29)");
    }

    #[test]
    fn test_group_from_attrs() {
        let mut attrs = HashMap::new();
        attrs.insert("cn".to_string(), vec!["proj1".to_string()]);
        attrs.insert(
            "Member".to_string(),
            vec!["uid=alice,cn=users".to_string(), "uid=bob,cn=users".to_string()],
        );
        let group = group_from_attrs("cn=proj1,cn=groups,dc=x", attrs);
        assert_eq!(group.name, "proj1");
        assert_eq!(group.members.len(), 2);
    }

    #[test]
    fn test_group_without_cn_or_members() {
        let group = group_from_attrs("cn=empty,cn=groups,dc=x", HashMap::new());
        assert_eq!(group.name, "empty");
        assert!(group.members.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_resolution_keeps_order() {
        let directory = SnapshotDirectory::from_groups(vec![
            Group::new("zeta", vec![]),
            Group::new("alpha", vec![]),
        ]);
        let resolver = MembershipResolver::new("dc=x", "cn=parent,dc=x");
        let groups = resolver.resolve_groups(directory).await.unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn test_session_closed_on_failure() {
        let closed = std::rc::Rc::new(std::cell::Cell::new(false));
        let directory = FailingDirectory {
            closed: closed.clone(),
        };
        let resolver = MembershipResolver::new("dc=x", "cn=parent,dc=x");
        let err = resolver.resolve_groups(directory).await.unwrap_err();
        assert!(matches!(err, NetplotError::DirectoryUnavailable(_)));
        assert!(closed.get());
    }

    #[test]
    fn test_snapshot_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groups.json");
        let groups = vec![Group::new("proj1", vec!["uid=alice,cn=users".to_string()])];
        save_snapshot(&path, &groups).unwrap();

        let mut loaded = SnapshotDirectory::open(&path).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let resolved = rt.block_on(loaded.search_groups("", "")).unwrap();
        assert_eq!(resolved, groups);
    }

    #[test]
    fn test_snapshot_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SnapshotDirectory::open(&path),
            Err(NetplotError::Snapshot { .. })
        ));
    }
}
