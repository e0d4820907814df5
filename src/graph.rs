//! Graph construction
//!
//! Joins usage totals, resolved groups and the exclusion policy into node
//! and edge rows.
//!
//! For every retained group, in directory order:
//! 1. one group node, sized `members + 2` so it always outranks a user node
//! 2. for every member that is a user and not excluded, one edge
//!    `group -> user` and one user node of size 1
//!
//! A user in several retained groups gets one node row per group; the
//! visualization tooling merges rows by ID.
//!
//! Colors in the weighted variant are CPU time divided by the largest account
//! total (groups) or the largest user total (users). An all-zero log yields a
//! zero basis, which is replaced by 1 so every color is 0.

use crate::member::MemberRef;
use crate::models::{Edge, Graph, Group, Node, NodeKind, UsageTotals, Variant};
use crate::policy::ExclusionPolicy;
use tracing::debug;

/// Placeholder label for users when usernames are hidden. Non-empty because
/// some importers drop rows with empty labels.
pub const HIDDEN_LABEL: &str = " ";

/// `value / max`, or 0 when the basis is zero.
pub fn normalize(value: u64, max: u64) -> f64 {
    let basis = if max == 0 { 1 } else { max };
    value as f64 / basis as f64
}

pub struct GraphBuilder<'a> {
    policy: &'a ExclusionPolicy,
    variant: Variant,
    username_labels: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(policy: &'a ExclusionPolicy, variant: Variant, username_labels: bool) -> Self {
        Self {
            policy,
            variant,
            username_labels,
        }
    }

    pub fn build(&self, groups: &[Group], totals: &UsageTotals) -> Graph {
        let max_account = totals.max_account();
        let max_user = totals.max_user();

        let mut graph = Graph::default();
        for group in groups {
            if self.policy.should_skip_group(&group.name) {
                debug!(group = %group.name, "Skipping group");
                graph.stats.groups_skipped += 1;
                continue;
            }

            graph.nodes.push(Node {
                id: group.name.clone(),
                label: group.name.clone(),
                color: self.color(NodeKind::Group, totals.account(&group.name), max_account),
                size: group_size(group),
                kind: NodeKind::Group,
            });

            for raw in &group.members {
                self.add_member(&mut graph, group, raw, totals, max_user);
            }
        }

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Built graph"
        );
        graph
    }

    fn add_member(
        &self,
        graph: &mut Graph,
        group: &Group,
        raw: &str,
        totals: &UsageTotals,
        max_user: u64,
    ) {
        let member = MemberRef::parse(raw);
        let user = match &member {
            MemberRef::User(uid) => uid,
            MemberRef::Unresolved { reference, reason } => {
                debug!(
                    group = %group.name,
                    member = %reference,
                    reason = %reason,
                    "Skipping unresolved member"
                );
                graph.stats.unresolved_members += 1;
                return;
            }
        };

        if self.policy.should_skip_member(&member) {
            graph.stats.staff_members_skipped += 1;
            return;
        }

        graph.edges.push(Edge {
            target: group.name.clone(),
            source: user.clone(),
        });
        graph.nodes.push(Node {
            id: user.clone(),
            label: if self.username_labels {
                user.clone()
            } else {
                HIDDEN_LABEL.to_string()
            },
            color: self.color(NodeKind::User, totals.user(user), max_user),
            size: 1,
            kind: NodeKind::User,
        });
    }

    fn color(&self, kind: NodeKind, value: u64, max: u64) -> f64 {
        match self.variant {
            Variant::Weighted => normalize(value, max),
            Variant::Simplified => f64::from(kind.type_code()),
        }
    }
}

fn group_size(group: &Group) -> u32 {
    u32::try_from(group.members.len())
        .unwrap_or(u32::MAX)
        .saturating_add(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::UsageAggregator;

    fn members(uids: &[&str]) -> Vec<String> {
        uids.iter()
            .map(|uid| format!("uid={},cn=users,cn=accounts,dc=arcc,dc=uwyo,dc=edu", uid))
            .collect()
    }

    #[test]
    fn test_normalize_zero_basis() {
        assert_eq!(normalize(0, 0), 0.0);
        assert_eq!(normalize(5, 10), 0.5);
        assert_eq!(normalize(10, 10), 1.0);
    }

    #[test]
    fn test_build_two_groups() {
        let totals = UsageAggregator::default()
            .aggregate(["alice|proj1|100", "bob|proj1|50", "bob|proj2|50"])
            .unwrap();
        let groups = vec![
            Group::new("proj1", members(&["alice", "bob"])),
            Group::new("proj2", members(&["bob"])),
        ];
        let policy = ExclusionPolicy::default();
        let graph = GraphBuilder::new(&policy, Variant::Weighted, true).build(&groups, &totals);

        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["proj1", "alice", "bob", "proj2", "bob"]);

        // max account 150, max user 100
        assert_eq!(graph.nodes[0].color, 1.0);
        assert_eq!(graph.nodes[0].size, 4);
        assert_eq!(graph.nodes[1].color, 1.0);
        assert_eq!(graph.nodes[2].color, 1.0);
        assert_eq!(graph.nodes[3].color, 50.0 / 150.0);
        assert_eq!(graph.nodes[3].size, 3);
        assert_eq!(graph.nodes[1].label, "alice");

        assert_eq!(graph.edges.len(), 3);
        assert_eq!(
            graph.edges[2],
            Edge {
                target: "proj2".into(),
                source: "bob".into()
            }
        );
    }

    #[test]
    fn test_hidden_labels() {
        let groups = vec![Group::new("proj1", members(&["alice"]))];
        let policy = ExclusionPolicy::default();
        let graph =
            GraphBuilder::new(&policy, Variant::Weighted, false).build(&groups, &UsageTotals::new());
        assert_eq!(graph.nodes[0].label, "proj1");
        assert_eq!(graph.nodes[1].label, HIDDEN_LABEL);
        assert_eq!(graph.nodes[1].id, "alice");
    }

    #[test]
    fn test_simplified_colors_are_discriminators() {
        let totals = UsageAggregator::default()
            .aggregate(["alice|proj1|100"])
            .unwrap();
        let groups = vec![Group::new("proj1", members(&["alice"]))];
        let policy = ExclusionPolicy::default();
        let graph = GraphBuilder::new(&policy, Variant::Simplified, false).build(&groups, &totals);
        assert_eq!(graph.nodes[0].color, 1.0);
        assert_eq!(graph.nodes[1].color, 0.0);
    }

    #[test]
    fn test_subgroup_member_counts_toward_size_only() {
        let mut raw = members(&["alice"]);
        raw.push("cn=nested,cn=groups,cn=accounts,dc=arcc,dc=uwyo,dc=edu".to_string());
        let groups = vec![Group::new("proj1", raw)];
        let policy = ExclusionPolicy::default();
        let graph =
            GraphBuilder::new(&policy, Variant::Weighted, false).build(&groups, &UsageTotals::new());
        assert_eq!(graph.nodes[0].size, 4);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.stats.unresolved_members, 1);
    }

    #[test]
    fn test_skipped_group_emits_nothing() {
        let groups = vec![
            Group::new("bc-201606", members(&["alice"])),
            Group::new("proj1", members(&["bob"])),
        ];
        let policy = ExclusionPolicy::new(["bc-201606"], false);
        let graph =
            GraphBuilder::new(&policy, Variant::Weighted, false).build(&groups, &UsageTotals::new());
        assert!(graph.nodes.iter().all(|n| n.id != "bc-201606" && n.id != "alice"));
        assert!(graph.edges.iter().all(|e| e.target != "bc-201606"));
        assert_eq!(graph.stats.groups_skipped, 1);
    }
}
