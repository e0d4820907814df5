//! Group and member exclusion
//!
//! Two independent rules decide what is left out of the graph:
//! - groups named in the skip-list never become nodes or edge targets
//! - members of the configured staff groups are hidden everywhere unless
//!   staff users are explicitly included
//!
//! Staff exclusion is global: a staff member who also belongs to a project
//! group is hidden from that project group too.

use crate::config::GraphConfig;
use crate::member::MemberRef;
use crate::models::Group;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    groups_to_skip: HashSet<String>,
    staff_members: HashSet<String>,
    include_staff: bool,
}

impl ExclusionPolicy {
    pub fn new<I, S>(groups_to_skip: I, include_staff: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups_to_skip: groups_to_skip.into_iter().map(Into::into).collect(),
            staff_members: HashSet::new(),
            include_staff,
        }
    }

    /// Build the policy and collect staff members from the resolved groups.
    pub fn from_config(config: &GraphConfig, groups: &[Group]) -> Self {
        let mut policy = Self::new(config.groups_to_skip.iter().cloned(), config.include_staff_users);
        policy.collect_staff(&config.staff_groups, groups);
        policy
    }

    /// Union the members of every group whose name is in `staff_groups`.
    pub fn collect_staff(&mut self, staff_groups: &[String], groups: &[Group]) {
        for group in groups.iter().filter(|g| staff_groups.contains(&g.name)) {
            for member in &group.members {
                self.staff_members
                    .insert(MemberRef::parse(member).identity().to_string());
            }
            debug!(group = %group.name, members = group.members.len(), "Collected staff group");
        }
    }

    pub fn should_skip_group(&self, name: &str) -> bool {
        self.groups_to_skip.contains(name)
    }

    pub fn should_skip_member(&self, member: &MemberRef) -> bool {
        !self.include_staff && self.is_staff(member)
    }

    pub fn is_staff(&self, member: &MemberRef) -> bool {
        self.staff_members.contains(member.identity())
    }

    pub fn staff_member_count(&self) -> usize {
        self.staff_members.len()
    }
}
