//! Authoritative access state of a project or a dataset, as read from the store.
//!
//! Documents are fetched fresh for every reconciliation and never cached. Every
//! write derived from a document carries the etag it was read with.

use serde::{Deserialize, Serialize};

use crate::principal::parse_member;

/// IAM policy of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPolicy {
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub version: i32,
    /// Fields this tool does not touch (e.g. `auditConfigs`), written back as read.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

impl Binding {
    fn is_unconditional(&self) -> bool {
        self.condition.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MemberChangeKind {
    Add,
    Remove,
}

/// One member added to or removed from one role's unconditional binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingChange {
    pub kind: MemberChangeKind,
    pub role: String,
    pub member: String,
}

impl BindingChange {
    #[must_use]
    pub fn add(role: &str, member: String) -> Self {
        Self {
            kind: MemberChangeKind::Add,
            role: role.to_string(),
            member,
        }
    }

    #[must_use]
    pub fn remove(role: &str, member: String) -> Self {
        Self {
            kind: MemberChangeKind::Remove,
            role: role.to_string(),
            member,
        }
    }
}

impl std::fmt::Display for BindingChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} on {}", self.kind, self.member, self.role)
    }
}

impl ProjectPolicy {
    /// Whether `member` (fully qualified) holds `role` without a condition.
    #[must_use]
    pub fn has_member(&self, role: &str, member: &str) -> bool {
        self.bindings
            .iter()
            .filter(|b| b.is_unconditional() && b.role == role)
            .any(|b| b.members.iter().any(|m| m == member))
    }

    /// The qualified member that binds `entity` to `role`, whatever kind it was bound as.
    #[must_use]
    pub fn find_member(&self, role: &str, entity: &str) -> Option<&str> {
        self.bindings
            .iter()
            .filter(|b| b.is_unconditional() && b.role == role)
            .flat_map(|b| b.members.iter())
            .find(|m| parse_member(m).is_some_and(|(_, identity)| identity == entity))
            .map(String::as_str)
    }

    /// The policy with `change` applied. The etag is kept, so submitting the result
    /// fails if the policy moved on since it was read.
    #[must_use]
    pub fn apply(&self, change: &BindingChange) -> Self {
        let mut policy = self.clone();
        match change.kind {
            MemberChangeKind::Add => {
                if policy.has_member(&change.role, &change.member) {
                    return policy;
                }
                if let Some(binding) = policy
                    .bindings
                    .iter_mut()
                    .find(|b| b.is_unconditional() && b.role == change.role)
                {
                    binding.members.push(change.member.clone());
                } else {
                    policy.bindings.push(Binding {
                        role: change.role.clone(),
                        members: vec![change.member.clone()],
                        condition: None,
                    });
                }
            }
            MemberChangeKind::Remove => {
                for binding in policy
                    .bindings
                    .iter_mut()
                    .filter(|b| b.is_unconditional() && b.role == change.role)
                {
                    binding.members.retain(|m| m != &change.member);
                }
                policy.bindings.retain(|b| !b.members.is_empty());
            }
        }
        policy
    }

    /// Identities of all user, service account and group members, in binding order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.bindings
            .iter()
            .flat_map(|b| b.members.iter())
            .filter_map(|m| parse_member(m).map(|(_, identity)| identity))
    }
}

/// How an access entry addresses its grantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "camelCase")]
pub enum EntityType {
    UserByEmail,
    GroupByEmail,
    Domain,
    SpecialGroup,
    IamMember,
    /// Authorized view; the entity holds the JSON table reference.
    View,
    /// Authorized routine; the entity holds the JSON routine reference.
    Routine,
    /// Authorized dataset; the entity holds the JSON dataset reference.
    Dataset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    /// Empty for authorized views, routines and datasets.
    pub role: String,
    pub entity_type: EntityType,
    pub entity: String,
    /// Fields this tool does not touch (e.g. `condition`), written back as read.
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl AccessEntry {
    #[must_use]
    pub fn new(role: impl Into<String>, entity_type: EntityType, entity: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            entity_type,
            entity: entity.into(),
            other: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        !self.other.contains_key("condition")
    }

    /// Same role granted to the same grantee, ignoring everything else.
    fn grants_same(&self, other: &AccessEntry) -> bool {
        self.role == other.role
            && self.entity_type == other.entity_type
            && self.entity == other.entity
    }
}

/// Access control list of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetAccess {
    pub entries: Vec<AccessEntry>,
    pub etag: Option<String>,
}

impl DatasetAccess {
    /// Whether an unconditional entry grants what `entry` grants. Conditional
    /// entries never match.
    #[must_use]
    pub fn contains(&self, entry: &AccessEntry) -> bool {
        self.entries
            .iter()
            .any(|e| e.is_unconditional() && e.grants_same(entry))
    }

    /// The access list with `entry` appended, conditioned on the same etag.
    #[must_use]
    pub fn with_entry(&self, entry: AccessEntry) -> Self {
        let mut access = self.clone();
        if !access.contains(&entry) {
            access.entries.push(entry);
        }
        access
    }

    /// The access list without the unconditional entries matching `entry`,
    /// conditioned on the same etag.
    #[must_use]
    pub fn without_entry(&self, entry: &AccessEntry) -> Self {
        let mut access = self.clone();
        access
            .entries
            .retain(|e| !(e.is_unconditional() && e.grants_same(entry)));
        access
    }
}
