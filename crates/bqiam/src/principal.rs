use serde::{Deserialize, Serialize};

use crate::policy::EntityType;

const SERVICE_ACCOUNT_SUFFIX: &str = ".iam.gserviceaccount.com";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    User,
    ServiceAccount,
    Group,
}

/// An email identity qualified with the kind of principal it is bound as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    kind: EntityKind,
    email: String,
}

impl Principal {
    /// Qualify an entity by naming convention: service accounts by their
    /// `*.iam.gserviceaccount.com` suffix, everything else as a user.
    #[must_use]
    pub fn qualify(entity: &str) -> Self {
        let kind = if is_service_account(entity) {
            EntityKind::ServiceAccount
        } else {
            EntityKind::User
        };
        Self {
            kind,
            email: entity.to_string(),
        }
    }

    #[must_use]
    pub fn group(entity: &str) -> Self {
        Self {
            kind: EntityKind::Group,
            email: entity.to_string(),
        }
    }

    /// Principal of a binding member such as `group:team@example.com`.
    #[must_use]
    pub fn from_member(member: &str) -> Option<Self> {
        parse_member(member).map(|(kind, email)| Self {
            kind,
            email: email.to_string(),
        })
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The group-qualified form to retry with after the store rejected this one.
    /// Groups have nothing left to fall back to.
    #[must_use]
    pub fn fallback(&self) -> Option<Self> {
        match self.kind {
            EntityKind::Group => None,
            EntityKind::User | EntityKind::ServiceAccount => Some(Self::group(&self.email)),
        }
    }

    /// Member string as it appears in a project IAM binding, e.g. `user:alice@example.com`.
    #[must_use]
    pub fn member(&self) -> String {
        format!("{}:{}", self.kind, self.email)
    }

    /// Dataset access lists address both users and service accounts by email.
    #[must_use]
    pub fn dataset_entity_type(&self) -> EntityType {
        match self.kind {
            EntityKind::User | EntityKind::ServiceAccount => EntityType::UserByEmail,
            EntityKind::Group => EntityType::GroupByEmail,
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.member())
    }
}

#[must_use]
pub fn is_service_account(entity: &str) -> bool {
    entity.ends_with(SERVICE_ACCOUNT_SUFFIX)
}

/// Split a binding member into its kind and identity.
///
/// Only `user`, `serviceAccount` and `group` members are recognized; special
/// members such as `allUsers`, `domain:` or `deleted:` ones yield `None`.
#[must_use]
pub fn parse_member(member: &str) -> Option<(EntityKind, &str)> {
    let (kind, identity) = member.split_once(':')?;
    let kind = kind.parse::<EntityKind>().ok()?;
    (!identity.is_empty()).then_some((kind, identity))
}
