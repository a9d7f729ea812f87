use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Project role that lets a principal run query jobs.
pub const BIGQUERY_JOB_USER: &str = "roles/bigquery.jobUser";
/// Project role that lets a principal list and use datasets.
pub const BIGQUERY_USER: &str = "roles/bigquery.user";

/// Project roles a dataset grant depends on, reconciled before any dataset mutation.
pub const DATASET_PREREQUISITE_ROLES: [&str; 2] = [BIGQUERY_JOB_USER, BIGQUERY_USER];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleParseError {
    #[error("READER or WRITER or OWNER must be specified, got `{0}`")]
    UnknownDatasetRole(String),
    #[error("READER or WRITER must be specified, got `{0}`")]
    UnknownProjectRole(String),
    #[error("OWNER cannot be granted project-wide, use READER or WRITER")]
    ProjectOwnerNotAllowed,
}

/// Basic role of a dataset access entry.
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
    strum_macros::VariantArray,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DatasetRole {
    Reader,
    Writer,
    Owner,
}

impl DatasetRole {
    pub fn parse(role: &str) -> Result<Self, RoleParseError> {
        role.parse::<Self>()
            .map_err(|_| RoleParseError::UnknownDatasetRole(role.to_string()))
    }
}

/// Project-wide basic role. OWNER is never granted at this scope.
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
    strum_macros::VariantArray,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectRole {
    Reader,
    Writer,
}

impl ProjectRole {
    #[must_use]
    pub fn iam_role(self) -> &'static str {
        match self {
            ProjectRole::Reader => "roles/viewer",
            ProjectRole::Writer => "roles/editor",
        }
    }
}

impl FromStr for ProjectRole {
    type Err = RoleParseError;

    fn from_str(role: &str) -> Result<Self, Self::Err> {
        match role {
            "READER" => Ok(ProjectRole::Reader),
            "WRITER" => Ok(ProjectRole::Writer),
            "OWNER" => Err(RoleParseError::ProjectOwnerNotAllowed),
            other => Err(RoleParseError::UnknownProjectRole(other.to_string())),
        }
    }
}
