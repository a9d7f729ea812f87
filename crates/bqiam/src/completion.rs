//! Candidate lists for shell completion of users, datasets and projects.

use std::path::{Path, PathBuf};

use itertools::Itertools as _;
use serde::{Deserialize, Serialize};

use crate::{
    cache::CrawlError,
    store::{ProjectPolicyStore, ResourceEnumerator},
    utils::write_atomically,
};

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error(
        "Failed to read completion list {}\n  (use `bqiam completion` to create it)",
        path.display()
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse completion list {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize completion list")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum CandidateKind {
    Users,
    Datasets,
    Projects,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompletionList {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub display_size_limit: usize,
}

impl CompletionList {
    pub fn load(path: &Path) -> Result<Self, CompletionError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CompletionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| CompletionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CompletionError> {
        let contents = toml::to_string(self)?;
        write_atomically(path, contents.as_bytes()).map_err(|source| CompletionError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Entries of `kind` starting with `prefix`, at most `display_size_limit` of them.
    #[must_use]
    pub fn candidates(&self, kind: CandidateKind, prefix: &str) -> Vec<&str> {
        let source = match kind {
            CandidateKind::Users => &self.users,
            CandidateKind::Datasets => &self.datasets,
            CandidateKind::Projects => &self.projects,
        };
        source
            .iter()
            .filter(|c| c.starts_with(prefix))
            .take(self.display_size_limit)
            .map(String::as_str)
            .collect()
    }
}

/// Collect the datasets and the IAM principals of `projects`.
///
/// Duplicates are dropped, first occurrence wins.
pub async fn build_completion_list<C>(
    client: &C,
    projects: &[String],
    display_size_limit: usize,
) -> Result<CompletionList, CompletionError>
where
    C: ResourceEnumerator + ProjectPolicyStore,
{
    let mut datasets = vec![];
    for project in projects {
        datasets.extend(client.list_datasets(project).await.map_err(|source| {
            CrawlError::ListDatasets {
                project: project.clone(),
                source,
            }
        })?);
    }

    let mut users = vec![];
    for project in projects {
        let policy = client
            .get_policy(project)
            .await
            .map_err(|source| CrawlError::FetchPolicy {
                project: project.clone(),
                source,
            })?;
        users.extend(policy.identities().map(ToString::to_string));
    }

    tracing::debug!(
        "Collected {} users and {} datasets for completion",
        users.len(),
        datasets.len()
    );
    Ok(CompletionList {
        users: users.into_iter().unique().collect(),
        datasets: datasets.into_iter().unique().collect(),
        projects: projects.iter().unique().cloned().collect(),
        display_size_limit,
    })
}
