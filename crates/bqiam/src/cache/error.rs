use std::path::PathBuf;

use crate::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(
        "Metadata cache file {} does not exist\n  (use `bqiam cache` to create or update BigQuery datasets' metadata)",
        path.display()
    )]
    Missing { path: PathBuf },
    #[error("Failed to access metadata cache file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "Failed to parse metadata cache file {}\n  (use `bqiam cache` to create or update BigQuery datasets' metadata)",
        path.display()
    )]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize metadata cache")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Failed to list GCP projects")]
    ListProjects(#[source] ApiError),
    #[error("Failed to list datasets of project {project}")]
    ListDatasets {
        project: String,
        #[source]
        source: ApiError,
    },
    #[error("Failed to fetch metadata of dataset {project}:{dataset}")]
    FetchMetadata {
        project: String,
        dataset: String,
        #[source]
        source: ApiError,
    },
    #[error("Failed to fetch IAM policy of project {project}")]
    FetchPolicy {
        project: String,
        #[source]
        source: ApiError,
    },
    #[error("Crawl task panicked or was aborted")]
    Join(#[from] tokio::task::JoinError),
    #[error("Crawl was cancelled")]
    Cancelled,
}

/// Rebuilding and persisting the cache failed; the previous file is untouched.
#[derive(Debug, thiserror::Error, derive_more::From)]
pub enum RefreshError {
    #[error(transparent)]
    Crawl(CrawlError),
    #[error(transparent)]
    Cache(CacheError),
}
