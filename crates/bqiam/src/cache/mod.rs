//! Local snapshot of dataset access entries across the allow-listed projects.
//!
//! The snapshot is never used to authorize a change. It only answers reverse
//! lookups ("which datasets can this entity access?") without calling the API.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{reconcile::Confirm, utils::write_atomically};

mod crawl;
mod error;

pub use crawl::Crawler;
pub use error::{CacheError, CrawlError, RefreshError};

/// One access entry of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheEntry {
    pub project: String,
    pub dataset: String,
    pub role: String,
    pub entity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metas {
    #[serde(rename = "Metas", default)]
    pub metas: Vec<CacheEntry>,
}

impl Metas {
    /// Entries granted to exactly `entity`, in stored order.
    pub fn query<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a CacheEntry> + 'a {
        self.metas.iter().filter(move |m| m.entity == entity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }
}

/// Whether a cache last written at `modified` is older than `threshold_hours` at `now`.
#[must_use]
pub fn is_expired(modified: DateTime<Utc>, now: DateTime<Utc>, threshold_hours: u64) -> bool {
    let threshold = i64::try_from(threshold_hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(modified) > threshold
}

/// The cache file at a fixed location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCache {
    path: PathBuf,
}

impl MetadataCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Metas, CacheError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                CacheError::Missing {
                    path: self.path.clone(),
                }
            } else {
                CacheError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;
        toml::from_str(&contents).map_err(|source| CacheError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the cache file with `metas`. Readers never observe a partial file.
    pub fn save(&self, metas: &Metas) -> Result<(), CacheError> {
        let contents = toml::to_string(metas)?;
        write_atomically(&self.path, contents.as_bytes()).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("Saved {} cache entries to {}", metas.len(), self.path.display());
        Ok(())
    }

    pub fn modified_at(&self) -> Result<DateTime<Utc>, CacheError> {
        let io_error = |source: std::io::Error| CacheError::Io {
            path: self.path.clone(),
            source,
        };
        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(io_error)?;
        Ok(DateTime::<Utc>::from(modified))
    }

    /// Whether the file is older than `threshold_hours`. A missing file is stale.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold_hours: u64) -> Result<bool, CacheError> {
        match self.modified_at() {
            Ok(modified) => Ok(is_expired(modified, now, threshold_hours)),
            Err(CacheError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Load the cache for a lookup. When it is older than `threshold_hours`
    /// the operator is asked through `confirm` whether to `refresh` it first.
    ///
    /// A declined or failed refresh is logged and the stale file is served.
    pub async fn load_or_refresh<F, Fut, E>(
        &self,
        now: DateTime<Utc>,
        threshold_hours: u64,
        confirm: &mut dyn Confirm,
        refresh: F,
    ) -> Result<Metas, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Metas, E>>,
        E: std::fmt::Display,
    {
        match self.is_stale(now, threshold_hours) {
            Ok(false) => return self.load(),
            Ok(true) => {}
            Err(e) => {
                tracing::warn!("Failed to check metadata cache age: {e}");
                return self.load();
            }
        }

        let summary = format!(
            "The metadata cache {} is older than {threshold_hours} hours and will be updated.\n",
            self.path.display()
        );
        if !confirm.confirm(&summary) {
            tracing::info!("Using the stale metadata cache {}", self.path.display());
            return self.load();
        }
        match refresh().await {
            Ok(metas) => Ok(metas),
            Err(e) => {
                tracing::warn!("Failed to update the metadata cache, using the stale one: {e:#}");
                self.load()
            }
        }
    }
}
