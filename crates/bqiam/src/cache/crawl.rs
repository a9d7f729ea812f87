use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use super::{CacheEntry, CrawlError, MetadataCache, Metas, RefreshError};
use crate::store::{DatasetAccessStore, ResourceEnumerator};

/// Builds a fresh [`Metas`] snapshot from the live API.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Crawler<C> {
    client: C,
    /// Projects to crawl. Visible projects not listed here are skipped.
    allow_list: Vec<String>,
    /// Maximum number of projects crawled at the same time.
    #[builder(default = 8)]
    concurrency: usize,
    /// Cancelling this token stops a running crawl.
    #[builder(default)]
    cancel: CancellationToken,
}

impl<C> Crawler<C>
where
    C: ResourceEnumerator + DatasetAccessStore + Clone + 'static,
{
    /// Visible projects that are on the allow-list, in listing order.
    pub async fn allowed_projects(&self) -> Result<Vec<String>, CrawlError> {
        let visible = self
            .client
            .list_projects()
            .await
            .map_err(CrawlError::ListProjects)?;
        let allowed = visible
            .into_iter()
            .filter(|p| self.allow_list.contains(p))
            .collect::<Vec<_>>();
        tracing::debug!("{} allow-listed projects are visible", allowed.len());
        Ok(allowed)
    }

    /// Crawl every allowed project concurrently and flatten all access entries.
    ///
    /// The first failing project cancels all others. Entries are ordered by
    /// project listing order, then dataset order.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<Metas, CrawlError> {
        let projects = self.allowed_projects().await?;
        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let cancel = self.cancel.child_token();

        let mut jobs: JoinSet<Result<(usize, Vec<CacheEntry>), CrawlError>> = JoinSet::new();
        for (index, project) in projects.into_iter().enumerate() {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            jobs.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(CrawlError::Cancelled),
                    permit = semaphore.acquire_owned() => permit.map_err(|_| CrawlError::Cancelled)?,
                };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(CrawlError::Cancelled),
                    entries = crawl_project(&client, &project) => entries.map(|e| (index, e)),
                }
            });
        }

        let mut crawled = vec![];
        while let Some(joined) = jobs.join_next().await {
            match joined.map_err(CrawlError::from).and_then(|result| result) {
                Ok(project) => crawled.push(project),
                Err(e) => {
                    tracing::debug!("Cancelling {} remaining crawl tasks: {e}", jobs.len());
                    cancel.cancel();
                    jobs.shutdown().await;
                    return Err(e);
                }
            }
        }

        crawled.sort_by_key(|(index, _)| *index);
        let metas = Metas {
            metas: crawled.into_iter().flat_map(|(_, entries)| entries).collect(),
        };
        tracing::info!("Crawled {} access entries", metas.len());
        Ok(metas)
    }

    /// Rebuild and replace `cache`. On failure the existing file is left as it was.
    pub async fn refresh(&self, cache: &MetadataCache) -> Result<Metas, RefreshError> {
        let metas = self.rebuild().await?;
        cache.save(&metas)?;
        Ok(metas)
    }
}

async fn crawl_project<C>(client: &C, project: &str) -> Result<Vec<CacheEntry>, CrawlError>
where
    C: ResourceEnumerator + DatasetAccessStore,
{
    let datasets = client
        .list_datasets(project)
        .await
        .map_err(|source| CrawlError::ListDatasets {
            project: project.to_string(),
            source,
        })?;
    tracing::debug!("Caching {} datasets of project {project}", datasets.len());

    let mut entries = vec![];
    for dataset in datasets {
        let access = client
            .get_access(project, &dataset)
            .await
            .map_err(|source| CrawlError::FetchMetadata {
                project: project.to_string(),
                dataset: dataset.clone(),
                source,
            })?;
        entries.extend(access.entries.into_iter().map(|entry| CacheEntry {
            project: project.to_string(),
            dataset: dataset.clone(),
            role: entry.role,
            entity: entry.entity,
        }));
    }
    Ok(entries)
}
