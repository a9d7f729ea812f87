use std::io::Write;

use anyhow::Context as _;
use bqiam::{
    Config,
    cache::{Crawler, MetadataCache, Metas},
    gcp::GcpClient,
    reconcile::Prompt,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Rebuild the metadata cache from the allow-listed projects.
pub(crate) async fn update(config: &Config) -> anyhow::Result<()> {
    let cache = MetadataCache::new(config.cache_path());
    refresh(config, &cache).await?;
    println!("dataset meta data are cached to {}", cache.path().display());
    Ok(())
}

/// Print the datasets `entity` can access according to the cache, offering a
/// refresh first when the cache is stale.
pub(crate) async fn datasets_of(config: &Config, entity: &str) -> anyhow::Result<()> {
    let cache = MetadataCache::new(config.cache_path());
    let mut prompt = Prompt::new(std::io::stdin().lock(), std::io::stdout());

    let metas = cache
        .load_or_refresh(Utc::now(), config.cache_refresh_hour, &mut prompt, || {
            refresh(config, &cache)
        })
        .await?;
    print_datasets(&metas, entity, &mut std::io::stdout().lock())?;
    Ok(())
}

async fn refresh(config: &Config, cache: &MetadataCache) -> anyhow::Result<Metas> {
    let client = GcpClient::from_default_credentials()
        .await
        .context("Failed to create GCP client")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping the crawl");
            on_interrupt.cancel();
        }
    });

    let crawler = Crawler::builder()
        .client(client)
        .allow_list(config.bigquery_projects.clone())
        .concurrency(config.crawl_concurrency)
        .cancel(cancel)
        .build();
    let result = crawler.refresh(cache).await;
    interrupt.abort();

    result.context("Failed to update the metadata cache")
}

fn print_datasets(metas: &Metas, entity: &str, out: &mut impl Write) -> std::io::Result<()> {
    for meta in metas.query(entity) {
        writeln!(out, "{} {} {}", meta.project, meta.dataset, meta.role)?;
    }
    Ok(())
}
