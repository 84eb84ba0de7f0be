use anyhow::{Context, Result};
use igscrape_common::ScrapeMode;
use igscrape_config::ScraperConfig;
use igscrape_jobs::{Scraper, SqliteStore};
use igscrape_social::instagram::InstagramApi;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;
use std::sync::Arc;

async fn make_pool(url: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database_url {url:?}"))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    Ok(pool)
}

/// Build the store and client from `cfg` and run one scrape.
pub async fn scrape(cfg: &ScraperConfig, mode: ScrapeMode) -> Result<()> {
    let pool = make_pool(&cfg.database_url).await?;
    let store = Arc::new(SqliteStore::new(pool, cfg.table_pages.clone()));
    store.ensure_media_table(&cfg.table_posts).await?;
    store.ensure_media_table(&cfg.table_stories).await?;

    let client = InstagramApi::from_config(cfg)?;
    let mut scraper = Scraper::new(client, cfg, store.clone(), store.clone());
    scraper.run(mode).await?;

    store.pool().close().await;
    Ok(())
}
