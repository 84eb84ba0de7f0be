//! Scrape orchestration.
//!
//! Accounts are processed one at a time. A failing account is logged with its handle
//! and left out of the batch; only account enumeration and the final table write can
//! fail a run. When login does not succeed the operation is skipped and reports zero
//! rows without touching its table.
use crate::store::{AccountSource, MediaRepository};
use crate::{NormalizedRecord, SourceAccount};
use igscrape_common::{Result, ScrapeMode};
use igscrape_config::ScraperConfig;
use igscrape_social::instagram::{InstagramClient, Session};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct Scraper<C> {
    client: C,
    accounts: Arc<dyn AccountSource>,
    media: Arc<dyn MediaRepository>,
    table_posts: String,
    table_stories: String,
    max_post_count: u32,
    session: Option<Session>,
}

impl<C: InstagramClient> Scraper<C> {
    pub fn new(
        client: C,
        cfg: &ScraperConfig,
        accounts: Arc<dyn AccountSource>,
        media: Arc<dyn MediaRepository>,
    ) -> Self {
        Self {
            client,
            accounts,
            media,
            table_posts: cfg.table_posts.clone(),
            table_stories: cfg.table_stories.clone(),
            max_post_count: cfg.max_post_count,
            session: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run the operations selected by `mode`, posts before stories.
    pub async fn run(&mut self, mode: ScrapeMode) -> Result<()> {
        info!(mode = %mode, "scrape.run.start");
        if mode.includes_posts() {
            self.scrape_posts().await?;
        }
        if mode.includes_stories() {
            self.scrape_stories().await?;
        }
        Ok(())
    }

    // Logs in at most once; later calls reuse the kept session while it is usable.
    async fn ensure_login(&mut self) -> bool {
        if self.client.is_logged_in(self.session.as_ref()).await {
            return true;
        }

        match self.client.login().await {
            Ok(session) => match self.client.save_session(&session).await {
                Ok(()) => {
                    info!("scrape.login.succeeded");
                    self.session = Some(session);
                }
                // An unsaved session counts as a failed login.
                Err(err) => error!(error = %err, "scrape.login.save_session_failed"),
            },
            Err(failure) => error!(error = %failure, "scrape.login.failed"),
        }

        self.client.is_logged_in(self.session.as_ref()).await
    }

    /// Replace the posts table with the latest posts of every account.
    ///
    /// Returns the number of rows written.
    pub async fn scrape_posts(&mut self) -> Result<usize> {
        if !self.ensure_login().await {
            error!(table = %self.table_posts, "scrape.posts.skipped_no_login");
            return Ok(0);
        }

        let accounts = self.accounts.load_accounts().await?;
        let mut records = Vec::new();
        let mut failed = 0usize;
        for account in &accounts {
            let handle = account.handle();
            match self.client.medias_from_feed(handle, self.max_post_count).await {
                Ok(medias) => {
                    debug!(handle, posts = medias.len(), "scrape.posts.fetched");
                    records.extend(medias.iter().map(|m| NormalizedRecord::post(account.id, m)));
                }
                Err(err) => {
                    failed += 1;
                    error!(handle, error = %err, "scrape.posts.fetch_failed");
                }
            }
        }

        self.replace(&self.table_posts, &records, &accounts, failed, "posts")
            .await
    }

    /// Replace the stories table with the current stories of every account.
    ///
    /// Returns the number of rows written.
    pub async fn scrape_stories(&mut self) -> Result<usize> {
        if !self.ensure_login().await {
            error!(table = %self.table_stories, "scrape.stories.skipped_no_login");
            return Ok(0);
        }

        let accounts = self.accounts.load_accounts().await?;
        let mut records = Vec::new();
        let mut failed = 0usize;
        for account in &accounts {
            let handle = account.handle();
            debug!(handle, "scrape.stories.requesting");

            let user_id = match self.client.account_id(handle).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    failed += 1;
                    error!(handle, "scrape.stories.no_account_id");
                    continue;
                }
                Err(err) => {
                    failed += 1;
                    error!(handle, error = %err, "scrape.stories.fetch_failed");
                    continue;
                }
            };
            debug!(handle, user_id, "scrape.stories.account_id_resolved");

            match self.client.stories(user_id).await {
                Ok(reels) => {
                    for reel in &reels {
                        debug!(handle, stories = reel.stories().len(), "scrape.stories.fetched");
                        records.extend(
                            reel.stories()
                                .iter()
                                .map(|s| NormalizedRecord::story(account.id, s)),
                        );
                    }
                }
                Err(err) => {
                    failed += 1;
                    error!(handle, error = %err, "scrape.stories.fetch_failed");
                }
            }
        }

        self.replace(&self.table_stories, &records, &accounts, failed, "stories")
            .await
    }

    async fn replace(
        &self,
        table: &str,
        records: &[NormalizedRecord],
        accounts: &[SourceAccount],
        failed: usize,
        kind: &'static str,
    ) -> Result<usize> {
        let written = self.media.replace_all(table, records).await?;
        info!(
            kind,
            table,
            accounts = accounts.len(),
            failed,
            rows = written,
            "scrape.replace.done"
        );
        Ok(written as usize)
    }
}
