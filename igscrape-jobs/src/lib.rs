//! Scrape jobs: source accounts in, normalized media rows out.
//!
//! [`Scraper`] drives one run. It reads the accounts to follow through an
//! [`AccountSource`], asks an [`InstagramClient`](igscrape_social::instagram::InstagramClient)
//! for each account's posts or stories, normalizes every item, and hands the whole batch
//! to a [`MediaRepository`] that replaces the destination table in one go.
use chrono::{DateTime, Utc};
use igscrape_social::instagram::{normalize_post, normalize_story, resolve_username, MediaData, RawMedia};

pub mod scraper;
pub mod store;

pub use scraper::Scraper;
pub use store::{AccountSource, MediaRepository, SqliteStore};

/// A row of the pages table that has an Instagram profile attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAccount {
    pub id: i64,
    /// Profile URL or bare handle, as stored.
    pub profile_reference: String,
}

impl SourceAccount {
    pub fn new(id: i64, profile_reference: impl Into<String>) -> Self {
        Self {
            id,
            profile_reference: profile_reference.into(),
        }
    }

    pub fn handle(&self) -> &str {
        resolve_username(&self.profile_reference)
    }
}

/// One destination row.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub owner_id: i64,
    pub data: MediaData,
    pub created_at: String,
    pub updated_at: String,
}

impl NormalizedRecord {
    pub fn post(owner_id: i64, media: &RawMedia) -> Self {
        Self::with_data(owner_id, media, normalize_post(media))
    }

    pub fn story(owner_id: i64, media: &RawMedia) -> Self {
        Self::with_data(owner_id, media, normalize_story(media))
    }

    fn with_data(owner_id: i64, media: &RawMedia, data: MediaData) -> Self {
        Self {
            owner_id,
            data,
            created_at: format_timestamp(media.created_time()),
            updated_at: format_timestamp(media.modified()),
        }
    }

    /// The `data` column value.
    pub fn data_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.data)
    }
}

/// Epoch seconds as `YYYY-MM-DD HH:MM:SS` in UTC. Out-of-range values render as the epoch.
pub fn format_timestamp(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
