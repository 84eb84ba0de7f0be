//! Common types and utilities shared across igscrape crates.
//!
//! This crate holds the scrape mode selector, observability helpers, and the shared
//! error type returned by scrape operations. It stays dependency-light so every crate
//! in the workspace can depend on it.
//!
//! # Overview
//!
//! - [`ScrapeMode`]: which media kinds a run collects
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`IgscrapeError`] and [`Result`]: fatal run errors
//!
//! # Examples
//!
//! ```rust
//! use igscrape_common::ScrapeMode;
//!
//! let mode: ScrapeMode = "story".parse().unwrap();
//! assert_eq!(mode, ScrapeMode::Story);
//! assert!(mode.includes_stories());
//! assert!(!mode.includes_posts());
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod observability;

/// Media kinds collected by one invocation of the scrape command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// Posts first, then stories.
    #[default]
    All,
    Story,
    Post,
}

impl ScrapeMode {
    pub fn includes_posts(self) -> bool {
        matches!(self, ScrapeMode::All | ScrapeMode::Post)
    }

    pub fn includes_stories(self) -> bool {
        matches!(self, ScrapeMode::All | ScrapeMode::Story)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeMode::All => "all",
            ScrapeMode::Story => "story",
            ScrapeMode::Post => "post",
        }
    }
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeMode {
    type Err = IgscrapeError;

    /// An empty argument falls back to [`ScrapeMode::All`].
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(ScrapeMode::All),
            "story" => Ok(ScrapeMode::Story),
            "post" => Ok(ScrapeMode::Post),
            other => Err(IgscrapeError::UnknownMode(other.to_string())),
        }
    }
}

/// Errors that abort a scrape run.
///
/// Per-account and per-record problems are logged and never surface here.
#[derive(thiserror::Error, Debug)]
pub enum IgscrapeError {
    /// The requested scrape mode is not one of `all`, `story`, `post`.
    #[error("Unexpected media type for Instagram scraping: {0} (expected all|story|post)")]
    UnknownMode(String),

    /// The source accounts could not be read or the destination table could not be written.
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Convenient alias for results that use [`IgscrapeError`].
pub type Result<T> = std::result::Result<T, IgscrapeError>;
