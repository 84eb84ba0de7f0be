//! Social network clients and media normalization used by igscrape.
//!
//! Only the Instagram pipeline exists: a thin API client behind the
//! [`instagram::InstagramClient`] trait, plus the pure functions that turn raw media
//! records into the compact JSON rows the scrape job persists.
pub mod instagram;
