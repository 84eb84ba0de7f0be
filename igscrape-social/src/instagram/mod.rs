//! Instagram integration surface used by the scrape jobs.
//!
//! - [`client`]: the collaborator trait and its HTTP-backed implementation
//! - [`types`]: raw media records, story collections, sessions, and errors
//! - [`extract`]: field extraction and media normalization
//! - [`username`]: profile reference to bare handle resolution
//! - [`mapping`]: API item JSON to raw media records
pub mod client;
pub mod extract;
pub mod mapping;
pub mod types;
pub mod username;

pub use client::{InstagramApi, InstagramClient};
pub use extract::{extract_fields, normalize_post, normalize_story};
pub use types::{AuthFailure, ClientError, MediaData, RawMedia, Session, StoryCollection};
pub use username::resolve_username;
