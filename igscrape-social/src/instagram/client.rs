//! The Instagram collaborator used by the scrape jobs.
//!
//! [`InstagramClient`] is the seam the orchestrator depends on; [`InstagramApi`] is
//! the thin HTTP implementation. It authenticates with session cookies copied from a
//! browser (interactive username/password login is not attempted), resolves account
//! ids through the configured profile endpoint, and reads the user feed and reels
//! endpoints of the private web API.
use crate::instagram::mapping::{
    account_id_from_profile, medias_from_feed_response, story_collections_from_response,
};
use crate::instagram::types::{AuthFailure, ClientError, RawMedia, Session, StoryCollection};
use async_trait::async_trait;
use igscrape_config::{ScraperConfig, SessionCookies};
use igscrape_http::header::{self, HeaderMap, HeaderValue};
use igscrape_http::{HttpClient, HttpError, RequestOpts};
use serde_json::Value;
use std::sync::RwLock;

const API_BASE: &str = "https://i.instagram.com/";
const WEB_APP_ID: &str = "936619743392459";

#[async_trait]
pub trait InstagramClient: Send + Sync {
    /// Whether `session` is still good for authenticated calls.
    async fn is_logged_in(&self, session: Option<&Session>) -> bool;

    /// Establish a session. Failures are classified rather than raised.
    async fn login(&self) -> Result<Session, AuthFailure>;

    /// Keep `session` for subsequent calls.
    async fn save_session(&self, session: &Session) -> Result<(), ClientError>;

    /// Up to `limit` most recent posts of `handle`.
    async fn medias_from_feed(&self, handle: &str, limit: u32)
    -> Result<Vec<RawMedia>, ClientError>;

    /// Numeric account id for `handle`, `None` when the profile does not expose one.
    async fn account_id(&self, handle: &str) -> Result<Option<u64>, ClientError>;

    async fn stories(&self, user_id: u64) -> Result<Vec<StoryCollection>, ClientError>;
}

pub struct InstagramApi {
    http: HttpClient,
    username: String,
    password_set: bool,
    cookies: SessionCookies,
    user_id_endpoint: String,
    active: RwLock<Option<Session>>,
}

impl InstagramApi {
    pub fn from_config(cfg: &ScraperConfig) -> Result<Self, HttpError> {
        Self::with_api_base(cfg, API_BASE)
    }

    /// Same as [`from_config`](Self::from_config) against a different API host.
    pub fn with_api_base(cfg: &ScraperConfig, api_base: &str) -> Result<Self, HttpError> {
        let http = HttpClient::new(api_base)?
            .with_default_header("user-agent", &cfg.user_agent)?
            .with_default_header("x-ig-app-id", WEB_APP_ID)?
            .with_default_header("accept", "application/json")?;
        Ok(Self {
            http,
            username: cfg.username.clone(),
            password_set: !cfg.password.is_empty(),
            cookies: cfg.cookies.clone(),
            user_id_endpoint: cfg.user_id_endpoint.clone(),
            active: RwLock::new(None),
        })
    }

    fn session_from_cookies(&self) -> Option<Session> {
        let session_id = self.cookies.sessionid.trim();
        if session_id.is_empty() {
            return None;
        }
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        let cookie_header = self
            .cookies
            .pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}={}", v.trim()))
            .collect::<Vec<_>>()
            .join("; ");
        Some(Session {
            session_id: session_id.to_string(),
            user_id: non_empty(&self.cookies.ds_user_id),
            csrf_token: non_empty(&self.cookies.csrftoken),
            cookie_header,
        })
    }

    fn session_headers(session: &Session) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        let cookie = HeaderValue::from_str(&session.cookie_header).map_err(|e| {
            ClientError::UnexpectedResponse(format!("session cookies are not a valid header: {e}"))
        })?;
        headers.insert(header::COOKIE, cookie);
        if let Some(token) = &session.csrf_token {
            if let Ok(v) = HeaderValue::from_str(token) {
                headers.insert("x-csrftoken", v);
            }
        }
        Ok(headers)
    }

    fn active_headers(&self) -> Result<HeaderMap, ClientError> {
        let guard = self
            .active
            .read()
            .map_err(|_| ClientError::UnexpectedResponse("session lock poisoned".into()))?;
        let session = guard.as_ref().ok_or(ClientError::NotLoggedIn)?;
        Self::session_headers(session)
    }

    fn profile_url(&self, handle: &str) -> Result<String, ClientError> {
        let handle = checked_handle(handle)?;
        Ok(self.user_id_endpoint.replace("%s", handle))
    }
}

/// Handles are spliced into URL paths, so only Instagram's username alphabet is allowed.
fn checked_handle(handle: &str) -> Result<&str, ClientError> {
    let valid = !handle.is_empty()
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    if valid {
        Ok(handle)
    } else {
        Err(ClientError::InvalidHandle(handle.to_string()))
    }
}

#[async_trait]
impl InstagramClient for InstagramApi {
    async fn is_logged_in(&self, session: Option<&Session>) -> bool {
        session.is_some_and(Session::is_usable)
    }

    async fn login(&self) -> Result<Session, AuthFailure> {
        let Some(session) = self.session_from_cookies() else {
            return Err(if !self.username.is_empty() && self.password_set {
                AuthFailure::InteractiveLoginUnsupported {
                    username: self.username.clone(),
                }
            } else {
                AuthFailure::MissingCredentials
            });
        };

        let headers = Self::session_headers(&session)
            .map_err(|e| AuthFailure::Rejected(e.to_string()))?;
        let probe: Result<Value, HttpError> = self
            .http
            .get_json(
                "api/v1/accounts/current_user/",
                RequestOpts {
                    headers: Some(headers),
                    query: Some(vec![("edit", "true".into())]),
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await;

        match probe {
            Ok(body) if body.get("user").is_some() => {
                tracing::debug!(user_id = ?session.user_id, "instagram.login.session_verified");
                Ok(session)
            }
            Ok(body) => Err(AuthFailure::Rejected(format!(
                "unexpected current_user response: {}",
                body.get("message").and_then(Value::as_str).unwrap_or("no user")
            ))),
            Err(HttpError::Api { message, .. })
                if message.contains("checkpoint") || message.contains("challenge") =>
            {
                Err(AuthFailure::Challenge(message))
            }
            Err(e) => Err(AuthFailure::Rejected(e.to_string())),
        }
    }

    async fn save_session(&self, session: &Session) -> Result<(), ClientError> {
        let mut guard = self
            .active
            .write()
            .map_err(|_| ClientError::UnexpectedResponse("session lock poisoned".into()))?;
        *guard = Some(session.clone());
        Ok(())
    }

    async fn medias_from_feed(
        &self,
        handle: &str,
        limit: u32,
    ) -> Result<Vec<RawMedia>, ClientError> {
        let path = format!("api/v1/feed/user/{}/username/", checked_handle(handle)?);
        let headers = self.active_headers()?;
        let body: Value = self
            .http
            .get_json(
                &path,
                RequestOpts {
                    headers: Some(headers),
                    query: Some(vec![("count", limit.to_string().into())]),
                    ..Default::default()
                },
            )
            .await?;

        let medias = medias_from_feed_response(&body, limit as usize);
        tracing::debug!(handle, count = medias.len(), "instagram.feed.fetched");
        Ok(medias)
    }

    async fn account_id(&self, handle: &str) -> Result<Option<u64>, ClientError> {
        let url = self.profile_url(handle)?;
        let headers = self.active_headers()?;
        let body: Value = self
            .http
            .get_json(
                &url,
                RequestOpts {
                    headers: Some(headers),
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(account_id_from_profile(&body))
    }

    async fn stories(&self, user_id: u64) -> Result<Vec<StoryCollection>, ClientError> {
        let headers = self.active_headers()?;
        let body: Value = self
            .http
            .get_json(
                "api/v1/feed/reels_media/",
                RequestOpts {
                    headers: Some(headers),
                    query: Some(vec![("reel_ids", user_id.to_string().into())]),
                    ..Default::default()
                },
            )
            .await?;

        if body.get("status").and_then(Value::as_str) == Some("fail") {
            return Err(ClientError::UnexpectedResponse(
                body.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("reels request failed")
                    .to_string(),
            ));
        }
        Ok(story_collections_from_response(&body))
    }
}
