//! JSON-over-HTTP transport for the Instagram web API.
//!
//! [`HttpClient`] wraps a `reqwest::Client` anchored to a base URL. Every GET carries the
//! client's default headers merged with the per-call [`RequestOpts`] headers, where the
//! call's value wins. Throttling (429) and server errors are retried with exponential
//! backoff, honouring `Retry-After`. Cookie and CSRF values never reach the logs; set
//! `IGSCRAPE_HTTP_RAW=1` to also log redacted headers and response bodies.
//!
//! ```no_run
//! # async fn demo() -> Result<(), igscrape_http::HttpError> {
//! use igscrape_http::{HttpClient, RequestOpts};
//!
//! let client = HttpClient::new("https://i.instagram.com/")?
//!     .with_default_header("x-ig-app-id", "936619743392459")?;
//! let feed: serde_json::Value = client
//!     .get_json("api/v1/feed/user/instagram/username/", RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```

pub use reqwest::header;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;

const RAW_LOG_ENV: &str = "IGSCRAPE_HTTP_RAW";
const RAW_BODY_LIMIT: usize = 64 * 1024;
const SNIPPET_LIMIT: usize = 500;
const THROTTLE_FLOOR: Duration = Duration::from_millis(1100);
const REDACTED: &str = "<redacted>";
const SECRET_HEADERS: &[&str] = &["cookie", "set-cookie", "x-csrftoken", "authorization"];

fn raw_logging() -> bool {
    env::var(RAW_LOG_ENV).is_ok_and(|v| matches!(v.trim(), "1" | "true" | "yes"))
}

fn is_secret_header(name: &str) -> bool {
    SECRET_HEADERS
        .iter()
        .any(|secret| name.eq_ignore_ascii_case(secret))
}

fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if is_secret_header(name.as_str()) {
                REDACTED.to_owned()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_owned(), shown)
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("could not build request: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("could not decode response: {0} (body: {1})")]
    Decode(String, String),
    #[error("HTTP {status}: {message} (request {request_id})")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// Status code for [`HttpError::Api`] responses.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Per-call overrides. Unset fields fall back to the client's defaults.
///
/// ```
/// use igscrape_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     query: Some(vec![("count", "12".into())]),
///     ..Default::default()
/// };
/// assert!(opts.retries.is_none());
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// Treat an absolute `path` as the full URL instead of joining it to the base.
    pub allow_absolute: bool,
}

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    default_headers: HeaderMap,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

/// A response read to the end.
struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    elapsed_ms: u64,
}

impl Reply {
    fn trace_id(&self) -> Option<&str> {
        self.headers
            .get("x-fb-trace-id")
            .or_else(|| self.headers.get("x-request-id"))
            .and_then(|v| v.to_str().ok())
    }
}

enum Step<T> {
    Done(Result<T, HttpError>),
    Retry { delay: Duration, reason: String },
}

impl HttpClient {
    /// Client for `base` with a 15 s timeout and two retries.
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_headers: HeaderMap::new(),
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Add a header sent with every request.
    ///
    /// ```
    /// use igscrape_http::HttpClient;
    ///
    /// let client = HttpClient::new("https://example.com")
    ///     .unwrap()
    ///     .with_default_header("user-agent", " igscrape-test/1.0 ")
    ///     .unwrap();
    /// assert_eq!(client.default_header("user-agent"), Some("igscrape-test/1.0"));
    /// ```
    pub fn with_default_header(mut self, name: &str, value: &str) -> Result<Self, HttpError> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::Build(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| HttpError::Build(format!("value for {name}: {e}")))?;
        self.default_headers.insert(header, value);
        Ok(self)
    }

    pub fn default_header(&self, name: &str) -> Option<&str> {
        self.default_headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let url = self.resolve_url(path, opts.allow_absolute)?;
        let mut headers = self.default_headers.clone();
        if let Some(extra) = &opts.headers {
            for (name, value) in extra {
                headers.insert(name, value.clone());
            }
        }
        let query: Vec<(&str, &str)> = opts
            .query
            .iter()
            .flatten()
            .map(|(k, v)| (*k, v.as_ref()))
            .collect();
        let retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let request_id = format!("r{}", uuid::Uuid::new_v4().simple());

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            tracing::debug!(
                %request_id,
                attempt,
                retries,
                host = url.host_str().unwrap_or("-"),
                path = url.path(),
                query = ?query,
                timeout_ms = timeout.as_millis() as u64,
                with_session = headers.contains_key(COOKIE),
                "http.request.start"
            );

            let step = match self.fetch(&url, &headers, &query, timeout, &request_id).await {
                Ok(reply) => settle(reply, attempt, retries, &request_id),
                Err(err) if attempt <= retries => Step::Retry {
                    delay: backoff(attempt),
                    reason: err.to_string(),
                },
                Err(err) => {
                    tracing::warn!(%request_id, attempt, error = %err, "http.request.network_error");
                    Step::Done(Err(HttpError::Network(err.to_string())))
                }
            };

            match step {
                Step::Done(result) => return result,
                Step::Retry { delay, reason } => {
                    tracing::warn!(
                        %request_id,
                        attempt,
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "http.request.retry"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    fn resolve_url(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        if allow_absolute {
            if let Ok(abs) = Url::parse(path) {
                return Ok(abs);
            }
        }
        self.base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))
    }

    async fn fetch(
        &self,
        url: &Url,
        headers: &HeaderMap,
        query: &[(&str, &str)],
        timeout: Duration,
        request_id: &str,
    ) -> Result<Reply, reqwest::Error> {
        let mut req = self
            .inner
            .get(url.clone())
            .timeout(timeout)
            .headers(headers.clone());
        if !query.is_empty() {
            req = req.query(query);
        }
        if raw_logging() {
            tracing::debug!(
                target: "http.raw",
                request_id,
                url = %url,
                headers = ?redact_headers(headers),
                "request"
            );
        }

        let started = Instant::now();
        let resp = req.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();
        Ok(Reply {
            status,
            headers,
            body,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn settle<T: DeserializeOwned>(
    reply: Reply,
    attempt: usize,
    retries: usize,
    request_id: &str,
) -> Step<T> {
    let trace_id = reply.trace_id().unwrap_or(request_id).to_owned();
    tracing::debug!(
        request_id,
        status = %reply.status,
        duration_ms = reply.elapsed_ms,
        body_len = reply.body.len(),
        %trace_id,
        "http.response"
    );
    if raw_logging() {
        let shown = &reply.body[..reply.body.len().min(RAW_BODY_LIMIT)];
        tracing::info!(
            target: "http.raw",
            request_id,
            status = %reply.status,
            headers = ?redact_headers(&reply.headers),
            body = %String::from_utf8_lossy(shown),
            truncated = reply.body.len() > RAW_BODY_LIMIT,
            "response"
        );
    }

    if reply.status.is_success() {
        return Step::Done(serde_json::from_slice(&reply.body).map_err(|e| {
            let snippet = snip_body(&reply.body);
            tracing::warn!(request_id, error = %e, body = %snippet, "http.response.decode_error");
            HttpError::Decode(e.to_string(), snippet)
        }));
    }

    let message = extract_error_message(&reply.body);
    if attempt <= retries {
        if let Some(delay) = retry_delay(reply.status, &reply.headers, attempt) {
            return Step::Retry {
                delay,
                reason: format!("{}: {message}", reply.status),
            };
        }
    }

    tracing::warn!(
        request_id,
        status = %reply.status,
        %message,
        %trace_id,
        body = %snip_body(&reply.body),
        "http.error"
    );
    Step::Done(Err(HttpError::Api {
        status: reply.status,
        message,
        request_id: trace_id,
    }))
}

/// Delay before retrying `status`, or `None` when it is not worth retrying.
fn retry_delay(status: StatusCode, headers: &HeaderMap, attempt: usize) -> Option<Duration> {
    let throttled = status == StatusCode::TOO_MANY_REQUESTS;
    if !throttled && !status.is_server_error() {
        return None;
    }
    let hinted = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    Some(match hinted {
        Some(delay) => delay,
        None if throttled => backoff(attempt).max(THROTTLE_FLOOR),
        None => backoff(attempt),
    })
}

fn backoff(attempt: usize) -> Duration {
    let exp = attempt.saturating_sub(1).min(10) as u32;
    Duration::from_millis(200) * 2u32.pow(exp)
}

// Instagram errors look like {"message":"checkpoint_required","status":"fail","error_type":"..."}.
fn extract_error_message(body: &[u8]) -> String {
    let parsed = serde_json::from_slice::<Value>(body).ok();
    ["message", "error_type", "detail"]
        .iter()
        .find_map(|key| {
            parsed
                .as_ref()?
                .get(key)?
                .as_str()
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| snip_body(body))
}

fn snip_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= SNIPPET_LIMIT {
        return text.into_owned();
    }
    let cut = (0..=SNIPPET_LIMIT)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}...", &text[..cut])
}
