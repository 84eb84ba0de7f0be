use igscrape_http::HttpError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Normalized attribute mapping persisted in the `data` column.
pub type MediaData = Map<String, Value>;

/// One post or story item as returned by the client: string keys to JSON values.
///
/// Keys follow the camelCase names used throughout the pipeline (`shortCode`,
/// `imageHighResolutionUrl`, `sidecarMedias`, ...). Nothing is guaranteed to be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMedia(Map<String, Value>);

impl RawMedia {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; anything but an object becomes an empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The `type` field when it is a string.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Identifier for log lines; numeric ids are rendered as text.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Carousel children in order. Non-object entries yield empty records so that
    /// they surface as unmapped children rather than vanishing.
    pub fn sidecar_medias(&self) -> Vec<RawMedia> {
        self.0
            .get("sidecarMedias")
            .and_then(Value::as_array)
            .map(|children| {
                children
                    .iter()
                    .cloned()
                    .map(RawMedia::from_value)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Epoch seconds stored under `createdTime`; `0` when absent or unparsable.
    pub fn created_time(&self) -> i64 {
        self.epoch("createdTime")
    }

    /// Epoch seconds stored under `modified`; `0` when absent or unparsable.
    pub fn modified(&self) -> i64 {
        self.epoch("modified")
    }

    fn epoch(&self, key: &str) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

impl From<Map<String, Value>> for RawMedia {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Stories published by one account, oldest first as delivered by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryCollection {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub items: Vec<RawMedia>,
}

impl StoryCollection {
    pub fn stories(&self) -> &[RawMedia] {
        &self.items
    }
}

/// An authenticated cookie session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub user_id: Option<String>,
    pub csrf_token: Option<String>,
    /// Ready-to-send `Cookie` header value.
    pub cookie_header: String,
}

impl Session {
    /// Both the session id and the owning user id cookie are required.
    pub fn is_usable(&self) -> bool {
        !self.session_id.trim().is_empty()
            && self.user_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }
}

/// Why a login attempt did not yield a usable session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthFailure {
    #[error("no session cookies or credentials configured")]
    MissingCredentials,

    #[error(
        "interactive login for '{username}' is not supported; supply browser session cookies"
    )]
    InteractiveLoginUnsupported { username: String },

    #[error("account requires a challenge to be completed: {0}")]
    Challenge(String),

    #[error("session rejected: {0}")]
    Rejected(String),
}

/// Failures surfaced by client calls after login.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("invalid account handle {0:?}")]
    InvalidHandle(String),
}
