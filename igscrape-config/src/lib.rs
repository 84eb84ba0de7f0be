//! Loader for the scraper configuration with YAML + environment overlays.
//!
//! The file mirrors the options the scrape job consumes: account credentials and
//! pre-fetched session cookies, destination/source table names, the per-account post
//! cap, the outbound user agent, and the id-resolution endpoint template. Environment
//! variables prefixed with `IGSCRAPE__` override file values (`__` separates nested
//! keys), and `${VAR}` placeholders are expanded after merging.
use config::{Config, ConfigError, Environment, File};
use igscrape_common::observability::{LogConfig, LogFormat};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.3; Win64; x64; rv:96.0) Gecko/20100101 Firefox/96.0";
pub const DEFAULT_USER_ID_ENDPOINT: &str = "https://www.instagram.com/%s/?__a=1";

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    #[serde(default, deserialize_with = "deserialize_opt_text")]
    pub version: Option<String>,

    #[serde(default, deserialize_with = "deserialize_text")]
    pub username: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub password: String,
    /// Cookies copied from a logged-in browser; they stand in for interactive login.
    #[serde(default)]
    pub cookies: SessionCookies,

    #[serde(default = "default_table_stories")]
    pub table_stories: String,
    #[serde(default = "default_table_posts")]
    pub table_posts: String,
    #[serde(default)]
    pub table_pages: PagesTable,

    /// How many of the latest posts to scrape per account each run.
    #[serde(
        default = "default_max_post_count",
        deserialize_with = "deserialize_count"
    )]
    pub max_post_count: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// URL template; `%s` is replaced by the account handle.
    #[serde(default = "default_user_id_endpoint")]
    pub user_id_endpoint: String,

    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionCookies {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub ig_did: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub mid: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub sessionid: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub csrftoken: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub ds_user_id: String,
}

impl SessionCookies {
    /// Cookie pairs in a fixed order, skipping empty values.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("ig_did", self.ig_did.as_str()),
            ("mid", self.mid.as_str()),
            ("sessionid", self.sessionid.as_str()),
            ("csrftoken", self.csrftoken.as_str()),
            ("ds_user_id", self.ds_user_id.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().is_empty()
    }
}

/// Source table holding the tracked accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct PagesTable {
    #[serde(default = "default_pages_name")]
    pub name: String,
    #[serde(default = "default_pages_url_field")]
    pub url_field: String,
    #[serde(default = "default_pages_id_field")]
    pub id_field: String,
}

impl Default for PagesTable {
    fn default() -> Self {
        Self {
            name: default_pages_name(),
            url_field: default_pages_url_field(),
            id_field: default_pages_id_field(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub stderr: bool,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            stderr: true,
            filter: default_log_filter(),
        }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            log_dir: self.dir.clone(),
            emit_stderr: self.stderr,
            format: self.format,
            default_filter: self.filter.clone(),
            ..LogConfig::default()
        }
    }
}

fn default_table_stories() -> String {
    "instagram_stories".into()
}
fn default_table_posts() -> String {
    "instagram_posts".into()
}
fn default_pages_name() -> String {
    "companies".into()
}
fn default_pages_url_field() -> String {
    "instagram".into()
}
fn default_pages_id_field() -> String {
    "id".into()
}
fn default_max_post_count() -> u32 {
    1
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_user_id_endpoint() -> String {
    DEFAULT_USER_ID_ENDPOINT.into()
}
fn default_database_url() -> String {
    "sqlite://igscrape.db".into()
}
fn default_log_filter() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

/// Accepts both `5` and `"5"`, so a quoted count in YAML still loads.
fn deserialize_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Num(u32),
        Text(String),
    }

    match Count::deserialize(deserializer)? {
        Count::Num(n) => Ok(n),
        Count::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Scalar that YAML or the parsed environment may hand back as a number or bool.
#[derive(Deserialize)]
#[serde(untagged)]
enum Text {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl From<Text> for String {
    fn from(t: Text) -> Self {
        match t {
            Text::Str(s) => s,
            Text::Int(n) => n.to_string(),
            Text::UInt(n) => n.to_string(),
            Text::Float(n) => n.to_string(),
            Text::Bool(b) => b.to_string(),
        }
    }
}

/// Ids such as `ds_user_id: 123456789` are written unquoted; keep them as text.
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Text>::deserialize(deserializer)?
        .map(String::from)
        .unwrap_or_default())
}

fn deserialize_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Text>::deserialize(deserializer)?.map(String::from))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier regex"))
}

/// Whether `name` can be spliced into SQL as a table or column name.
pub fn is_sql_identifier(name: &str) -> bool {
    identifier_re().is_match(name)
}

impl ScraperConfig {
    /// Table and column names are spliced into SQL, so they must be plain identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let idents = [
            ("table_stories", self.table_stories.as_str()),
            ("table_posts", self.table_posts.as_str()),
            ("table_pages.name", self.table_pages.name.as_str()),
            ("table_pages.url_field", self.table_pages.url_field.as_str()),
            ("table_pages.id_field", self.table_pages.id_field.as_str()),
        ];
        for (key, ident) in idents {
            if !is_sql_identifier(ident) {
                return Err(ConfigError::Message(format!(
                    "{key} must be a plain SQL identifier, got {ident:?}"
                )));
            }
        }
        if self.table_posts == self.table_stories {
            return Err(ConfigError::Message(
                "table_posts and table_stories must name different tables".into(),
            ));
        }
        if self.max_post_count == 0 {
            return Err(ConfigError::Message("max_post_count must be at least 1".into()));
        }
        if !self.user_id_endpoint.contains("%s") {
            return Err(ConfigError::Message(format!(
                "user_id_endpoint must contain a %s placeholder, got {:?}",
                self.user_id_endpoint
            )));
        }
        Ok(())
    }
}

// Recursive `${VAR}` expansion with a depth cap so cyclic variables terminate.
fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct ScraperConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ScraperConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScraperConfigLoader {
    /// Start with no files; only `IGSCRAPE__` env overrides apply.
    ///
    /// ```
    /// use igscrape_config::ScraperConfigLoader;
    ///
    /// let config = ScraperConfigLoader::new()
    ///     .with_yaml_str("version: '1'\nusername: scout")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.table_posts, "instagram_posts");
    /// assert_eq!(config.max_post_count, 1);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file) but tolerates a missing file so
    /// deployments can rely purely on environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use igscrape_config::ScraperConfigLoader;
    ///
    /// let cfg = ScraperConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// table_pages:
    ///   name: brands
    ///   url_field: ig_url
    /// cookies:
    ///   sessionid: "abc"
    /// max_post_count: 5
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.table_pages.name, "brands");
    /// assert_eq!(cfg.table_pages.id_field, "id");
    /// assert_eq!(cfg.cookies.sessionid, "abc");
    /// assert_eq!(cfg.max_post_count, 5);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into [`ScraperConfig`].
    ///
    /// Sources merge in the order they were attached; `IGSCRAPE__` environment
    /// variables are applied last so they win. `${VAR}` placeholders are expanded
    /// before the typed struct is built and validated.
    pub fn load(self) -> Result<ScraperConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("IGSCRAPE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: ScraperConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn from_yaml(yaml: &str) -> Result<ScraperConfig, ConfigError> {
        ScraperConfigLoader::new().with_yaml_str(yaml).load()
    }

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Winston")), ("STATE", Some("NC"))], || {
            let mut v = json!([
                "hello-$CITY",
                { "loc": "${CITY}-${STATE}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Winston", { "loc": "Winston-NC" }, 42, true, null])
            );
        });
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${IGSCRAPE_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${IGSCRAPE_DOES_NOT_EXIST}"));
    }

    #[test]
    fn defaults_match_stock_configuration() {
        let cfg = from_yaml("version: '1'").unwrap();
        assert_eq!(cfg.table_stories, "instagram_stories");
        assert_eq!(cfg.table_posts, "instagram_posts");
        assert_eq!(cfg.table_pages.name, "companies");
        assert_eq!(cfg.table_pages.url_field, "instagram");
        assert_eq!(cfg.table_pages.id_field, "id");
        assert_eq!(cfg.max_post_count, 1);
        assert_eq!(cfg.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(cfg.user_id_endpoint, DEFAULT_USER_ID_ENDPOINT);
        assert!(cfg.cookies.is_empty());
        assert!(cfg.logging.stderr);
    }

    #[test]
    fn count_accepts_quoted_numbers() {
        let cfg = from_yaml("max_post_count: '12'").unwrap();
        assert_eq!(cfg.max_post_count, 12);
    }

    #[test]
    fn rejects_table_names_that_are_not_identifiers() {
        let err = from_yaml("table_posts: 'posts; DROP TABLE companies'").unwrap_err();
        assert!(err.to_string().contains("table_posts"));
    }

    #[test]
    fn rejects_zero_post_count() {
        assert!(from_yaml("max_post_count: 0").is_err());
    }

    #[test]
    fn rejects_endpoint_without_placeholder() {
        let err = from_yaml("user_id_endpoint: 'https://example.com/profile'").unwrap_err();
        assert!(err.to_string().contains("%s"));
    }

    #[test]
    fn rejects_shared_destination_table() {
        assert!(from_yaml("table_posts: media\ntable_stories: media").is_err());
    }

    #[test]
    fn cookie_pairs_skip_blank_values() {
        let cfg = from_yaml("cookies:\n  sessionid: s1\n  csrftoken: ' '\n  mid: m1").unwrap();
        assert_eq!(cfg.cookies.pairs(), vec![("mid", "m1"), ("sessionid", "s1")]);
    }

    #[test]
    fn unquoted_numeric_cookie_stays_text() {
        let cfg = from_yaml("cookies:\n  sessionid: abc\n  ds_user_id: 123456789\n").unwrap();
        assert_eq!(cfg.cookies.ds_user_id, "123456789");
        assert_eq!(
            cfg.cookies.pairs(),
            vec![("sessionid", "abc"), ("ds_user_id", "123456789")]
        );
    }

    #[test]
    fn numeric_credentials_and_version_load_as_text() {
        let cfg = from_yaml("version: 2\nusername: 1234\npassword: 987654").unwrap();
        assert_eq!(cfg.version.as_deref(), Some("2"));
        assert_eq!(cfg.username, "1234");
        assert_eq!(cfg.password, "987654");
    }

    #[test]
    fn logging_section_maps_to_log_config() {
        let cfg = from_yaml("logging:\n  format: json\n  stderr: false\n  filter: debug").unwrap();
        let log = cfg.logging.to_log_config();
        assert_eq!(log.format, LogFormat::Json);
        assert!(!log.emit_stderr);
        assert_eq!(log.default_filter, "debug");
        assert_eq!(log.app_name, "igscrape");
    }
}
