use async_trait::async_trait;
use igscrape_common::{IgscrapeError, ScrapeMode};
use igscrape_config::{ScraperConfig, ScraperConfigLoader};
use igscrape_jobs::{Scraper, SqliteStore};
use igscrape_social::instagram::{
    AuthFailure, ClientError, InstagramClient, RawMedia, Session, StoryCollection,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn session() -> Session {
    Session {
        session_id: "sess".into(),
        user_id: Some("42".into()),
        csrf_token: Some("csrf".into()),
        cookie_header: "sessionid=sess; ds_user_id=42".into(),
    }
}

/// Scripted client: per-handle feeds and ids, per-id reels.
struct FakeClient {
    login: Result<Session, AuthFailure>,
    feeds: HashMap<&'static str, Vec<Value>>,
    ids: HashMap<&'static str, Option<u64>>,
    reels: HashMap<u64, Vec<Vec<Value>>>,
    save_fails: bool,
    logins: AtomicUsize,
    limits: Mutex<Vec<u32>>,
}

impl FakeClient {
    fn logged_in() -> Self {
        Self {
            login: Ok(session()),
            feeds: HashMap::new(),
            ids: HashMap::new(),
            reels: HashMap::new(),
            save_fails: false,
            logins: AtomicUsize::new(0),
            limits: Mutex::new(Vec::new()),
        }
    }

    fn failing_login() -> Self {
        Self {
            login: Err(AuthFailure::Challenge("checkpoint_required".into())),
            ..Self::logged_in()
        }
    }
}

#[async_trait]
impl InstagramClient for FakeClient {
    async fn is_logged_in(&self, session: Option<&Session>) -> bool {
        session.is_some_and(Session::is_usable)
    }

    async fn login(&self) -> Result<Session, AuthFailure> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.login.clone()
    }

    async fn save_session(&self, _session: &Session) -> Result<(), ClientError> {
        if self.save_fails {
            return Err(ClientError::UnexpectedResponse("session store is read-only".into()));
        }
        Ok(())
    }

    async fn medias_from_feed(
        &self,
        handle: &str,
        limit: u32,
    ) -> Result<Vec<RawMedia>, ClientError> {
        self.limits.lock().unwrap().push(limit);
        self.feeds
            .get(handle)
            .map(|items| items.iter().cloned().map(RawMedia::from_value).collect())
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("no feed for {handle}")))
    }

    async fn account_id(&self, handle: &str) -> Result<Option<u64>, ClientError> {
        self.ids
            .get(handle)
            .copied()
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("no profile for {handle}")))
    }

    async fn stories(&self, user_id: u64) -> Result<Vec<StoryCollection>, ClientError> {
        Ok(self
            .reels
            .get(&user_id)
            .map(|reels| {
                reels
                    .iter()
                    .map(|items| StoryCollection {
                        owner_id: Some(user_id.to_string()),
                        items: items.iter().cloned().map(RawMedia::from_value).collect(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn config() -> ScraperConfig {
    ScraperConfigLoader::new()
        .with_yaml_str("max_post_count: 5\n")
        .load()
        .expect("test config")
}

async fn setup(accounts: &[(i64, Option<&str>)]) -> (Arc<SqliteStore>, ScraperConfig) {
    let cfg = config();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("CREATE TABLE companies (id INTEGER PRIMARY KEY, instagram TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    for &(id, reference) in accounts {
        sqlx::query("INSERT INTO companies (id, instagram) VALUES (?1, ?2)")
            .bind(id)
            .bind(reference)
            .execute(&pool)
            .await
            .unwrap();
    }

    let store = Arc::new(SqliteStore::new(pool, cfg.table_pages.clone()));
    store.ensure_media_table(&cfg.table_posts).await.unwrap();
    store.ensure_media_table(&cfg.table_stories).await.unwrap();
    (store, cfg)
}

async fn seed(pool: &SqlitePool, table: &str, rows: usize) {
    for i in 0..rows {
        sqlx::query(&format!(
            "INSERT INTO {table} (owner_id, data, created_at, updated_at) VALUES (99, ?1, '2000-01-01 00:00:00', '2000-01-01 00:00:00')"
        ))
        .bind(format!(r#"{{"id":"stale-{i}"}}"#))
        .execute(pool)
        .await
        .unwrap();
    }
}

async fn rows(pool: &SqlitePool, table: &str) -> Vec<(i64, Value, String)> {
    sqlx::query(&format!(
        "SELECT owner_id, data, created_at FROM {table} ORDER BY id"
    ))
    .fetch_all(pool)
    .await
    .unwrap()
    .into_iter()
    .map(|r| {
        let data: String = r.get("data");
        (
            r.get("owner_id"),
            serde_json::from_str(&data).unwrap(),
            r.get("created_at"),
        )
    })
    .collect()
}

fn scraper(client: FakeClient, store: &Arc<SqliteStore>, cfg: &ScraperConfig) -> Scraper<FakeClient> {
    Scraper::new(client, cfg, store.clone(), store.clone())
}

#[tokio::test]
async fn posts_replace_table_and_skip_failing_accounts() {
    let (store, cfg) = setup(&[
        (1, Some("https://www.instagram.com/broken/")),
        (2, Some("https://www.instagram.com/brand")),
        (3, None),
    ])
    .await;
    seed(store.pool(), &cfg.table_posts, 2).await;

    let mut client = FakeClient::logged_in();
    client.feeds.insert(
        "brand",
        vec![
            json!({"id": "p1", "type": "image", "createdTime": 1_642_500_000, "modified": 1_642_500_000,
                   "imageThumbnailUrl": "https://cdn/1.jpg", "videoViews": 3}),
            json!({"id": "p2", "type": "video", "createdTime": 1_642_500_000, "modified": 1_642_500_000,
                   "videoStandardResolutionUrl": "https://cdn/2.mp4", "videoViews": 3}),
            json!({"id": "p3", "type": "sidecar", "createdTime": 1_642_500_000, "modified": 1_642_500_000,
                   "sidecarMedias": [{"type": "image", "imageHighResolutionUrl": "https://cdn/3.jpg"}]}),
        ],
    );

    let mut scraper = scraper(client, &store, &cfg);
    let written = scraper.scrape_posts().await.unwrap();
    assert_eq!(written, 3);

    let stored = rows(store.pool(), &cfg.table_posts).await;
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|(owner, _, created)| *owner == 2 && created == "2022-01-18 10:00:00"));
    assert!(stored.iter().all(|(_, data, _)| !data["id"].as_str().unwrap().starts_with("stale")));
    assert!(stored[0].1.get("videoViews").is_none());
    assert_eq!(stored[1].1["videoViews"], 3);
    assert_eq!(
        stored[2].1["sidecar_images"],
        json!({"imageHighResolutionUrl": "https://cdn/3.jpg"})
    );

    assert_eq!(*scraper.client().limits.lock().unwrap(), vec![5, 5]);
}

#[tokio::test]
async fn login_failure_returns_zero_and_leaves_table_alone() {
    let (store, cfg) = setup(&[(1, Some("brand"))]).await;
    seed(store.pool(), &cfg.table_posts, 2).await;
    seed(store.pool(), &cfg.table_stories, 1).await;

    let mut scraper = scraper(FakeClient::failing_login(), &store, &cfg);
    assert_eq!(scraper.scrape_posts().await.unwrap(), 0);
    assert_eq!(scraper.scrape_stories().await.unwrap(), 0);

    assert_eq!(rows(store.pool(), &cfg.table_posts).await.len(), 2);
    assert_eq!(rows(store.pool(), &cfg.table_stories).await.len(), 1);
}

#[tokio::test]
async fn unsaved_session_counts_as_failed_login() {
    let (store, cfg) = setup(&[(1, Some("brand"))]).await;
    seed(store.pool(), &cfg.table_posts, 2).await;

    let mut client = FakeClient::logged_in();
    client.save_fails = true;
    client.feeds.insert("brand", vec![json!({"id": "p1", "type": "image"})]);

    let mut scraper = scraper(client, &store, &cfg);
    assert_eq!(scraper.scrape_posts().await.unwrap(), 0);

    let stored = rows(store.pool(), &cfg.table_posts).await;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|(owner, _, _)| *owner == 99));
    assert!(scraper.client().limits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn stories_skip_unresolved_accounts() {
    let (store, cfg) = setup(&[
        (10, Some("https://www.instagram.com/withstories/")),
        (11, Some("noid")),
        (12, Some("unknown")),
    ])
    .await;
    seed(store.pool(), &cfg.table_stories, 3).await;

    let mut client = FakeClient::logged_in();
    client.ids.insert("withstories", Some(777));
    client.ids.insert("noid", None);
    client.reels.insert(
        777,
        vec![vec![
            json!({"type": "image", "createdTime": 1_642_500_000, "modified": 1_642_500_000,
                   "imageStandardResolutionUrl": "https://cdn/s1.jpg", "caption": "dropped"}),
            json!({"type": "video", "createdTime": 1_642_500_000, "modified": 1_642_500_000,
                   "videoLowResolutionUrl": "https://cdn/s2.mp4", "videoDuration": 4}),
        ]],
    );

    let mut scraper = scraper(client, &store, &cfg);
    assert_eq!(scraper.scrape_stories().await.unwrap(), 2);

    let stored = rows(store.pool(), &cfg.table_stories).await;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|(owner, _, _)| *owner == 10));
    assert_eq!(stored[0].1, json!({"imageStandardResolutionUrl": "https://cdn/s1.jpg"}));
    assert_eq!(stored[1].1, json!({"videoLowResolutionUrl": "https://cdn/s2.mp4"}));
}

#[tokio::test]
async fn all_mode_logs_in_once_and_fills_both_tables() {
    let (store, cfg) = setup(&[(1, Some("brand"))]).await;

    let mut client = FakeClient::logged_in();
    client
        .feeds
        .insert("brand", vec![json!({"id": "p1", "type": "image"})]);
    client.ids.insert("brand", Some(5));
    client
        .reels
        .insert(5, vec![vec![json!({"type": "image", "imageThumbnailUrl": "t"})]]);

    let mut scraper = scraper(client, &store, &cfg);
    scraper.run(ScrapeMode::All).await.unwrap();

    assert_eq!(scraper.client().logins.load(Ordering::SeqCst), 1);
    assert_eq!(rows(store.pool(), &cfg.table_posts).await.len(), 1);
    let stories = rows(store.pool(), &cfg.table_stories).await;
    assert_eq!(stories.len(), 1);
    assert_eq!(stories[0].2, "1970-01-01 00:00:00");
}

#[tokio::test]
async fn single_mode_touches_only_its_table() {
    let (store, cfg) = setup(&[(1, Some("brand"))]).await;
    seed(store.pool(), &cfg.table_posts, 1).await;

    let mut client = FakeClient::logged_in();
    client.ids.insert("brand", Some(5));

    let mut scraper = scraper(client, &store, &cfg);
    scraper.run(ScrapeMode::Story).await.unwrap();

    assert_eq!(rows(store.pool(), &cfg.table_posts).await.len(), 1);
    assert!(scraper.client().limits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn run_with_nothing_fetched_empties_the_table() {
    let (store, cfg) = setup(&[(1, Some("broken"))]).await;
    seed(store.pool(), &cfg.table_posts, 4).await;

    let mut scraper = scraper(FakeClient::logged_in(), &store, &cfg);
    assert_eq!(scraper.scrape_posts().await.unwrap(), 0);
    assert!(rows(store.pool(), &cfg.table_posts).await.is_empty());
}

#[tokio::test]
async fn account_enumeration_failure_aborts() {
    let (store, cfg) = setup(&[(1, Some("brand"))]).await;
    seed(store.pool(), &cfg.table_posts, 1).await;
    sqlx::query("DROP TABLE companies")
        .execute(store.pool())
        .await
        .unwrap();

    let mut scraper = scraper(FakeClient::logged_in(), &store, &cfg);
    let err = scraper.scrape_posts().await.unwrap_err();
    assert!(matches!(err, IgscrapeError::Storage(_)));
    assert_eq!(rows(store.pool(), &cfg.table_posts).await.len(), 1);
}
