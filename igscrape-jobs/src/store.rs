//! SQLite persistence for scrape runs.
//!
//! Source accounts come from the configured pages table, which this crate only reads.
//! Posts and stories tables share one layout and are always rewritten whole: the delete
//! and every insert run in a single transaction, so a failed run leaves the previous
//! contents in place.
use crate::{NormalizedRecord, SourceAccount};
use anyhow::{ensure, Result};
use igscrape_config::{is_sql_identifier, PagesTable};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

#[async_trait::async_trait]
pub trait AccountSource: Send + Sync {
    /// Accounts with a non-NULL profile reference.
    async fn load_accounts(&self) -> Result<Vec<SourceAccount>>;
}

#[async_trait::async_trait]
pub trait MediaRepository: Send + Sync {
    /// Replace every row of `table` with `records`; returns the number of rows written.
    async fn replace_all(&self, table: &str, records: &[NormalizedRecord]) -> Result<u64>;
}

pub struct SqliteStore {
    pool: SqlitePool,
    pages: PagesTable,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, pages: PagesTable) -> Self {
        Self { pool, pages }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a posts/stories table if it is missing.
    pub async fn ensure_media_table(&self, table: &str) -> Result<()> {
        let table = checked_identifier(table)?;
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 owner_id INTEGER NOT NULL,
                 data TEXT NOT NULL,
                 created_at TEXT,
                 updated_at TEXT
               )"#
        ))
        .execute(&self.pool)
        .await?;
        debug!(table, "store.ensure_media_table");
        Ok(())
    }
}

fn checked_identifier(name: &str) -> Result<&str> {
    ensure!(is_sql_identifier(name), "not a valid SQL identifier: {name:?}");
    Ok(name)
}

#[async_trait::async_trait]
impl AccountSource for SqliteStore {
    async fn load_accounts(&self) -> Result<Vec<SourceAccount>> {
        let table = checked_identifier(&self.pages.name)?;
        let id_field = checked_identifier(&self.pages.id_field)?;
        let url_field = checked_identifier(&self.pages.url_field)?;

        let rows = sqlx::query(&format!(
            r#"SELECT {id_field} AS account_id, {url_field} AS profile_reference
               FROM {table}
               WHERE {url_field} IS NOT NULL
               ORDER BY {id_field} ASC"#
        ))
        .fetch_all(&self.pool)
        .await?;

        let accounts = rows
            .into_iter()
            .map(|r| {
                Ok(SourceAccount {
                    id: r.try_get::<i64, _>("account_id")?,
                    profile_reference: r.try_get::<String, _>("profile_reference")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!(table, accounts = accounts.len(), "store.load_accounts");
        Ok(accounts)
    }
}

#[async_trait::async_trait]
impl MediaRepository for SqliteStore {
    async fn replace_all(&self, table: &str, records: &[NormalizedRecord]) -> Result<u64> {
        let table = checked_identifier(table)?;
        let insert = format!(
            r#"INSERT INTO {table} (owner_id, data, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4)"#
        );

        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        debug!(table, deleted, "store.replace_all.cleared");

        let mut written = 0u64;
        for record in records {
            let res = sqlx::query(&insert)
                .bind(record.owner_id)
                .bind(record.data_json()?)
                .bind(record.created_at.as_str())
                .bind(record.updated_at.as_str())
                .execute(&mut *tx)
                .await?;
            written += res.rows_affected();
        }

        tx.commit().await?;
        info!(table, deleted, rows_written = written, "store.replace_all");
        Ok(written)
    }
}
