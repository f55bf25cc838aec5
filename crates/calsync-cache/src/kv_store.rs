//! SQLite implementation of IKeyValueStore
//!
//! Each key is one row of the `kv_store` table. `set_many` writes all
//! entries inside a single transaction, so a snapshot and its cursor are
//! either both stored or neither is.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use calsync_core::ports::IKeyValueStore;

use crate::CacheError;

const UPSERT_SQL: &str = "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?) \
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

/// SQLite-based implementation of the key-value store port
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Removes `key`; returns true if a row was deleted
    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns every stored key in ascending order
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query("SELECT key FROM kv_store ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("key")).collect())
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let updated_at = Utc::now().to_rfc3339();

        sqlx::query(UPSERT_SQL)
            .bind(key)
            .bind(value)
            .bind(&updated_at)
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;

        tracing::trace!(key, bytes = value.len(), "Stored value");
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;

        for (key, value) in entries {
            sqlx::query(UPSERT_SQL)
                .bind(*key)
                .bind(value)
                .bind(&updated_at)
                .execute(&mut *tx)
                .await
                .map_err(CacheError::from)?;
        }

        tx.commit().await.map_err(CacheError::from)?;

        tracing::trace!(entries = entries.len(), "Stored values in one transaction");
        Ok(())
    }
}
