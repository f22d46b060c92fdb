use crate::storage::cache::{CacheEntry, CacheStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// `cache_entries` table; survives process restarts so repeated runs within
/// the TTL reuse fetched market data.
#[derive(Debug, Clone)]
pub struct PgCache {
    pool: sqlx::PgPool,
}

impl PgCache {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CacheStore for PgCache {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, (Value, DateTime<Utc>)>(
            "SELECT value, stored_at FROM cache_entries WHERE key = $1",
        )
        .persistent(false)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select cache_entries failed (key={key})"))?;

        Ok(row.map(|(value, stored_at)| CacheEntry { value, stored_at }))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO cache_entries (key, value, stored_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, stored_at = EXCLUDED.stored_at",
        )
        .persistent(false)
        .bind(key)
        .bind(entry.value)
        .bind(entry.stored_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert cache_entries failed (key={key})"))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .persistent(false)
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete cache_entries failed (key={key})"))?;
        Ok(())
    }
}
