use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const PRICE_DATA_KEY: &str = "goldsense_data";
pub const EXCHANGE_RATE_KEY: &str = "goldsense_exchange_rate";
pub const LOCATION_KEY: &str = "goldsense_location";
pub const CURRENCY_PREFERENCE_KEY: &str = "goldsense_currency";

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.stored_at <= ttl
    }
}

/// Key-value store for fetched market data and user preferences.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn get(&self, key: &str) -> anyhow::Result<Option<CacheEntry>>;

    async fn put(&self, key: &str, entry: CacheEntry) -> anyhow::Result<()>;

    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Process-local store; used by tests, offline runs and the API's degraded mode.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: tokio::sync::RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> anyhow::Result<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Reads `key` if it was stored within `ttl` of `now`. Expired entries are removed.
pub async fn get_fresh<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<T>> {
    let Some(entry) = store.get(key).await? else {
        return Ok(None);
    };

    if !entry.is_fresh(ttl, now) {
        tracing::debug!(key, stored_at = %entry.stored_at, "cache entry expired");
        store.remove(key).await?;
        return Ok(None);
    }

    let value = serde_json::from_value::<T>(entry.value)
        .with_context(|| format!("cache entry {key} has unexpected shape"))?;
    Ok(Some(value))
}

/// Reads `key` regardless of age.
pub async fn get_value<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    let Some(entry) = store.get(key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_value::<T>(entry.value)
        .with_context(|| format!("cache entry {key} has unexpected shape"))?;
    Ok(Some(value))
}

pub async fn put_value<T: Serialize + ?Sized>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let value = serde_json::to_value(value).with_context(|| format!("serialize cache entry {key}"))?;
    store
        .put(
            key,
            CacheEntry {
                value,
                stored_at: now,
            },
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn fresh_entries_round_trip() {
        let store = MemoryCache::new();
        put_value(&store, EXCHANGE_RATE_KEY, &88.25f64, at(1)).await.unwrap();

        let rate: Option<f64> = get_fresh(&store, EXCHANGE_RATE_KEY, Duration::hours(24), at(12))
            .await
            .unwrap();
        assert_eq!(rate, Some(88.25));
    }

    #[tokio::test]
    async fn expired_entries_are_removed() {
        let store = MemoryCache::new();
        put_value(&store, PRICE_DATA_KEY, &vec![1, 2, 3], at(0)).await.unwrap();

        let later = at(0) + Duration::hours(24) + Duration::seconds(1);
        let hit: Option<Vec<i32>> = get_fresh(&store, PRICE_DATA_KEY, Duration::hours(24), later)
            .await
            .unwrap();
        assert_eq!(hit, None);
        assert!(store.get(PRICE_DATA_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_value_ignores_age() {
        let store = MemoryCache::new();
        put_value(&store, CURRENCY_PREFERENCE_KEY, "INR", at(0)).await.unwrap();
        let pref: Option<String> = get_value(&store, CURRENCY_PREFERENCE_KEY).await.unwrap();
        assert_eq!(pref.as_deref(), Some("INR"));
    }

    #[tokio::test]
    async fn wrong_shape_is_an_error() {
        let store = MemoryCache::new();
        put_value(&store, EXCHANGE_RATE_KEY, "not a number", at(0)).await.unwrap();
        let res: anyhow::Result<Option<f64>> =
            get_fresh(&store, EXCHANGE_RATE_KEY, Duration::hours(24), at(1)).await;
        assert!(res.is_err());
    }
}
