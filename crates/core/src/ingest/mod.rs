pub mod exchange;
pub mod history;
pub mod http;
pub mod location;
pub mod provider;
pub mod types;

use crate::analysis::currency::DEFAULT_EXCHANGE_RATE;
use crate::config::{PipelineOptions, Settings};
use crate::domain::contract::PriceSeries;
use crate::domain::market::{Currency, Location};
use crate::ingest::exchange::ExchangeRateClient;
use crate::ingest::location::GeoLocationClient;
use crate::ingest::provider::SpotPriceProvider;
use crate::storage::cache::{
    self, CacheStore, CURRENCY_PREFERENCE_KEY, EXCHANGE_RATE_KEY, LOCATION_KEY, PRICE_DATA_KEY,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Where the price series of an evaluation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Cache,
    Provider,
    Mock,
}

/// Fetches market inputs with cache-first reads and fallbacks.
///
/// Nothing here fails because a remote service is down: spot prices fall back
/// to mock history, the exchange rate to [`DEFAULT_EXCHANGE_RATE`], and the
/// location to `Location::default()`.
pub struct MarketDataSource {
    cache: Arc<dyn CacheStore>,
    spot_providers: Vec<Box<dyn SpotPriceProvider>>,
    exchange: Option<ExchangeRateClient>,
    geolocation: Option<GeoLocationClient>,
    cache_ttl: Duration,
    history_days: usize,
}

impl MarketDataSource {
    pub fn from_settings(
        settings: &Settings,
        cache: Arc<dyn CacheStore>,
        options: &PipelineOptions,
    ) -> anyhow::Result<Self> {
        let exchange = match ExchangeRateClient::from_settings(settings) {
            Ok(c) => Some(c),
            Err(err) => {
                tracing::warn!(error = %err, "exchange rate client disabled; using fallback rate");
                None
            }
        };

        Ok(Self {
            cache,
            spot_providers: provider::spot_providers_from_settings(settings)?,
            exchange,
            geolocation: Some(GeoLocationClient::from_settings(settings)?),
            cache_ttl: options.cache_ttl(),
            history_days: options.history_days,
        })
    }

    /// No network access: cached values, else mock history and defaults.
    pub fn offline(cache: Arc<dyn CacheStore>, options: &PipelineOptions) -> Self {
        Self {
            cache,
            spot_providers: Vec::new(),
            exchange: None,
            geolocation: None,
            cache_ttl: options.cache_ttl(),
            history_days: options.history_days,
        }
    }

    pub fn with_spot_providers(mut self, providers: Vec<Box<dyn SpotPriceProvider>>) -> Self {
        self.spot_providers = providers;
        self
    }

    pub fn cache_backend(&self) -> &'static str {
        self.cache.backend_name()
    }

    pub async fn price_series<R: Rng + Send + ?Sized>(
        &self,
        end_date: NaiveDate,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> anyhow::Result<(PriceSeries, PriceSource)> {
        if let Some(series) = self.cached::<PriceSeries>(PRICE_DATA_KEY, now).await {
            // A cached history only serves the day it ends on.
            if series.latest().date == end_date {
                tracing::debug!(points = series.len(), "price series served from cache");
                return Ok((series, PriceSource::Cache));
            }
            tracing::debug!(
                cached_end = %series.latest().date,
                %end_date,
                "cached price series ends on another day; refetching"
            );
        }

        for provider in &self.spot_providers {
            match provider.fetch_spot_usd_per_ounce().await {
                Ok(spot) => {
                    tracing::info!(provider = provider.provider_name(), spot, "spot price fetched");
                    let series = history::realistic_history(spot, self.history_days, end_date, rng)?;
                    self.store(PRICE_DATA_KEY, &series, now).await;
                    return Ok((series, PriceSource::Provider));
                }
                Err(err) => {
                    tracing::warn!(provider = provider.provider_name(), error = %err, "spot price fetch failed");
                }
            }
        }

        tracing::warn!("all spot price sources failed; using mock history");
        let series = history::mock_history(self.history_days, end_date, rng)?;
        Ok((series, PriceSource::Mock))
    }

    /// INR per USD.
    pub async fn exchange_rate(&self, now: DateTime<Utc>) -> f64 {
        if let Some(rate) = self.cached::<f64>(EXCHANGE_RATE_KEY, now).await {
            if rate.is_finite() && rate > 0.0 {
                return rate;
            }
        }

        let Some(client) = &self.exchange else {
            return DEFAULT_EXCHANGE_RATE;
        };

        match client.fetch_usd_inr().await {
            Ok(rate) => {
                tracing::info!(rate, "exchange rate fetched");
                self.store(EXCHANGE_RATE_KEY, &rate, now).await;
                rate
            }
            Err(err) => {
                tracing::warn!(error = %err, fallback = DEFAULT_EXCHANGE_RATE, "exchange rate fetch failed");
                DEFAULT_EXCHANGE_RATE
            }
        }
    }

    pub async fn location(&self, now: DateTime<Utc>) -> Location {
        if let Some(location) = self.cached::<Location>(LOCATION_KEY, now).await {
            return location;
        }

        let Some(client) = &self.geolocation else {
            return Location::default();
        };

        match client.detect().await {
            Ok(location) => {
                tracing::info!(country = %location.country, currency = %location.currency, "location detected");
                self.store(LOCATION_KEY, &location, now).await;
                location
            }
            Err(err) => {
                tracing::warn!(error = %err, "location detection failed; using default");
                Location::default()
            }
        }
    }

    pub async fn currency_preference(&self) -> Option<Currency> {
        match cache::get_value::<Currency>(self.cache.as_ref(), CURRENCY_PREFERENCE_KEY).await {
            Ok(pref) => pref,
            Err(err) => {
                tracing::warn!(error = %err, "currency preference read failed");
                None
            }
        }
    }

    pub async fn set_currency_preference(
        &self,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        cache::put_value(self.cache.as_ref(), CURRENCY_PREFERENCE_KEY, &currency, now).await?;
        tracing::info!(%currency, "currency preference saved");
        Ok(())
    }

    /// Saved preference first; otherwise the currency of the detected location,
    /// which is returned alongside.
    pub async fn resolve_currency(&self, now: DateTime<Utc>) -> (Currency, Option<Location>) {
        if let Some(currency) = self.currency_preference().await {
            return (currency, None);
        }
        let location = self.location(now).await;
        (location.currency, Some(location))
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        match cache::get_fresh::<T>(self.cache.as_ref(), key, self.cache_ttl, now).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed; treating as miss");
                None
            }
        }
    }

    async fn store<T: Serialize + Sync + ?Sized>(&self, key: &str, value: &T, now: DateTime<Utc>) {
        if let Err(err) = cache::put_value(self.cache.as_ref(), key, value, now).await {
            tracing::warn!(key, error = %err, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::cache::MemoryCache;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct FixedSpot(anyhow::Result<f64>);

    #[async_trait::async_trait]
    impl SpotPriceProvider for FixedSpot {
        fn provider_name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_spot_usd_per_ounce(&self) -> anyhow::Result<f64> {
            match &self.0 {
                Ok(v) => Ok(*v),
                Err(err) => Err(anyhow::anyhow!("{err}")),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        now().date_naive()
    }

    fn source(cache: Arc<dyn CacheStore>) -> MarketDataSource {
        MarketDataSource::offline(cache, &PipelineOptions::default())
    }

    #[tokio::test]
    async fn falls_through_failed_providers_and_caches_result() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let src = source(cache.clone()).with_spot_providers(vec![
            Box::new(FixedSpot(Err(anyhow::anyhow!("down")))),
            Box::new(FixedSpot(Ok(2400.0))),
        ]);
        let mut rng = StdRng::seed_from_u64(1);

        let (series, from) = src.price_series(today(), now(), &mut rng).await.unwrap();
        assert_eq!(from, PriceSource::Provider);
        assert_eq!(series.latest().price, 2400.0);
        assert_eq!(series.len(), 30);

        let (again, from) = src
            .price_series(today(), now() + Duration::hours(1), &mut rng)
            .await
            .unwrap();
        assert_eq!(from, PriceSource::Cache);
        assert_eq!(again, series);
    }

    #[tokio::test]
    async fn mock_history_is_not_cached() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let src = source(cache.clone());
        let mut rng = StdRng::seed_from_u64(2);

        let (_, from) = src.price_series(today(), now(), &mut rng).await.unwrap();
        assert_eq!(from, PriceSource::Mock);
        assert!(cache.get(PRICE_DATA_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_price_cache_is_refetched() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let src = source(cache.clone()).with_spot_providers(vec![Box::new(FixedSpot(Ok(2000.0)))]);
        let mut rng = StdRng::seed_from_u64(3);
        src.price_series(today(), now(), &mut rng).await.unwrap();

        let later = now() + Duration::hours(25);
        let (_, from) = src.price_series(today(), later, &mut rng).await.unwrap();
        assert_eq!(from, PriceSource::Provider);
    }

    #[tokio::test]
    async fn cached_series_for_another_day_is_not_reused() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let src = source(cache.clone()).with_spot_providers(vec![Box::new(FixedSpot(Ok(2100.0)))]);
        let mut rng = StdRng::seed_from_u64(4);
        src.price_series(today(), now(), &mut rng).await.unwrap();

        let earlier = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let (series, from) = src.price_series(earlier, now(), &mut rng).await.unwrap();
        assert_eq!(from, PriceSource::Provider);
        assert_eq!(series.latest().date, earlier);

        // The refetched history replaced the entry and now serves that day.
        let (again, from) = src.price_series(earlier, now(), &mut rng).await.unwrap();
        assert_eq!(from, PriceSource::Cache);
        assert_eq!(again, series);
    }

    #[tokio::test]
    async fn offline_fallbacks() {
        let src = source(Arc::new(MemoryCache::new()));
        assert_eq!(src.exchange_rate(now()).await, DEFAULT_EXCHANGE_RATE);
        assert_eq!(src.location(now()).await, Location::default());
        assert_eq!(src.resolve_currency(now()).await.0, Currency::Usd);
    }

    #[tokio::test]
    async fn cached_exchange_rate_and_location_are_used() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        cache::put_value(store.as_ref(), EXCHANGE_RATE_KEY, &84.5f64, now()).await.unwrap();
        let india = Location {
            city: "Pune".to_string(),
            country: "India".to_string(),
            country_code: "IN".to_string(),
            currency: Currency::Inr,
        };
        cache::put_value(store.as_ref(), LOCATION_KEY, &india, now()).await.unwrap();

        let src = source(store);
        assert_eq!(src.exchange_rate(now()).await, 84.5);
        let (currency, location) = src.resolve_currency(now()).await;
        assert_eq!(currency, Currency::Inr);
        assert_eq!(location, Some(india));
    }

    #[tokio::test]
    async fn saved_preference_wins_over_location() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let src = source(cache);
        src.set_currency_preference(Currency::Inr, now()).await.unwrap();
        // Preferences never expire.
        let (currency, location) = src.resolve_currency(now() + Duration::days(400)).await;
        assert_eq!(currency, Currency::Inr);
        assert_eq!(location, None);
    }
}
