use crate::config::Settings;
use crate::ingest::http::{join_url, JsonHttpClient};
use crate::ingest::types::{GoldPriceResponse, MetalsApiResponse};
use anyhow::{Context, Result};
use serde_json::Value;

pub const GOLD_PRICE_DEFAULT_BASE_URL: &str = "https://data-asg.goldprice.org";
pub const METALS_API_DEFAULT_BASE_URL: &str = "https://metals-api.com/api";

/// Source of the current gold spot price in USD per troy ounce.
#[async_trait::async_trait]
pub trait SpotPriceProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_spot_usd_per_ounce(&self) -> Result<f64>;
}

#[derive(Debug, Clone)]
pub struct GoldPriceOrgProvider {
    client: JsonHttpClient,
    base_url: String,
}

impl GoldPriceOrgProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .gold_price_base_url
            .clone()
            .unwrap_or_else(|| GOLD_PRICE_DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client: JsonHttpClient::from_env("goldprice.org", "GOLD_PRICE")?,
            base_url,
        })
    }
}

#[async_trait::async_trait]
impl SpotPriceProvider for GoldPriceOrgProvider {
    fn provider_name(&self) -> &'static str {
        "goldprice.org"
    }

    async fn fetch_spot_usd_per_ounce(&self) -> Result<f64> {
        let url = join_url(&self.base_url, "dbXRates/USD");
        let raw = self.client.get_json(&url, &[]).await?;
        parse_gold_price(raw)
    }
}

#[derive(Debug, Clone)]
pub struct MetalsApiProvider {
    client: JsonHttpClient,
    base_url: String,
    api_key: String,
}

impl MetalsApiProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_metals_api_key()?.to_string();
        let base_url = settings
            .metals_api_base_url
            .clone()
            .unwrap_or_else(|| METALS_API_DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client: JsonHttpClient::from_env("metals-api", "METALS_API")?,
            base_url,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl SpotPriceProvider for MetalsApiProvider {
    fn provider_name(&self) -> &'static str {
        "metals-api"
    }

    async fn fetch_spot_usd_per_ounce(&self) -> Result<f64> {
        let url = join_url(&self.base_url, "latest");
        let raw = self
            .client
            .get_json(
                &url,
                &[
                    ("access_key", self.api_key.as_str()),
                    ("base", "USD"),
                    ("symbols", "XAU"),
                ],
            )
            .await?;
        parse_metals_api(raw)
    }
}

/// Providers in fallback order. metals-api is only included when a key is set.
pub fn spot_providers_from_settings(settings: &Settings) -> Result<Vec<Box<dyn SpotPriceProvider>>> {
    let mut providers: Vec<Box<dyn SpotPriceProvider>> =
        vec![Box::new(GoldPriceOrgProvider::from_settings(settings)?)];
    if settings.metals_api_key.is_some() {
        providers.push(Box::new(MetalsApiProvider::from_settings(settings)?));
    }
    Ok(providers)
}

pub fn parse_gold_price(raw: Value) -> Result<f64> {
    let parsed = serde_json::from_value::<GoldPriceResponse>(raw)
        .context("failed to parse goldprice.org response")?;
    let price = parsed
        .items
        .first()
        .and_then(|item| item.xau_price)
        .context("goldprice.org response has no items[0].xauPrice")?;
    validate_spot(price)
}

pub fn parse_metals_api(raw: Value) -> Result<f64> {
    let parsed = serde_json::from_value::<MetalsApiResponse>(raw)
        .context("failed to parse metals-api response")?;
    let ounces_per_usd = parsed
        .rates
        .get("XAU")
        .copied()
        .context("metals-api response has no rates.XAU")?;
    anyhow::ensure!(
        ounces_per_usd.is_finite() && ounces_per_usd > 0.0,
        "metals-api rates.XAU must be positive (got {ounces_per_usd})"
    );
    validate_spot(1.0 / ounces_per_usd)
}

fn validate_spot(price: f64) -> Result<f64> {
    anyhow::ensure!(
        price.is_finite() && price > 0.0,
        "spot price must be a positive number (got {price})"
    );
    Ok(price)
}
