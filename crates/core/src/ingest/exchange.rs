use crate::config::Settings;
use crate::ingest::http::{join_url, JsonHttpClient};
use crate::ingest::types::ExchangeRateResponse;
use anyhow::{Context, Result};
use serde_json::Value;

pub const EXCHANGE_RATE_DEFAULT_BASE_URL: &str = "https://v6.exchangerate-api.com/v6";

#[derive(Debug, Clone)]
pub struct ExchangeRateClient {
    client: JsonHttpClient,
    base_url: String,
    api_key: String,
}

impl ExchangeRateClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_exchange_rate_api_key()?.to_string();
        let base_url = settings
            .exchange_rate_base_url
            .clone()
            .unwrap_or_else(|| EXCHANGE_RATE_DEFAULT_BASE_URL.to_string());
        Ok(Self {
            client: JsonHttpClient::from_env("exchangerate-api", "EXCHANGE_RATE")?,
            base_url,
            api_key,
        })
    }

    /// INR per USD.
    pub async fn fetch_usd_inr(&self) -> Result<f64> {
        let url = join_url(&self.base_url, &format!("{}/latest/USD", self.api_key));
        let raw = self.client.get_json(&url, &[]).await?;
        parse_usd_inr(raw)
    }
}

pub fn parse_usd_inr(raw: Value) -> Result<f64> {
    let parsed = serde_json::from_value::<ExchangeRateResponse>(raw)
        .context("failed to parse exchange rate response")?;
    anyhow::ensure!(
        parsed.result == "success",
        "exchange rate service returned result={}",
        parsed.result
    );
    let rate = parsed
        .conversion_rates
        .get("INR")
        .copied()
        .context("exchange rate response has no conversion_rates.INR")?;
    anyhow::ensure!(
        rate.is_finite() && rate > 0.0,
        "INR rate must be positive (got {rate})"
    );
    Ok(rate)
}
