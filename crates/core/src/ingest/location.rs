use crate::config::Settings;
use crate::domain::market::{Currency, Location};
use crate::ingest::http::JsonHttpClient;
use crate::ingest::types::GeoLocationResponse;
use anyhow::{Context, Result};
use serde_json::Value;

pub const GEOLOCATION_DEFAULT_URL: &str = "https://ipapi.co/json/";

#[derive(Debug, Clone)]
pub struct GeoLocationClient {
    client: JsonHttpClient,
    url: String,
}

impl GeoLocationClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url = settings
            .geolocation_url
            .clone()
            .unwrap_or_else(|| GEOLOCATION_DEFAULT_URL.to_string());
        Ok(Self {
            client: JsonHttpClient::from_env("geolocation", "GEOLOCATION")?,
            url,
        })
    }

    pub async fn detect(&self) -> Result<Location> {
        let raw = self.client.get_json(&self.url, &[]).await?;
        parse_location(raw)
    }
}

/// Missing fields fall back to the `Location` defaults individually.
pub fn parse_location(raw: Value) -> Result<Location> {
    let parsed = serde_json::from_value::<GeoLocationResponse>(raw)
        .context("failed to parse geolocation response")?;
    let fallback = Location::default();

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let country_code = non_empty(parsed.country_code).unwrap_or(fallback.country_code);

    Ok(Location {
        city: non_empty(parsed.city).unwrap_or(fallback.city),
        country: non_empty(parsed.country_name).unwrap_or(fallback.country),
        currency: Currency::for_country_code(&country_code),
        country_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn indian_visitors_get_inr() {
        let v = json!({"city": "Mumbai", "country_name": "India", "country_code": "IN"});
        let loc = parse_location(v).unwrap();
        assert_eq!(loc.city, "Mumbai");
        assert_eq!(loc.country, "India");
        assert_eq!(loc.currency, Currency::Inr);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let loc = parse_location(json!({"error": true, "reason": "RateLimited"})).unwrap();
        assert_eq!(loc, Location::default());
        assert_eq!(loc.currency, Currency::Usd);
    }
}
