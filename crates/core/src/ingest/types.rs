use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// goldprice.org `dbXRates/USD`.
#[derive(Debug, Clone, Deserialize)]
pub struct GoldPriceResponse {
    #[serde(default)]
    pub items: Vec<GoldPriceItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoldPriceItem {
    #[serde(rename = "xauPrice", default, deserialize_with = "number_or_numeric_string")]
    pub xau_price: Option<f64>,
}

/// Accepts `2345.6` and `"2345.6"`; a string that is not a number reads as absent.
fn number_or_numeric_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(d)? {
        Some(Raw::Number(v)) => Some(v),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    })
}

/// metals-api `latest?base=USD&symbols=XAU`; `rates.XAU` is ounces per USD.
#[derive(Debug, Clone, Deserialize)]
pub struct MetalsApiResponse {
    #[serde(default)]
    pub rates: HashMap<String, f64>,
}

/// exchangerate-api `latest/USD`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRateResponse {
    pub result: String,
    #[serde(default)]
    pub conversion_rates: HashMap<String, f64>,
}

/// ipapi-style geolocation; every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoLocationResponse {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}
