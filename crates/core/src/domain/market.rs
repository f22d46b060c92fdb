use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    /// USD per troy ounce.
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Inr,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Inr => "INR",
        }
    }

    pub fn for_country_code(country_code: &str) -> Self {
        if country_code.trim().eq_ignore_ascii_case("IN") {
            Currency::Inr
        } else {
            Currency::Usd
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "INR" => Ok(Currency::Inr),
            other => anyhow::bail!("unsupported currency: {other:?} (expected USD or INR)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Wait,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Wait => "WAIT",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
    pub country_code: String,
    pub currency: Currency,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            city: String::new(),
            country: "Unknown".to_string(),
            country_code: "US".to_string(),
            currency: Currency::Usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_currency_case_insensitively() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!(" INR ".parse::<Currency>().unwrap(), Currency::Inr);
        assert!("EUR".parse::<Currency>().is_err());
    }

    #[test]
    fn currency_follows_country_code() {
        assert_eq!(Currency::for_country_code("IN"), Currency::Inr);
        assert_eq!(Currency::for_country_code("in"), Currency::Inr);
        assert_eq!(Currency::for_country_code("US"), Currency::Usd);
        assert_eq!(Currency::for_country_code(""), Currency::Usd);
    }

    #[test]
    fn serializes_uppercase_tags() {
        assert_eq!(serde_json::to_string(&Currency::Inr).unwrap(), "\"INR\"");
        assert_eq!(serde_json::to_string(&Signal::Buy).unwrap(), "\"BUY\"");
    }
}
