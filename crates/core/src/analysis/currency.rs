use crate::domain::evaluation::{PriceQuote, QuotedPrice};
use crate::domain::market::Currency;

pub const TROY_OUNCE_GRAMS: f64 = 31.1035;
/// Making charges and GST applied on top of spot for INR prices.
pub const RETAIL_MARKUP: f64 = 1.086;
/// INR per USD when no rate service answers.
pub const DEFAULT_EXCHANGE_RATE: f64 = 89.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purity {
    K24,
    K22,
}

impl Purity {
    pub fn multiplier(self) -> f64 {
        match self {
            Purity::K24 => 1.0,
            Purity::K22 => 0.9167,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitWeight {
    Gram,
    TenGrams,
}

impl UnitWeight {
    pub fn grams(self) -> f64 {
        match self {
            UnitWeight::Gram => 1.0,
            UnitWeight::TenGrams => 10.0,
        }
    }
}

/// USD per troy ounce -> display currency per `unit` of 24K gold.
///
/// Non-finite or non-positive inputs convert to 0. A non-positive exchange
/// rate falls back to [`DEFAULT_EXCHANGE_RATE`].
pub fn convert_price(usd_per_ounce: f64, currency: Currency, exchange_rate: f64, unit: UnitWeight) -> f64 {
    if !usd_per_ounce.is_finite() || usd_per_ounce <= 0.0 {
        return 0.0;
    }

    let usd_per_unit = usd_per_ounce / TROY_OUNCE_GRAMS * unit.grams();
    match currency {
        Currency::Usd => usd_per_unit,
        Currency::Inr => usd_per_unit * effective_rate(exchange_rate) * RETAIL_MARKUP,
    }
}

/// Inverse of [`convert_price`].
pub fn to_usd_per_ounce(amount: f64, currency: Currency, exchange_rate: f64, unit: UnitWeight) -> f64 {
    let usd_per_unit = match currency {
        Currency::Usd => amount,
        Currency::Inr => amount / RETAIL_MARKUP / effective_rate(exchange_rate),
    };
    usd_per_unit / unit.grams() * TROY_OUNCE_GRAMS
}

pub fn effective_rate(exchange_rate: f64) -> f64 {
    if exchange_rate.is_finite() && exchange_rate > 0.0 {
        exchange_rate
    } else {
        DEFAULT_EXCHANGE_RATE
    }
}

/// `$1234.56` for USD, `₹1,23,457` (rounded, Indian grouping) for INR.
pub fn format_price(amount: f64, currency: Currency) -> String {
    let amount = if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    };

    match currency {
        Currency::Usd => format!("${amount:.2}"),
        Currency::Inr => format!("₹{}", group_indian(amount.round() as u64)),
    }
}

pub fn quote(usd_per_ounce: f64, currency: Currency, exchange_rate: f64) -> PriceQuote {
    let quoted = |purity: Purity, unit: UnitWeight| {
        let amount = convert_price(usd_per_ounce, currency, exchange_rate, unit) * purity.multiplier();
        QuotedPrice {
            amount,
            display: format_price(amount, currency),
        }
    };

    PriceQuote {
        currency,
        k24_per_10g: quoted(Purity::K24, UnitWeight::TenGrams),
        k22_per_10g: quoted(Purity::K22, UnitWeight::TenGrams),
        k24_per_gram: quoted(Purity::K24, UnitWeight::Gram),
        k22_per_gram: quoted(Purity::K22, UnitWeight::Gram),
    }
}

// Last three digits, then groups of two: 12,34,567.
fn group_indian(n: u64) -> String {
    let digits = n.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}
