//! Daily price histories synthesized when no historical endpoint is available.

use crate::domain::contract::PriceSeries;
use crate::domain::market::PricePoint;
use chrono::{Duration, NaiveDate};
use rand::Rng;

pub const MOCK_BASE_PRICE: f64 = 2034.50;
const MOCK_MIN_PRICE: f64 = 1800.0;
const MOCK_MAX_PRICE: f64 = 2200.0;
const MOCK_STEP: f64 = 30.0;
// Slight upward drift: u - 0.48 is positive 52% of the time.
const MOCK_BIAS: f64 = 0.48;

const DAILY_SWING: f64 = 0.03;
const MEAN_REVERSION: f64 = 0.1;
const BAND_LOW: f64 = 0.92;
const BAND_HIGH: f64 = 1.08;

/// `days` points ending at `end_date` whose last price is `spot`.
///
/// Walks backwards from the spot price with a uniform ±1.5% daily change
/// plus 10% mean reversion, kept within [0.92, 1.08] x spot.
pub fn realistic_history<R: Rng + ?Sized>(
    spot: f64,
    days: usize,
    end_date: NaiveDate,
    rng: &mut R,
) -> anyhow::Result<PriceSeries> {
    anyhow::ensure!(
        spot.is_finite() && spot > 0.0,
        "spot price must be positive (got {spot})"
    );
    anyhow::ensure!(days >= 1, "history days must be >= 1");

    let mut prices = Vec::with_capacity(days);
    prices.push(spot);
    for i in 1..days {
        let prev = prices[i - 1];
        let random_change = (rng.gen::<f64>() - 0.5) * DAILY_SWING;
        let reversion = (spot - prev) / spot * MEAN_REVERSION;
        let next = prev * (1.0 + random_change + reversion);
        prices.push(next.clamp(spot * BAND_LOW, spot * BAND_HIGH));
    }
    prices.reverse();

    PriceSeries::try_new(dated(&prices, end_date))
}

/// Random walk from [`MOCK_BASE_PRICE`] used when every spot provider fails.
pub fn mock_history<R: Rng + ?Sized>(
    days: usize,
    end_date: NaiveDate,
    rng: &mut R,
) -> anyhow::Result<PriceSeries> {
    anyhow::ensure!(days >= 1, "history days must be >= 1");

    let mut price = MOCK_BASE_PRICE;
    let prices: Vec<f64> = (0..days)
        .map(|_| {
            price += (rng.gen::<f64>() - MOCK_BIAS) * MOCK_STEP;
            price = price.clamp(MOCK_MIN_PRICE, MOCK_MAX_PRICE);
            price
        })
        .collect();

    PriceSeries::try_new(dated(&prices, end_date))
}

fn dated(prices: &[f64], end_date: NaiveDate) -> Vec<PricePoint> {
    let last = prices.len() as i64 - 1;
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| PricePoint {
            date: end_date - Duration::days(last - i as i64),
            price: round_cents(p),
        })
        .collect()
}

fn round_cents(price: f64) -> f64 {
    ((price * 100.0).round() / 100.0).max(0.01)
}
