//! Technical indicators over a daily price history.
//!
//! Inputs are slices ordered oldest to newest. Normalized outputs use fixed
//! min-max ranges and saturate at 0/1 instead of adapting to the data.

use crate::analysis::error::AnalysisError;
use crate::domain::evaluation::{FeatureVector, RawFeatures};
use statrs::statistics::Statistics;

/// 14 for the longest moving average plus one for a daily change.
pub const MIN_FEATURE_POINTS: usize = 15;

const MOMENTUM_PERIOD: usize = 7;
const RECENT_TREND_DAYS: usize = 3;

const MOMENTUM_RANGE: (f64, f64) = (-5.0, 5.0);
const VOLATILITY_RANGE: (f64, f64) = (0.0, 5.0);
const PRICE_TO_MA_RANGE: (f64, f64) = (-10.0, 10.0);
const RECENT_TREND_RANGE: (f64, f64) = (-2.0, 2.0);

pub fn extract_features(prices: &[f64]) -> anyhow::Result<FeatureVector> {
    if prices.len() < MIN_FEATURE_POINTS {
        return Err(
            AnalysisError::insufficient_data("features", MIN_FEATURE_POINTS, prices.len()).into(),
        );
    }

    let changes = daily_percent_changes(prices);
    let ma7 = moving_average(prices, 7);
    let ma14 = moving_average(prices, 14);

    let current = prices[prices.len() - 1];
    // Both windows are full at the last index once the length check passed.
    let last_ma7 = ma7.last().copied().flatten().unwrap_or(current);
    let last_ma14 = ma14.last().copied().flatten().unwrap_or(current);

    let raw = RawFeatures {
        momentum: linear_slope(&prices[prices.len() - MOMENTUM_PERIOD..]),
        volatility: population_std_dev(&changes),
        price_to_ma7: percent_deviation(current, last_ma7),
        price_to_ma14: percent_deviation(current, last_ma14),
        recent_trend: recent_trend(&changes),
    };

    Ok(FeatureVector {
        momentum: normalize(raw.momentum, MOMENTUM_RANGE),
        volatility: normalize(raw.volatility, VOLATILITY_RANGE),
        price_to_ma7: normalize(raw.price_to_ma7, PRICE_TO_MA_RANGE),
        price_to_ma14: normalize(raw.price_to_ma14, PRICE_TO_MA_RANGE),
        recent_trend: normalize(raw.recent_trend, RECENT_TREND_RANGE),
        raw,
        ma7_series: ma7,
        ma14_series: ma14,
    })
}

/// `(p[i] - p[i-1]) / p[i-1] * 100` for every consecutive pair.
pub fn daily_percent_changes(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect()
}

/// Trailing simple moving average aligned to `prices`; `None` until the window fills.
pub fn moving_average(prices: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; prices.len()];
    }

    (0..prices.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                Some(prices[i + 1 - window..=i].iter().mean())
            }
        })
        .collect()
}

/// Ordinary least-squares slope of `values` against their index.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }

    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x)
}

/// 0 for empty input.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().population_std_dev()
}

pub fn normalize(value: f64, (min, max): (f64, f64)) -> f64 {
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

fn percent_deviation(value: f64, reference: f64) -> f64 {
    (value - reference) / reference * 100.0
}

fn recent_trend(changes: &[f64]) -> f64 {
    let start = changes.len().saturating_sub(RECENT_TREND_DAYS);
    // Divides by the full window even when fewer changes exist; unreachable
    // while extract_features requires MIN_FEATURE_POINTS.
    changes[start..].iter().sum::<f64>() / RECENT_TREND_DAYS as f64
}
