use crate::analysis::error::AnalysisError;
use crate::analysis::features::moving_average;
use crate::domain::evaluation::{OpportunityAnalysis, OpportunityTier, TrendDirection};
use crate::domain::market::PricePoint;
use chrono::NaiveDate;
use statrs::statistics::Statistics;

pub const DEFAULT_WINDOW_DAYS: usize = 30;
pub const MIN_OPPORTUNITY_POINTS: usize = 2;

const WEEK_DAYS: usize = 7;
const DIP_MA_WINDOW: usize = 14;

/// Scores how favorable the latest price is for entry within `window` (0-100).
///
/// Five factors, capped at 100 points in total:
/// position in the window range (30), distance from the 7-day low (25),
/// price vs. the 7-day average (20), RMS volatility of simple returns (15),
/// and a bonus when more than 30% of the window dipped below its MA14 (10).
pub fn analyze_opportunity(
    window: &[PricePoint],
    today: NaiveDate,
) -> anyhow::Result<OpportunityAnalysis> {
    if window.len() < MIN_OPPORTUNITY_POINTS {
        return Err(AnalysisError::insufficient_data(
            "opportunity",
            MIN_OPPORTUNITY_POINTS,
            window.len(),
        )
        .into());
    }

    let prices: Vec<f64> = window.iter().map(|p| p.price).collect();
    let current = prices[prices.len() - 1];

    // First occurrence wins on ties.
    let (lowest_idx, min_price) = prices
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::INFINITY), |acc, (idx, p)| if p < acc.1 { (idx, p) } else { acc });
    let max_price = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let price_range = max_price - min_price;

    // A flat window has no range to be positioned in; the factor then scores 0.
    let position_ratio = if price_range > 0.0 {
        Some((current - min_price) / price_range)
    } else {
        None
    };

    let week = &prices[prices.len().saturating_sub(WEEK_DAYS)..];
    let week_avg = week.iter().mean();
    let week_low = week.iter().copied().fold(f64::INFINITY, f64::min);
    let week_high = week.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let distance_from_week_low = (current - week_low) / week_low * 100.0;
    let recent_momentum = (current - week_avg) / week_avg * 100.0;

    let volatility = rms_return_percent(&prices);
    let dip_count = count_dips(&prices);
    let dip_percent = dip_count as f64 / prices.len() as f64 * 100.0;

    let mut score = 0.0;
    if let Some(ratio) = position_ratio {
        score += (1.0 - ratio) * 30.0;
    }

    score += if distance_from_week_low <= 2.0 {
        25.0
    } else if distance_from_week_low <= 5.0 {
        15.0
    } else {
        5.0
    };

    score += if recent_momentum < 0.0 {
        20.0
    } else if recent_momentum < 2.0 {
        10.0
    } else {
        0.0
    };

    score += if volatility < 1.0 {
        15.0
    } else if volatility < 2.0 {
        10.0
    } else {
        5.0
    };

    if dip_percent > 30.0 {
        score += 10.0;
    }

    let score = score.round().clamp(0.0, 100.0) as u8;
    let lowest_price_date = window[lowest_idx].date;

    Ok(OpportunityAnalysis {
        score,
        window_days: window.len(),
        recommendation_tier: OpportunityTier::from_score(score),
        lowest_price_in_window: min_price,
        lowest_price_date,
        days_since_lowest: (today - lowest_price_date).num_days(),
        current_vs_lowest_percent: (current - min_price) / min_price * 100.0,
        price_position_percent: position_ratio
            .map(|r| (r * 100.0).round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0),
        week_low,
        week_high,
        distance_from_week_low_percent: distance_from_week_low,
        volatility_percent: volatility,
        dip_count,
        trend_direction: if recent_momentum > 0.0 {
            TrendDirection::Rising
        } else {
            TrendDirection::Falling
        },
    })
}

/// Root-mean-square of simple daily returns, in percent.
fn rms_return_percent(prices: &[f64]) -> f64 {
    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().quadratic_mean() * 100.0
}

/// Prices strictly below their trailing MA14, counted from index 14 onwards.
fn count_dips(prices: &[f64]) -> usize {
    let ma14 = moving_average(prices, DIP_MA_WINDOW);
    prices
        .iter()
        .zip(&ma14)
        .enumerate()
        .filter(|(idx, (price, ma))| {
            *idx >= DIP_MA_WINDOW && ma.map(|m| **price < m).unwrap_or(false)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn series(prices: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                date: start + Duration::days(i as i64),
                price,
            })
            .collect()
    }

    fn today_after(points: &[PricePoint]) -> NaiveDate {
        points[points.len() - 1].date
    }

    #[test]
    fn flat_window_degrades_gracefully() {
        let points = series(&[100.0; 30]);
        let a = analyze_opportunity(&points, today_after(&points)).unwrap();
        // 0 position + 25 near week low + 10 flat vs. average + 15 calm + 0 dips.
        assert_eq!(a.score, 50);
        assert_eq!(a.recommendation_tier, OpportunityTier::Moderate);
        assert_eq!(a.price_position_percent, 0);
        assert_eq!(a.dip_count, 0);
        assert_eq!(a.trend_direction, TrendDirection::Falling);
        assert_eq!(a.lowest_price_date, points[0].date);
        assert_eq!(a.days_since_lowest, 29);
    }

    #[test]
    fn steady_decline_scores_excellent() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 * 0.995f64.powi(i)).collect();
        let points = series(&prices);
        let a = analyze_opportunity(&points, today_after(&points)).unwrap();
        assert_eq!(a.score, 100);
        assert_eq!(a.recommendation_tier, OpportunityTier::Excellent);
        assert_eq!(a.price_position_percent, 0);
        assert_eq!(a.days_since_lowest, 0);
        assert_eq!(a.dip_count, 16);
        assert_eq!(a.trend_direction, TrendDirection::Falling);
    }

    #[test]
    fn steady_rise_scores_wait() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 * 1.005f64.powi(i)).collect();
        let points = series(&prices);
        let a = analyze_opportunity(&points, today_after(&points)).unwrap();
        // 0 position + 15 within 5% of week low + 10 under 2% above average + 15 calm.
        assert_eq!(a.score, 40);
        assert_eq!(a.recommendation_tier, OpportunityTier::Wait);
        assert_eq!(a.price_position_percent, 100);
        assert_eq!(a.trend_direction, TrendDirection::Rising);
        assert!((a.volatility_percent - 0.5).abs() < 1e-9);
    }

    #[test]
    fn lowest_price_ties_keep_first_occurrence() {
        let points = series(&[105.0, 100.0, 103.0, 100.0, 104.0]);
        let a = analyze_opportunity(&points, today_after(&points)).unwrap();
        assert_eq!(a.lowest_price_in_window, 100.0);
        assert_eq!(a.lowest_price_date, points[1].date);
        assert_eq!(a.week_low, 100.0);
        assert_eq!(a.week_high, 105.0);
    }

    #[test]
    fn score_is_bounded_for_random_walks() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let mut price = 2000.0;
            let prices: Vec<f64> = (0..30)
                .map(|_| {
                    price *= 1.0 + rng.gen_range(-0.04..0.04);
                    price
                })
                .collect();
            let points = series(&prices);
            let a = analyze_opportunity(&points, today_after(&points)).unwrap();
            assert!(a.score <= 100);
            assert_eq!(a.recommendation_tier, OpportunityTier::from_score(a.score));
            assert!(a.price_position_percent <= 100);
        }
    }

    #[test]
    fn volatility_is_rms_of_simple_returns() {
        // +10% then -10%.
        let points = series(&[100.0, 110.0, 99.0]);
        let a = analyze_opportunity(&points, today_after(&points)).unwrap();
        assert!((a.volatility_percent - 10.0).abs() < 1e-9);
        assert!((a.week_high - 110.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_single_point() {
        let points = series(&[100.0]);
        let err = analyze_opportunity(&points, today_after(&points)).unwrap_err();
        assert!(err.downcast_ref::<AnalysisError>().is_some());
    }
}
