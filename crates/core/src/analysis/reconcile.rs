//! Merges the classifier signal with the opportunity score into the
//! user-facing recommendation, and derives the narrative around it.

use crate::analysis::currency::{convert_price, format_price, Purity, UnitWeight};
use crate::domain::evaluation::{
    ClassifierOutput, FeatureVector, FinalRecommendation, Insight, MarketMetrics,
    MomentumDirection, OpportunityAnalysis, PricePattern, Sentiment, TrendDirection,
    VolatilityLevel,
};
use crate::domain::market::{Currency, PricePoint, Signal};

pub const BADGE_DEFAULT: &str = "Today's AI Recommendation";
pub const BADGE_PRICE_TOO_HIGH: &str = "Price Too High - Wait";
pub const BADGE_GOOD_TIME: &str = "Good Time to Buy";

/// BUY signals below this opportunity score are downgraded to WAIT.
pub const DOWNGRADE_BELOW_SCORE: u8 = 45;
/// BUY signals at or above this score get the "good time" badge.
pub const ENDORSE_FROM_SCORE: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayContext {
    pub currency: Currency,
    pub exchange_rate: f64,
}

/// Final signal and badge. Only BUY is ever overridden; WAIT passes through
/// regardless of the opportunity score.
pub fn final_signal(classifier: &ClassifierOutput, opportunity_score: u8) -> (Signal, &'static str) {
    match classifier.signal {
        Signal::Buy if opportunity_score < DOWNGRADE_BELOW_SCORE => (Signal::Wait, BADGE_PRICE_TOO_HIGH),
        Signal::Buy if opportunity_score >= ENDORSE_FROM_SCORE => (Signal::Buy, BADGE_GOOD_TIME),
        signal => (signal, BADGE_DEFAULT),
    }
}

pub fn reconcile(
    classifier: &ClassifierOutput,
    opportunity: &OpportunityAnalysis,
    features: &FeatureVector,
    recent: &[PricePoint],
    display: &DisplayContext,
) -> FinalRecommendation {
    let (final_signal, badge) = final_signal(classifier, opportunity.score);

    let mut insights = opportunity_insights(opportunity, display);
    insights.extend(signal_insights(features, classifier, opportunity));

    FinalRecommendation {
        final_signal,
        badge_text: badge.to_string(),
        price_change_percent: price_change_percent(recent),
        insights,
    }
}

/// Percent change between the last two points of `recent`.
pub fn price_change_percent(recent: &[PricePoint]) -> Option<f64> {
    match recent {
        [.., previous, latest] => Some((latest.price - previous.price) / previous.price * 100.0),
        _ => None,
    }
}

pub fn market_metrics(features: &FeatureVector, classifier: &ClassifierOutput) -> MarketMetrics {
    let raw = &features.raw;

    let sentiment = if classifier.signal == Signal::Buy {
        Sentiment::Positive
    } else if classifier.confidence_percent < 40 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    let volatility_level = if raw.volatility < 1.0 {
        VolatilityLevel::Low
    } else if raw.volatility < 2.0 {
        VolatilityLevel::Medium
    } else {
        VolatilityLevel::High
    };

    let momentum_direction = if raw.momentum > 0.0 {
        MomentumDirection::Upward
    } else {
        MomentumDirection::Downward
    };

    let pattern = if raw.price_to_ma7.abs() < 1.0 {
        PricePattern::Consolidating
    } else if raw.price_to_ma7 > 1.0 {
        PricePattern::Breakout
    } else {
        PricePattern::Pullback
    };

    MarketMetrics {
        sentiment,
        volatility_level,
        momentum_direction,
        pattern,
    }
}

fn opportunity_insights(a: &OpportunityAnalysis, display: &DisplayContext) -> Vec<Insight> {
    let tier = a.recommendation_tier;
    let lowest = |purity: Purity| {
        let amount = convert_price(
            a.lowest_price_in_window,
            display.currency,
            display.exchange_rate,
            UnitWeight::TenGrams,
        ) * purity.multiplier();
        format_price(amount, display.currency)
    };

    let trend_icon = match a.trend_direction {
        TrendDirection::Rising => "arrow-trend-up",
        TrendDirection::Falling => "arrow-trend-down",
    };

    vec![
        Insight::new(
            tier.icon(),
            tier.headline(),
            format!("Opportunity Score: {}/100. {}", a.score, tier.reasoning()),
        ),
        Insight::new(
            "chart-bar",
            "Historical Context",
            format!(
                "Lowest price in last {} days ({}, {} days ago): 24K {}, 22K {}. Current price is {:.1}% above lowest.",
                a.window_days,
                a.lowest_price_date.format("%b %-d"),
                a.days_since_lowest,
                lowest(Purity::K24),
                lowest(Purity::K22),
                a.current_vs_lowest_percent
            ),
        ),
        Insight::new(
            "chart-line",
            "Recent Price Position",
            format!(
                "Current price is {:.1}% above the 7-day low. Price position in {}-day range: {}% (0% = lowest, 100% = highest).",
                a.distance_from_week_low_percent, a.window_days, a.price_position_percent
            ),
        ),
        Insight::new(
            trend_icon,
            format!("Recent Trend: {}", a.trend_direction.label()),
            format!(
                "Market volatility: {:.2}%. Found {} dip opportunities in the last {} days.",
                a.volatility_percent, a.dip_count, a.window_days
            ),
        ),
    ]
}

fn signal_insights(
    features: &FeatureVector,
    classifier: &ClassifierOutput,
    opportunity: &OpportunityAnalysis,
) -> Vec<Insight> {
    let raw = &features.raw;
    let mut out = Vec::new();

    // Momentum always leads.
    out.push(if raw.momentum > 1.0 {
        Insight::new(
            "arrow-up",
            "Strong Upward Momentum",
            "Price is currently trending above the 14-day moving average, indicating strong upward momentum.",
        )
    } else if raw.momentum < -1.0 {
        Insight::new(
            "arrow-down",
            "Downward Pressure",
            "Recent price action shows downward momentum. Consider waiting for trend reversal.",
        )
    } else {
        Insight::new(
            "grip-lines",
            "Sideways Movement",
            "Gold is trading in a narrow range with no clear directional bias.",
        )
    });

    if raw.volatility < 1.0 {
        out.push(Insight::new(
            "bullseye",
            "Low Volatility Environment",
            "Market volatility is currently low, suggesting stable conditions favorable for entry.",
        ));
    } else if raw.volatility > 2.0 {
        out.push(Insight::new(
            "bolt",
            "High Volatility Detected",
            "Significant price swings detected. Higher risk, but potential for larger moves.",
        ));
    }

    if raw.price_to_ma7 > 2.0 {
        out.push(Insight::new(
            "rocket",
            "Price Above Moving Averages",
            "Gold is trading well above both 7-day and 14-day moving averages, showing bullish strength.",
        ));
    } else if raw.price_to_ma7 < -2.0 {
        out.push(Insight::new(
            "triangle-exclamation",
            "Below Key Support Levels",
            "Price has fallen below important moving average support, indicating weakness.",
        ));
    }

    if raw.recent_trend > 0.5 {
        out.push(Insight::new(
            "circle-check",
            "Positive Recent Trend",
            "The last 3 days show consistent positive price action, suggesting building momentum.",
        ));
    } else if raw.recent_trend < -0.5 {
        out.push(Insight::new(
            "circle-xmark",
            "Recent Weakness",
            "Prices have declined over the last 3 days. Waiting may be prudent.",
        ));
    }

    if classifier.confidence_percent > 75 {
        if classifier.signal == Signal::Buy && opportunity.score < DOWNGRADE_BELOW_SCORE {
            out.push(Insight::new(
                "triangle-exclamation",
                "Mixed Signals - Price Too High",
                format!(
                    "AI shows {}% confidence for BUY, but current price is at {}% of {}-day range. Recommendation: WAIT for price to dip before buying.",
                    classifier.confidence_percent, opportunity.price_position_percent, opportunity.window_days
                ),
            ));
        } else {
            out.push(Insight::new(
                "graduation-cap",
                "High Confidence Signal",
                format!(
                    "Our AI model shows {}% confidence in this {} recommendation based on multiple technical factors.",
                    classifier.confidence_percent, classifier.signal
                ),
            ));
        }
    } else if classifier.confidence_percent < 55 {
        out.push(Insight::new(
            "question-circle",
            "Uncertain Market Conditions",
            "Technical indicators are giving mixed signals. Consider waiting for clearer trends.",
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::{OpportunityTier, RawFeatures};
    use chrono::NaiveDate;

    fn features(momentum: f64, volatility: f64, price_to_ma7: f64, recent_trend: f64) -> FeatureVector {
        FeatureVector {
            momentum: 0.5,
            volatility: 0.5,
            price_to_ma7: 0.5,
            price_to_ma14: 0.5,
            recent_trend: 0.5,
            raw: RawFeatures {
                momentum,
                volatility,
                price_to_ma7,
                price_to_ma14: 0.0,
                recent_trend,
            },
            ma7_series: Vec::new(),
            ma14_series: Vec::new(),
        }
    }

    fn opportunity(score: u8) -> OpportunityAnalysis {
        OpportunityAnalysis {
            score,
            window_days: 30,
            recommendation_tier: OpportunityTier::from_score(score),
            lowest_price_in_window: 3110.35,
            lowest_price_date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            days_since_lowest: 6,
            current_vs_lowest_percent: 2.345,
            price_position_percent: 82,
            week_low: 3150.0,
            week_high: 3190.0,
            distance_from_week_low_percent: 1.25,
            volatility_percent: 0.876,
            dip_count: 4,
            trend_direction: TrendDirection::Rising,
        }
    }

    fn classifier(signal: Signal, confidence_percent: u8) -> ClassifierOutput {
        ClassifierOutput {
            signal,
            confidence_percent,
            raw_probability: confidence_percent as f64 / 100.0,
        }
    }

    fn usd() -> DisplayContext {
        DisplayContext {
            currency: Currency::Usd,
            exchange_rate: 89.7,
        }
    }

    fn recent() -> Vec<PricePoint> {
        vec![
            PricePoint {
                date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
                price: 200.0,
            },
            PricePoint {
                date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
                price: 202.0,
            },
        ]
    }

    #[test]
    fn buy_is_downgraded_below_45_for_every_score() {
        for score in 0..DOWNGRADE_BELOW_SCORE {
            let (signal, badge) = final_signal(&classifier(Signal::Buy, 90), score);
            assert_eq!(signal, Signal::Wait, "score {score}");
            assert_eq!(badge, BADGE_PRICE_TOO_HIGH);
        }
    }

    #[test]
    fn wait_is_never_upgraded() {
        for score in 0..=100u8 {
            let (signal, badge) = final_signal(&classifier(Signal::Wait, 30), score);
            assert_eq!(signal, Signal::Wait, "score {score}");
            assert_eq!(badge, BADGE_DEFAULT);
        }
    }

    #[test]
    fn buy_badges_follow_score_bands() {
        let buy = classifier(Signal::Buy, 70);
        assert_eq!(final_signal(&buy, 45), (Signal::Buy, BADGE_DEFAULT));
        assert_eq!(final_signal(&buy, 59), (Signal::Buy, BADGE_DEFAULT));
        assert_eq!(final_signal(&buy, 60), (Signal::Buy, BADGE_GOOD_TIME));
        assert_eq!(final_signal(&buy, 100), (Signal::Buy, BADGE_GOOD_TIME));
    }

    #[test]
    fn reconcile_is_pure() {
        let f = features(1.5, 0.5, 3.0, 0.8);
        let a = reconcile(&classifier(Signal::Buy, 80), &opportunity(70), &f, &recent(), &usd());
        let b = reconcile(&classifier(Signal::Buy, 80), &opportunity(70), &f, &recent(), &usd());
        assert_eq!(a, b);
        assert_eq!(a.final_signal, Signal::Buy);
        assert_eq!(a.badge_text, BADGE_GOOD_TIME);
    }

    #[test]
    fn opportunity_insights_come_first_then_momentum() {
        let f = features(1.5, 0.5, 3.0, 0.8);
        let rec = reconcile(&classifier(Signal::Buy, 80), &opportunity(70), &f, &recent(), &usd());
        let titles: Vec<&str> = rec.insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "GOOD TIME TO BUY",
                "Historical Context",
                "Recent Price Position",
                "Recent Trend: Rising",
                "Strong Upward Momentum",
                "Low Volatility Environment",
                "Price Above Moving Averages",
                "Positive Recent Trend",
                "High Confidence Signal",
            ]
        );
        assert_eq!(
            rec.insights[0].description,
            "Opportunity Score: 70/100. Price is in a favorable range with decent entry conditions."
        );
        assert_eq!(
            rec.insights[1].description,
            "Lowest price in last 30 days (Mar 4, 6 days ago): 24K $1000.00, 22K $916.70. Current price is 2.3% above lowest."
        );
    }

    #[test]
    fn conflicting_high_confidence_buy_warns() {
        let f = features(0.0, 1.5, 0.0, 0.0);
        let rec = reconcile(&classifier(Signal::Buy, 88), &opportunity(30), &f, &recent(), &usd());
        assert_eq!(rec.final_signal, Signal::Wait);
        assert_eq!(rec.badge_text, BADGE_PRICE_TOO_HIGH);
        let last = rec.insights.last().unwrap();
        assert_eq!(last.title, "Mixed Signals - Price Too High");
        assert!(last.description.contains("88% confidence"));
        assert!(last.description.contains("82% of 30-day range"));
        // Sideways, medium volatility, no MA/trend insight.
        assert_eq!(rec.insights[4].title, "Sideways Movement");
        assert_eq!(rec.insights.len(), 6);
    }

    #[test]
    fn low_confidence_is_flagged_uncertain() {
        let f = features(-2.0, 2.5, -3.0, -0.9);
        let rec = reconcile(&classifier(Signal::Wait, 20), &opportunity(50), &f, &recent(), &usd());
        let titles: Vec<&str> = rec.insights[4..].iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Downward Pressure",
                "High Volatility Detected",
                "Below Key Support Levels",
                "Recent Weakness",
                "Uncertain Market Conditions",
            ]
        );
    }

    #[test]
    fn price_change_uses_last_two_points() {
        let change = price_change_percent(&recent()).unwrap();
        assert!((change - 1.0).abs() < 1e-9);
        assert_eq!(price_change_percent(&recent()[..1]), None);
    }

    #[test]
    fn metrics_follow_raw_thresholds() {
        let m = market_metrics(&features(0.3, 0.5, 0.2, 0.0), &classifier(Signal::Buy, 70));
        assert_eq!(m.sentiment, Sentiment::Positive);
        assert_eq!(m.volatility_level, VolatilityLevel::Low);
        assert_eq!(m.momentum_direction, MomentumDirection::Upward);
        assert_eq!(m.pattern, PricePattern::Consolidating);

        let m = market_metrics(&features(-0.3, 1.5, 1.5, 0.0), &classifier(Signal::Wait, 39));
        assert_eq!(m.sentiment, Sentiment::Negative);
        assert_eq!(m.volatility_level, VolatilityLevel::Medium);
        assert_eq!(m.momentum_direction, MomentumDirection::Downward);
        assert_eq!(m.pattern, PricePattern::Breakout);

        let m = market_metrics(&features(0.0, 2.0, -1.5, 0.0), &classifier(Signal::Wait, 50));
        assert_eq!(m.sentiment, Sentiment::Neutral);
        assert_eq!(m.volatility_level, VolatilityLevel::High);
        assert_eq!(m.pattern, PricePattern::Pullback);
    }
}
