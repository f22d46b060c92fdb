use crate::domain::market::{Currency, Location, PricePoint, Signal};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pre-normalization indicator values, kept for display and insight thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFeatures {
    /// OLS slope of the last 7 prices (price units per day).
    pub momentum: f64,
    /// Population std-dev of daily % changes.
    pub volatility: f64,
    pub price_to_ma7: f64,
    pub price_to_ma14: f64,
    /// Mean of the last 3 daily % changes.
    pub recent_trend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub momentum: f64,
    pub volatility: f64,
    pub price_to_ma7: f64,
    pub price_to_ma14: f64,
    pub recent_trend: f64,
    pub raw: RawFeatures,
    pub ma7_series: Vec<Option<f64>>,
    pub ma14_series: Vec<Option<f64>>,
}

impl FeatureVector {
    /// Normalized fields in model input order.
    pub fn model_input(&self) -> [f64; 5] {
        [
            self.momentum,
            self.volatility,
            self.price_to_ma7,
            self.price_to_ma14,
            self.recent_trend,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub signal: Signal,
    pub confidence_percent: u8,
    pub raw_probability: f64,
}

impl ClassifierOutput {
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        let p = if probability.is_finite() {
            probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let signal = if p >= threshold {
            Signal::Buy
        } else {
            Signal::Wait
        };
        Self {
            signal,
            confidence_percent: (p * 100.0).round() as u8,
            raw_probability: p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpportunityTier {
    // Declaration order is ascending so `Ord` follows the score.
    Wait,
    Moderate,
    Good,
    Excellent,
}

impl OpportunityTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            75.. => OpportunityTier::Excellent,
            60..=74 => OpportunityTier::Good,
            45..=59 => OpportunityTier::Moderate,
            _ => OpportunityTier::Wait,
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            OpportunityTier::Excellent => "EXCELLENT TIME TO BUY",
            OpportunityTier::Good => "GOOD TIME TO BUY",
            OpportunityTier::Moderate => "MODERATE OPPORTUNITY",
            OpportunityTier::Wait => "WAIT FOR BETTER OPPORTUNITY",
        }
    }

    pub fn reasoning(self) -> &'static str {
        match self {
            OpportunityTier::Excellent => {
                "Current price is near historical lows with favorable technical conditions."
            }
            OpportunityTier::Good => "Price is in a favorable range with decent entry conditions.",
            OpportunityTier::Moderate => {
                "Consider waiting for a better entry point or buy in smaller amounts."
            }
            OpportunityTier::Wait => {
                "Current price is relatively high. Consider waiting for a dip."
            }
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            OpportunityTier::Excellent => "bullseye",
            OpportunityTier::Good => "check-circle",
            OpportunityTier::Moderate => "balance-scale",
            OpportunityTier::Wait => "hourglass-half",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Rising,
    Falling,
}

impl TrendDirection {
    pub fn label(self) -> &'static str {
        match self {
            TrendDirection::Rising => "Rising",
            TrendDirection::Falling => "Falling",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityAnalysis {
    pub score: u8,
    pub window_days: usize,
    pub recommendation_tier: OpportunityTier,
    pub lowest_price_in_window: f64,
    pub lowest_price_date: NaiveDate,
    pub days_since_lowest: i64,
    pub current_vs_lowest_percent: f64,
    pub price_position_percent: u8,
    pub week_low: f64,
    pub week_high: f64,
    pub distance_from_week_low_percent: f64,
    pub volatility_percent: f64,
    pub dip_count: usize,
    pub trend_direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub icon: String,
    pub title: String,
    pub description: String,
}

impl Insight {
    pub fn new(icon: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            icon: icon.to_string(),
            title: title.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecommendation {
    pub final_signal: Signal,
    pub badge_text: String,
    /// Change between the latest two price points, in percent.
    pub price_change_percent: Option<f64>,
    pub insights: Vec<Insight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MomentumDirection {
    Upward,
    Downward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PricePattern {
    Consolidating,
    Breakout,
    Pullback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub sentiment: Sentiment,
    pub volatility_level: VolatilityLevel,
    pub momentum_direction: MomentumDirection,
    pub pattern: PricePattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedPrice {
    pub amount: f64,
    pub display: String,
}

/// Latest price in the display currency at both purities and both unit weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub currency: Currency,
    pub k24_per_10g: QuotedPrice,
    pub k22_per_10g: QuotedPrice,
    pub k24_per_gram: QuotedPrice,
    pub k22_per_gram: QuotedPrice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub currency: Currency,
    pub range_days: usize,
    pub dates: Vec<NaiveDate>,
    /// 24K price per 10 g in the display currency.
    pub prices: Vec<f64>,
    pub ma7: Vec<Option<f64>>,
    pub ma14: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub evaluation_id: Uuid,
    pub as_of_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub currency: Currency,
    pub exchange_rate: f64,
    pub location: Option<Location>,
    pub latest_price: PricePoint,
    pub quote: PriceQuote,
    pub features: FeatureVector,
    pub classifier: ClassifierOutput,
    pub opportunity: OpportunityAnalysis,
    pub recommendation: FinalRecommendation,
    pub metrics: MarketMetrics,
    pub chart: ChartSeries,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_output_applies_threshold_and_rounds_confidence() {
        let buy = ClassifierOutput::from_probability(0.654, 0.65);
        assert_eq!(buy.signal, Signal::Buy);
        assert_eq!(buy.confidence_percent, 65);

        let wait = ClassifierOutput::from_probability(0.649, 0.65);
        assert_eq!(wait.signal, Signal::Wait);
        assert_eq!(wait.confidence_percent, 65);

        let exact = ClassifierOutput::from_probability(0.65, 0.65);
        assert_eq!(exact.signal, Signal::Buy);
    }

    #[test]
    fn classifier_output_sanitizes_probability() {
        let nan = ClassifierOutput::from_probability(f64::NAN, 0.65);
        assert_eq!(nan.signal, Signal::Wait);
        assert_eq!(nan.confidence_percent, 0);

        let over = ClassifierOutput::from_probability(1.3, 0.65);
        assert_eq!(over.confidence_percent, 100);
        assert_eq!(over.raw_probability, 1.0);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(OpportunityTier::from_score(100), OpportunityTier::Excellent);
        assert_eq!(OpportunityTier::from_score(75), OpportunityTier::Excellent);
        assert_eq!(OpportunityTier::from_score(74), OpportunityTier::Good);
        assert_eq!(OpportunityTier::from_score(60), OpportunityTier::Good);
        assert_eq!(OpportunityTier::from_score(59), OpportunityTier::Moderate);
        assert_eq!(OpportunityTier::from_score(45), OpportunityTier::Moderate);
        assert_eq!(OpportunityTier::from_score(44), OpportunityTier::Wait);
        assert_eq!(OpportunityTier::from_score(0), OpportunityTier::Wait);
    }

    #[test]
    fn tier_is_monotonic_in_score() {
        let mut prev = OpportunityTier::from_score(0);
        for score in 1..=100u8 {
            let tier = OpportunityTier::from_score(score);
            assert!(tier >= prev, "score {score} dropped tier");
            prev = tier;
        }
    }
}
