use crate::domain::market::PricePoint;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Time-ordered price history, oldest first.
///
/// Construction enforces the inbound contract for anything coming from a
/// provider, a cache entry or a generator: at least one point, strictly
/// increasing dates and finite positive prices. Length requirements of the
/// individual analysis stages are checked by those stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn try_new(points: Vec<PricePoint>) -> anyhow::Result<Self> {
        ensure!(!points.is_empty(), "price series must be non-empty");

        for (idx, point) in points.iter().enumerate() {
            ensure!(
                point.price.is_finite() && point.price > 0.0,
                "price at index {idx} ({}) must be positive (got {})",
                point.date,
                point.price
            );
        }

        for (idx, pair) in points.windows(2).enumerate() {
            ensure!(
                pair[1].date > pair[0].date,
                "dates must be strictly increasing: index {} ({}) is not after {}",
                idx + 1,
                pair[1].date,
                pair[0].date
            );
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> &PricePoint {
        // Non-empty by construction.
        &self.points[self.points.len() - 1]
    }

    /// The most recent `days` points (or all of them when shorter).
    pub fn tail(&self, days: usize) -> &[PricePoint] {
        let start = self.points.len().saturating_sub(days);
        &self.points[start..]
    }
}

impl TryFrom<Vec<PricePoint>> for PriceSeries {
    type Error = anyhow::Error;

    fn try_from(points: Vec<PricePoint>) -> Result<Self, Self::Error> {
        Self::try_new(points)
    }
}

impl From<PriceSeries> for Vec<PricePoint> {
    fn from(series: PriceSeries) -> Self {
        series.points
    }
}
