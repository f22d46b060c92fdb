//! One evaluation: inputs are fetched once, the model is trained once, and the
//! result can be re-rendered for another currency or chart range.

use crate::analysis::classifier::{classify, MlpClassifier, TrainingReport};
use crate::analysis::currency::{convert_price, quote, UnitWeight};
use crate::analysis::features::{extract_features, moving_average};
use crate::analysis::opportunity::analyze_opportunity;
use crate::analysis::reconcile::{market_metrics, reconcile, DisplayContext};
use crate::config::PipelineOptions;
use crate::domain::contract::PriceSeries;
use crate::domain::evaluation::{
    ChartSeries, ClassifierOutput, Evaluation, FeatureVector, OpportunityAnalysis,
};
use crate::domain::market::{Currency, Location};
use crate::ingest::{MarketDataSource, PriceSource};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;

#[derive(Debug, Clone)]
struct Scored {
    features: FeatureVector,
    classifier: ClassifierOutput,
    opportunity: OpportunityAnalysis,
    report: TrainingReport,
}

#[derive(Debug, Clone)]
pub struct EvaluationSession {
    series: PriceSeries,
    display: DisplayContext,
    location: Option<Location>,
    as_of_date: NaiveDate,
    options: PipelineOptions,
    scored: Option<Scored>,
}

impl EvaluationSession {
    pub fn new(
        series: PriceSeries,
        display: DisplayContext,
        location: Option<Location>,
        as_of_date: NaiveDate,
        options: PipelineOptions,
    ) -> anyhow::Result<Self> {
        options.validate()?;
        Ok(Self {
            series,
            display,
            location,
            as_of_date,
            options,
            scored: None,
        })
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn display(&self) -> DisplayContext {
        self.display
    }

    pub fn training_report(&self) -> Option<&TrainingReport> {
        self.scored.as_ref().map(|s| &s.report)
    }

    /// Features, training, inference and opportunity analysis, then render.
    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> anyhow::Result<Evaluation> {
        let prices = self.series.prices();

        let features = tracing::info_span!("features")
            .in_scope(|| extract_features(&prices))?;

        let (model, report) = tracing::info_span!("training").in_scope(|| {
            let (model, report) = MlpClassifier::train(&self.options.training, rng)?;
            tracing::info!(
                samples = report.samples,
                epochs = report.epochs,
                initial_loss = report.initial_loss,
                final_loss = report.final_loss,
                accuracy = report.accuracy,
                "model trained"
            );
            anyhow::Ok((model, report))
        })?;

        let classifier = tracing::info_span!("inference")
            .in_scope(|| classify(&model, &features, self.options.model_threshold));
        tracing::info!(
            signal = %classifier.signal,
            confidence = classifier.confidence_percent,
            probability = classifier.raw_probability,
            "classifier output"
        );

        let opportunity = tracing::info_span!("opportunity").in_scope(|| {
            analyze_opportunity(
                self.series.tail(self.options.opportunity_window_days),
                self.as_of_date,
            )
        })?;
        tracing::info!(
            score = opportunity.score,
            tier = ?opportunity.recommendation_tier,
            "opportunity analyzed"
        );

        self.scored = Some(Scored {
            features,
            classifier,
            opportunity,
            report,
        });
        self.render(self.options.chart_range_days)
    }

    /// Switches the display currency; the trained result is kept.
    pub fn set_display(&mut self, display: DisplayContext) {
        self.display = display;
    }

    /// Builds the evaluation from the last [`run`](Self::run) in the current
    /// display currency.
    pub fn render(&self, range_days: usize) -> anyhow::Result<Evaluation> {
        let scored = self
            .scored
            .as_ref()
            .context("evaluation session has not been run")?;

        let recommendation = tracing::info_span!("reconcile").in_scope(|| {
            reconcile(
                &scored.classifier,
                &scored.opportunity,
                &scored.features,
                self.series.tail(2),
                &self.display,
            )
        });
        tracing::info!(
            final_signal = %recommendation.final_signal,
            badge = %recommendation.badge_text,
            "recommendation reconciled"
        );

        let latest = *self.series.latest();
        Ok(Evaluation {
            evaluation_id: uuid::Uuid::new_v4(),
            as_of_date: self.as_of_date,
            generated_at: Utc::now(),
            currency: self.display.currency,
            exchange_rate: self.display.exchange_rate,
            location: self.location.clone(),
            latest_price: latest,
            quote: quote(latest.price, self.display.currency, self.display.exchange_rate),
            features: scored.features.clone(),
            classifier: scored.classifier,
            opportunity: scored.opportunity.clone(),
            recommendation,
            metrics: market_metrics(&scored.features, &scored.classifier),
            chart: self.chart(range_days)?,
        })
    }

    /// Chart data for the last `range_days` points. Moving averages are
    /// recomputed over the slice, so they start empty at its beginning.
    pub fn chart(&self, range_days: usize) -> anyhow::Result<ChartSeries> {
        anyhow::ensure!(range_days >= 1, "range_days must be >= 1");
        let window = self.series.tail(range_days);
        let usd: Vec<f64> = window.iter().map(|p| p.price).collect();

        let DisplayContext {
            currency,
            exchange_rate,
        } = self.display;
        let to_display = |v: f64| convert_price(v, currency, exchange_rate, UnitWeight::TenGrams);

        Ok(ChartSeries {
            currency,
            range_days: window.len(),
            dates: window.iter().map(|p| p.date).collect(),
            prices: usd.iter().copied().map(to_display).collect(),
            ma7: moving_average(&usd, 7)
                .into_iter()
                .map(|v| v.map(to_display))
                .collect(),
            ma14: moving_average(&usd, 14)
                .into_iter()
                .map(|v| v.map(to_display))
                .collect(),
        })
    }
}

/// Inputs of one evaluation, resolved in order: currency and location,
/// exchange rate, price series.
pub async fn prepare_session<R: Rng + Send + ?Sized>(
    source: &MarketDataSource,
    options: &PipelineOptions,
    as_of_date: NaiveDate,
    currency_override: Option<Currency>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> anyhow::Result<(EvaluationSession, PriceSource)> {
    let (currency, location) = match currency_override {
        Some(currency) => (currency, None),
        None => source.resolve_currency(now).await,
    };
    let exchange_rate = source.exchange_rate(now).await;
    tracing::info!(%currency, exchange_rate, "display context resolved");

    let (series, price_source) = source.price_series(as_of_date, now, rng).await?;
    tracing::info!(
        points = series.len(),
        latest = series.latest().price,
        source = ?price_source,
        "price series loaded"
    );

    let session = EvaluationSession::new(
        series,
        DisplayContext {
            currency,
            exchange_rate,
        },
        location,
        as_of_date,
        options.clone(),
    )?;
    Ok((session, price_source))
}
