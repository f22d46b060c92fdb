use anyhow::Context;
use clap::Parser;
use goldsense_core::config::{PipelineOptions, Settings};
use goldsense_core::domain::evaluation::Evaluation;
use goldsense_core::domain::market::Currency;
use goldsense_core::ingest::MarketDataSource;
use goldsense_core::storage::cache::{CacheStore, MemoryCache};
use goldsense_core::storage::pg_cache::PgCache;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const FAILURE_MESSAGE: &str = "Unable to generate the gold analysis right now. Please try again later.";

#[derive(Debug, Parser)]
#[command(name = "goldsense_worker")]
struct Args {
    /// Chart range in days (7, 14 or 30 in the UI; any positive value works).
    #[arg(long)]
    range_days: Option<usize>,

    /// Display currency (USD or INR). Saved as the preference for later runs.
    #[arg(long)]
    currency: Option<String>,

    /// Date of the latest price point (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    as_of_date: Option<String>,

    /// Skip all network calls; use cached values, mock history and fallbacks.
    #[arg(long)]
    offline: bool,

    /// Seed for training data, weights and generated history.
    #[arg(long)]
    seed: Option<u64>,

    /// Pretty-print the evaluation JSON.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let mut options = PipelineOptions::from_env()?;
    if let Some(seed) = args.seed {
        options.seed = Some(seed);
    }
    if let Some(range_days) = args.range_days {
        options.chart_range_days = range_days;
    }
    options.validate()?;

    let currency = args
        .currency
        .as_deref()
        .map(str::parse::<Currency>)
        .transpose()?;

    let now = chrono::Utc::now();
    let as_of_date = goldsense_core::time::resolve_as_of_date(args.as_of_date.as_deref(), now)?;

    let cache = open_cache(&settings, args.offline).await;
    let source = if args.offline {
        MarketDataSource::offline(cache, &options)
    } else {
        MarketDataSource::from_settings(&settings, cache, &options)?
    };

    match evaluate(&source, &options, as_of_date, currency, now).await {
        Ok(evaluation) => {
            let out = if args.pretty {
                serde_json::to_string_pretty(&evaluation)?
            } else {
                serde_json::to_string(&evaluation)?
            };
            println!("{out}");
            tracing::info!(
                %as_of_date,
                evaluation_id = %evaluation.evaluation_id,
                signal = %evaluation.recommendation.final_signal,
                score = evaluation.opportunity.score,
                "evaluation complete"
            );
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%as_of_date, error = %format!("{err:#}"), "evaluation failed");
            anyhow::bail!(FAILURE_MESSAGE)
        }
    }
}

async fn evaluate(
    source: &MarketDataSource,
    options: &PipelineOptions,
    as_of_date: chrono::NaiveDate,
    currency: Option<Currency>,
    now: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<Evaluation> {
    if let Some(currency) = currency {
        source.set_currency_preference(currency, now).await?;
    }

    let mut rng = options.rng();
    let (mut session, price_source) = goldsense_core::pipeline::prepare_session(
        source, options, as_of_date, currency, now, &mut rng,
    )
    .await?;
    tracing::info!(%as_of_date, ?price_source, cache = source.cache_backend(), "inputs ready");

    session.run(&mut rng)
}

/// Postgres when configured and reachable, otherwise process memory.
async fn open_cache(settings: &Settings, offline: bool) -> Arc<dyn CacheStore> {
    if offline {
        return Arc::new(MemoryCache::new());
    }

    let Ok(db_url) = settings.require_database_url() else {
        tracing::info!("DATABASE_URL not set; caching in memory for this run");
        return Arc::new(MemoryCache::new());
    };

    match connect(db_url).await {
        Ok(pool) => Arc::new(PgCache::new(pool)),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::warn!(error = %err, "database unavailable; caching in memory for this run");
            Arc::new(MemoryCache::new())
        }
    }
}

async fn connect(db_url: &str) -> anyhow::Result<sqlx::PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    goldsense_core::storage::migrate(&pool).await?;
    Ok(pool)
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_flag_set() {
        let args = Args::try_parse_from([
            "goldsense_worker",
            "--range-days",
            "14",
            "--currency",
            "inr",
            "--as-of-date",
            "2026-03-10",
            "--offline",
            "--seed",
            "42",
            "--pretty",
        ])
        .unwrap();
        assert_eq!(args.range_days, Some(14));
        assert_eq!(args.currency.as_deref(), Some("inr"));
        assert!(args.offline && args.pretty);
        assert_eq!(args.seed, Some(42));
    }

    #[tokio::test]
    async fn offline_evaluation_persists_currency_choice() {
        let options = PipelineOptions {
            seed: Some(3),
            ..PipelineOptions::default()
        };
        let source = MarketDataSource::offline(Arc::new(MemoryCache::new()), &options);
        let now = chrono::Utc::now();
        let as_of_date = now.date_naive();

        let ev = evaluate(&source, &options, as_of_date, Some(Currency::Inr), now)
            .await
            .unwrap();
        assert_eq!(ev.currency, Currency::Inr);
        assert_eq!(source.currency_preference().await, Some(Currency::Inr));
    }
}
