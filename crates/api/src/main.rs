use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use goldsense_core::config::{PipelineOptions, Settings};
use goldsense_core::domain::evaluation::{ChartSeries, Evaluation};
use goldsense_core::domain::market::Currency;
use goldsense_core::ingest::MarketDataSource;
use goldsense_core::pipeline::{prepare_session, EvaluationSession};
use goldsense_core::storage::cache::{CacheStore, MemoryCache};
use goldsense_core::storage::pg_cache::PgCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ANALYSIS_FAILED: &str = "Unable to generate the gold analysis right now. Please try again later.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let options = PipelineOptions::from_env()?;

    let cache: Arc<dyn CacheStore> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match goldsense_core::storage::migrate(&pool).await {
                Ok(()) => Arc::new(PgCache::new(pool)),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    Arc::new(MemoryCache::new())
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                Arc::new(MemoryCache::new())
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            Arc::new(MemoryCache::new())
        }
    };

    let source = MarketDataSource::from_settings(&settings, cache, &options)?;
    let state = AppState {
        source: Arc::new(source),
        options,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, cache = state.source.cache_backend(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/analysis", get(get_analysis))
        .route("/chart", get(get_chart))
        .route("/preferences/currency", put(put_currency_preference))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    source: Arc<MarketDataSource>,
    options: PipelineOptions,
}

#[derive(Debug, Default, Deserialize)]
struct ViewQuery {
    range_days: Option<usize>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrencyPreferenceBody {
    currency: String,
}

#[derive(Debug, Serialize)]
struct CurrencyPreference {
    currency: Currency,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Failed(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message })).into_response()
            }
            ApiError::Failed(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %format!("{err:#}"), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: ANALYSIS_FAILED.to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl ViewQuery {
    fn currency(&self) -> Result<Option<Currency>, ApiError> {
        self.currency
            .as_deref()
            .map(|c| c.parse::<Currency>())
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }

    fn range_days(&self, options: &PipelineOptions) -> Result<usize, ApiError> {
        match self.range_days {
            Some(0) => Err(ApiError::BadRequest("range_days must be >= 1".to_string())),
            Some(days) => Ok(days),
            None => Ok(options.chart_range_days),
        }
    }
}

async fn load_session(
    state: &AppState,
    currency: Option<Currency>,
) -> Result<(EvaluationSession, rand::rngs::StdRng), ApiError> {
    let now = chrono::Utc::now();
    let mut rng = state.options.rng();
    let (session, _) = prepare_session(
        &state.source,
        &state.options,
        now.date_naive(),
        currency,
        now,
        &mut rng,
    )
    .await
    .map_err(ApiError::Failed)?;
    Ok((session, rng))
}

async fn get_analysis(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<Evaluation>, ApiError> {
    let currency = query.currency()?;
    let range_days = query.range_days(&state.options)?;

    let (mut session, mut rng) = load_session(&state, currency).await?;

    // Training is CPU-bound.
    let evaluation = tokio::task::spawn_blocking(move || {
        session.run(&mut rng)?;
        session.render(range_days)
    })
    .await
    .map_err(|e| ApiError::Failed(anyhow::Error::new(e)))?
    .map_err(ApiError::Failed)?;

    Ok(Json(evaluation))
}

async fn get_chart(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<ChartSeries>, ApiError> {
    let currency = query.currency()?;
    let range_days = query.range_days(&state.options)?;

    let (session, _) = load_session(&state, currency).await?;
    let chart = session.chart(range_days).map_err(ApiError::Failed)?;
    Ok(Json(chart))
}

async fn put_currency_preference(
    State(state): State<AppState>,
    Json(body): Json<CurrencyPreferenceBody>,
) -> Result<Json<CurrencyPreference>, ApiError> {
    let currency = body
        .currency
        .parse::<Currency>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .source
        .set_currency_preference(currency, chrono::Utc::now())
        .await
        .map_err(ApiError::Failed)?;

    Ok(Json(CurrencyPreference { currency }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
    fn range_days_defaults_and_rejects_zero() {
        let options = PipelineOptions::default();
        assert_eq!(ViewQuery::default().range_days(&options).unwrap(), 30);

        let q = ViewQuery {
            range_days: Some(7),
            currency: None,
        };
        assert_eq!(q.range_days(&options).unwrap(), 7);

        let q = ViewQuery {
            range_days: Some(0),
            currency: None,
        };
        assert!(matches!(q.range_days(&options), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn currency_query_is_case_insensitive() {
        let q = ViewQuery {
            range_days: None,
            currency: Some("inr".to_string()),
        };
        assert_eq!(q.currency().unwrap(), Some(Currency::Inr));

        let q = ViewQuery {
            range_days: None,
            currency: Some("EUR".to_string()),
        };
        assert!(q.currency().is_err());
    }
}
