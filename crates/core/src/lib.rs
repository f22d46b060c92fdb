pub mod analysis;
pub mod domain;
pub mod ingest;
pub mod pipeline;
pub mod storage;
pub mod time;

pub mod config {
    use crate::analysis::classifier::{TrainingOptions, DEFAULT_THRESHOLD};
    use crate::analysis::features::MIN_FEATURE_POINTS;
    use crate::analysis::opportunity::{DEFAULT_WINDOW_DAYS, MIN_OPPORTUNITY_POINTS};
    use anyhow::{ensure, Context};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub gold_price_base_url: Option<String>,
        pub metals_api_base_url: Option<String>,
        pub metals_api_key: Option<String>,
        pub exchange_rate_base_url: Option<String>,
        pub exchange_rate_api_key: Option<String>,
        pub geolocation_url: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: env_opt("DATABASE_URL"),
                sentry_dsn: env_opt("SENTRY_DSN"),
                gold_price_base_url: env_opt("GOLD_PRICE_BASE_URL"),
                metals_api_base_url: env_opt("METALS_API_BASE_URL"),
                metals_api_key: env_opt("METALS_API_KEY"),
                exchange_rate_base_url: env_opt("EXCHANGE_RATE_BASE_URL"),
                exchange_rate_api_key: env_opt("EXCHANGE_RATE_API_KEY"),
                geolocation_url: env_opt("GEOLOCATION_URL"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_metals_api_key(&self) -> anyhow::Result<&str> {
            self.metals_api_key
                .as_deref()
                .context("METALS_API_KEY is required")
        }

        pub fn require_exchange_rate_api_key(&self) -> anyhow::Result<&str> {
            self.exchange_rate_api_key
                .as_deref()
                .context("EXCHANGE_RATE_API_KEY is required")
        }
    }

    /// Tunables of one evaluation run.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PipelineOptions {
        pub history_days: usize,
        pub cache_ttl_secs: i64,
        pub model_threshold: f64,
        pub opportunity_window_days: usize,
        pub chart_range_days: usize,
        pub training: TrainingOptions,
        pub seed: Option<u64>,
    }

    impl Default for PipelineOptions {
        fn default() -> Self {
            Self {
                history_days: 30,
                cache_ttl_secs: 24 * 60 * 60,
                model_threshold: DEFAULT_THRESHOLD,
                opportunity_window_days: DEFAULT_WINDOW_DAYS,
                chart_range_days: 30,
                training: TrainingOptions::default(),
                seed: None,
            }
        }
    }

    impl PipelineOptions {
        pub fn from_env() -> anyhow::Result<Self> {
            let mut o = Self::default();

            if let Some(v) = env_parse::<usize>("HISTORY_DAYS")? {
                o.history_days = v;
            }
            if let Some(v) = env_parse::<i64>("CACHE_TTL_SECS")? {
                o.cache_ttl_secs = v;
            }
            if let Some(v) = env_parse::<f64>("MODEL_THRESHOLD")? {
                o.model_threshold = v;
            }
            if let Some(v) = env_parse::<usize>("OPPORTUNITY_WINDOW_DAYS")? {
                o.opportunity_window_days = v;
            }
            if let Some(v) = env_parse::<usize>("CHART_RANGE_DAYS")? {
                o.chart_range_days = v;
            }
            if let Some(v) = env_parse::<usize>("TRAINING_SAMPLES")? {
                o.training.samples = v;
            }
            if let Some(v) = env_parse::<usize>("TRAINING_EPOCHS")? {
                o.training.epochs = v;
            }
            o.seed = env_parse::<u64>("GOLDSENSE_SEED")?;

            o.validate()?;
            Ok(o)
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            ensure!(
                self.history_days >= MIN_FEATURE_POINTS,
                "history_days must be >= {MIN_FEATURE_POINTS} (got {})",
                self.history_days
            );
            ensure!(self.cache_ttl_secs >= 0, "cache_ttl_secs must be >= 0");
            ensure!(
                (0.0..=1.0).contains(&self.model_threshold),
                "model_threshold must be in [0, 1] (got {})",
                self.model_threshold
            );
            ensure!(
                self.opportunity_window_days >= MIN_OPPORTUNITY_POINTS,
                "opportunity_window_days must be >= {MIN_OPPORTUNITY_POINTS}"
            );
            ensure!(self.chart_range_days >= 1, "chart_range_days must be >= 1");
            self.training.validate()
        }

        pub fn cache_ttl(&self) -> chrono::Duration {
            chrono::Duration::seconds(self.cache_ttl_secs)
        }

        /// Seeded when `seed` is set, so runs can be reproduced.
        pub fn rng(&self) -> StdRng {
            match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            }
        }
    }

    fn env_opt(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env_opt(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("invalid {key}={raw}: {e}")),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use rand::Rng;

        #[test]
        fn defaults_are_valid() {
            let o = PipelineOptions::default();
            o.validate().unwrap();
            assert_eq!(o.cache_ttl(), chrono::Duration::hours(24));
            assert_eq!(o.model_threshold, 0.65);
        }

        #[test]
        fn rejects_short_history_and_bad_threshold() {
            let mut o = PipelineOptions::default();
            o.history_days = 10;
            assert!(o.validate().is_err());

            let mut o = PipelineOptions::default();
            o.model_threshold = 1.5;
            assert!(o.validate().is_err());
        }

        #[test]
        fn seeded_rng_is_reproducible() {
            let o = PipelineOptions {
                seed: Some(42),
                ..PipelineOptions::default()
            };
            let a: u64 = o.rng().gen();
            let b: u64 = o.rng().gen();
            assert_eq!(a, b);
        }

        #[test]
        fn missing_keys_are_reported() {
            let s = Settings::default();
            assert!(s.require_database_url().is_err());
            assert!(s.require_exchange_rate_api_key().is_err());
        }
    }
}
