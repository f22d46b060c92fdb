use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ATTEMPTS: u32 = 1;

/// JSON GET client shared by the market-data adapters.
///
/// Timeout and attempt count are read from `{PREFIX}_TIMEOUT_SECS` and
/// `{PREFIX}_RETRIES`; a single attempt is made unless configured otherwise.
#[derive(Debug, Clone)]
pub struct JsonHttpClient {
    http: reqwest::Client,
    source: &'static str,
    attempts: u32,
}

impl JsonHttpClient {
    pub fn from_env(source: &'static str, env_prefix: &str) -> Result<Self> {
        let timeout_secs = std::env::var(format!("{env_prefix}_TIMEOUT_SECS"))
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let attempts = std::env::var(format!("{env_prefix}_RETRIES"))
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_ATTEMPTS)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .with_context(|| format!("failed to build {source} http client"))?;

        Ok(Self {
            http,
            source,
            attempts,
        })
    }

    async fn get_once(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.source))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read {} response", self.source))?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("{} response is not valid JSON: {text}", self.source))?;

        if !status.is_success() {
            anyhow::bail!("{} HTTP {status}: {raw_json}", self.source);
        }
        Ok(raw_json)
    }

    pub async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(url, query).await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= self.attempts {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1).min(5));
                    tracing::warn!(source = self.source, attempt, ?backoff, error = %err, "fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://a.example/", "/v6/latest"), "https://a.example/v6/latest");
        assert_eq!(join_url("https://a.example", "v6/latest"), "https://a.example/v6/latest");
    }
}
