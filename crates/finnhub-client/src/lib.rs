//! Typed Finnhub client: real-time quote, company profile, company news and
//! basic financials. Finnhub signals throttling with HTTP 429 and auth
//! problems with 401/403; numeric fields are real JSON numbers.

use std::collections::HashMap;
use std::time::Duration;

use ingest_core::limiter::RateLimiter;
use ingest_core::IngestError;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

const PROVIDER: &str = "finnhub";
const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

#[derive(Clone)]
pub struct FinnhubClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl FinnhubClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        // Free tier allows 60 req/min.
        let rate_limit: usize = std::env::var("FINNHUB_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    async fn send_request(
        &self,
        path: &str,
        symbol: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, IngestError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut last_err = IngestError::provider(PROVIDER, symbol, "no attempts made");

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let jitter = rand::thread_rng().gen_range(0..250);
                let backoff =
                    Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(attempt - 1) + jitter);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            self.rate_limiter.acquire(cancel).await?;

            let request = self
                .client
                .get(&url)
                .header("X-Finnhub-Token", &self.api_key)
                .query(params);

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                res = request.send() => res,
            };

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    if e.is_timeout() || e.is_connect() {
                        last_err = IngestError::Transient(format!("{}: {}", PROVIDER, e));
                        continue;
                    }
                    return Err(IngestError::provider(PROVIDER, symbol, e.to_string()));
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                last_err =
                    IngestError::Transient(format!("{} HTTP {} for {}", PROVIDER, status, symbol));
                continue;
            }
            if !status.is_success() {
                return Err(IngestError::provider(
                    PROVIDER,
                    symbol,
                    format!("HTTP {}", status),
                ));
            }

            return response
                .json()
                .await
                .map_err(|e| IngestError::provider(PROVIDER, symbol, e.to_string()));
        }

        Err(last_err)
    }

    fn decode<T: serde::de::DeserializeOwned>(
        &self,
        symbol: &str,
        body: serde_json::Value,
    ) -> Result<T, IngestError> {
        serde_json::from_value(body)
            .map_err(|e| IngestError::provider(PROVIDER, symbol, format!("parse: {}", e)))
    }

    /// Succeeds iff an authenticated quote round-trips with a usable price.
    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<(), IngestError> {
        let quote = self.quote("AAPL", cancel).await?;
        if quote.current_price <= 0.0 {
            return Err(IngestError::provider(PROVIDER, "AAPL", "empty quote payload"));
        }
        Ok(())
    }

    pub async fn quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<QuoteResponse, IngestError> {
        let body = self
            .send_request("quote", symbol, &[("symbol", symbol.to_string())], cancel)
            .await?;
        self.decode(symbol, body)
    }

    pub async fn company_profile(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<ProfileResponse, IngestError> {
        let body = self
            .send_request(
                "stock/profile2",
                symbol,
                &[("symbol", symbol.to_string())],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    /// News between two `YYYY-MM-DD` dates, newest first.
    pub async fn company_news(
        &self,
        symbol: &str,
        from: &str,
        to: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<NewsArticle>, IngestError> {
        let body = self
            .send_request(
                "company-news",
                symbol,
                &[
                    ("symbol", symbol.to_string()),
                    ("from", from.to_string()),
                    ("to", to.to_string()),
                ],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn basic_financials(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<BasicFinancialsResponse, IngestError> {
        let body = self
            .send_request(
                "stock/metric",
                symbol,
                &[
                    ("symbol", symbol.to_string()),
                    ("metric", "all".to_string()),
                ],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }
}

/// `/quote`: current price snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    #[serde(rename = "c", default)]
    pub current_price: f64,
    #[serde(rename = "d", default)]
    pub change: Option<f64>,
    #[serde(rename = "dp", default)]
    pub change_percent: Option<f64>,
    #[serde(rename = "h", default)]
    pub high: Option<f64>,
    #[serde(rename = "l", default)]
    pub low: Option<f64>,
    #[serde(rename = "o", default)]
    pub open: Option<f64>,
    #[serde(rename = "pc", default)]
    pub previous_close: Option<f64>,
    #[serde(rename = "t", default)]
    pub timestamp: i64,
}

/// `/stock/profile2`: descriptive company profile.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub ipo: Option<String>,
    #[serde(rename = "marketCapitalization", default)]
    pub market_capitalization: Option<f64>,
    #[serde(rename = "shareOutstanding", default)]
    pub share_outstanding: Option<f64>,
    #[serde(rename = "finnhubIndustry", default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub weburl: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// One `/company-news` article.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsArticle {
    pub id: i64,
    #[serde(default)]
    pub category: Option<String>,
    /// Unix seconds.
    pub datetime: i64,
    pub headline: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub related: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// `/stock/metric`: ratio map keyed by Finnhub metric names.
#[derive(Debug, Clone, Deserialize)]
pub struct BasicFinancialsResponse {
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "metricType", default)]
    pub metric_type: Option<String>,
    #[serde(default)]
    pub metric: HashMap<String, serde_json::Value>,
}

impl BasicFinancialsResponse {
    /// Numeric metric accessor; Finnhub mixes numbers and nulls in the map.
    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metric.get(key).and_then(|v| v.as_f64())
    }
}
