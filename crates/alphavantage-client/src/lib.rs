//! Typed Alpha Vantage client: fundamentals overview, daily/weekly/monthly
//! time series, the indicator catalogue, and the earnings calendar.
//!
//! Alpha Vantage reports most failures inside a 200 body: `"Error Message"`
//! is permanent (bad symbol/function), `"Note"`/`"Information"` is the
//! throttle response and therefore retryable.

pub mod responses;

use std::time::Duration;

use ingest_core::limiter::RateLimiter;
use ingest_core::IngestError;
use rand::Rng;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

pub use crate::responses::*;

const PROVIDER: &str = "alphavantage";
const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

#[derive(Clone)]
pub struct AlphaVantageClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl AlphaVantageClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        // Free tier allows 5 req/min; paid plans lift this via env override.
        let rate_limit: usize = std::env::var("ALPHAVANTAGE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

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

    /// Paced, retried GET returning the parsed JSON body. Only transient
    /// failures (network, 5xx, 429, throttle notes) are retried.
    async fn send_request(
        &self,
        symbol: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, IngestError> {
        let mut last_err = IngestError::provider(PROVIDER, symbol, "no attempts made");

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let jitter = rand::thread_rng().gen_range(0..250);
                let backoff =
                    Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(attempt - 1) + jitter);
                tracing::debug!(
                    "alphavantage retry {}/{} for {} in {:?}",
                    attempt + 1,
                    MAX_ATTEMPTS,
                    symbol,
                    backoff
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            self.rate_limiter.acquire(cancel).await?;

            let mut query: Vec<(&str, String)> = params.to_vec();
            query.push(("apikey", self.api_key.clone()));

            let request = self.client.get(&self.base_url).query(&query);
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

            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| IngestError::provider(PROVIDER, symbol, e.to_string()))?;

            if let Some(error) = body.get("Error Message") {
                return Err(IngestError::provider(PROVIDER, symbol, error.to_string()));
            }
            // Throttle replies come back 200 with a "Note"/"Information" body.
            if let Some(note) = body.get("Note").or_else(|| body.get("Information")) {
                last_err = IngestError::Transient(format!("{} throttled: {}", PROVIDER, note));
                continue;
            }

            return Ok(body);
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

    /// Succeeds iff a trivial authenticated call round-trips.
    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<(), IngestError> {
        let body = self
            .send_request(
                "IBM",
                &[
                    ("function", "GLOBAL_QUOTE".to_string()),
                    ("symbol", "IBM".to_string()),
                ],
                cancel,
            )
            .await?;
        let quote: GlobalQuoteResponse = self.decode("IBM", body)?;
        if quote.quote.is_empty() {
            return Err(IngestError::provider(PROVIDER, "IBM", "empty quote payload"));
        }
        Ok(())
    }

    pub async fn company_overview(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<CompanyOverview, IngestError> {
        let body = self
            .send_request(
                symbol,
                &[
                    ("function", "OVERVIEW".to_string()),
                    ("symbol", symbol.to_string()),
                ],
                cancel,
            )
            .await?;
        if body.get("Symbol").is_none() {
            return Err(IngestError::provider(PROVIDER, symbol, "empty overview"));
        }
        self.decode(symbol, body)
    }

    pub async fn time_series_daily(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<TimeSeriesResponse, IngestError> {
        let body = self
            .send_request(
                symbol,
                &[
                    ("function", "TIME_SERIES_DAILY".to_string()),
                    ("symbol", symbol.to_string()),
                    ("outputsize", "compact".to_string()),
                ],
                cancel,
            )
            .await?;
        let payload: responses::DailySeriesPayload = self.decode(symbol, body)?;
        Ok(TimeSeriesResponse {
            symbol: symbol.to_string(),
            points: payload.series,
        })
    }

    pub async fn time_series_weekly(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<TimeSeriesResponse, IngestError> {
        let body = self
            .send_request(
                symbol,
                &[
                    ("function", "TIME_SERIES_WEEKLY".to_string()),
                    ("symbol", symbol.to_string()),
                ],
                cancel,
            )
            .await?;
        let payload: responses::WeeklySeriesPayload = self.decode(symbol, body)?;
        Ok(TimeSeriesResponse {
            symbol: symbol.to_string(),
            points: payload.series,
        })
    }

    pub async fn time_series_monthly(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<TimeSeriesResponse, IngestError> {
        let body = self
            .send_request(
                symbol,
                &[
                    ("function", "TIME_SERIES_MONTHLY".to_string()),
                    ("symbol", symbol.to_string()),
                ],
                cancel,
            )
            .await?;
        let payload: responses::MonthlySeriesPayload = self.decode(symbol, body)?;
        Ok(TimeSeriesResponse {
            symbol: symbol.to_string(),
            points: payload.series,
        })
    }

    async fn indicator_request(
        &self,
        function: &str,
        symbol: &str,
        interval: &str,
        extra: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, IngestError> {
        let mut params = vec![
            ("function", function.to_string()),
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
        ];
        params.extend_from_slice(extra);
        self.send_request(symbol, &params, cancel).await
    }

    pub async fn rsi(
        &self,
        symbol: &str,
        interval: &str,
        time_period: u32,
        series_type: &str,
        cancel: &CancellationToken,
    ) -> Result<RsiResponse, IngestError> {
        let body = self
            .indicator_request(
                "RSI",
                symbol,
                interval,
                &[
                    ("time_period", time_period.to_string()),
                    ("series_type", series_type.to_string()),
                ],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn sma(
        &self,
        symbol: &str,
        interval: &str,
        time_period: u32,
        series_type: &str,
        cancel: &CancellationToken,
    ) -> Result<SmaResponse, IngestError> {
        let body = self
            .indicator_request(
                "SMA",
                symbol,
                interval,
                &[
                    ("time_period", time_period.to_string()),
                    ("series_type", series_type.to_string()),
                ],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn ema(
        &self,
        symbol: &str,
        interval: &str,
        time_period: u32,
        series_type: &str,
        cancel: &CancellationToken,
    ) -> Result<EmaResponse, IngestError> {
        let body = self
            .indicator_request(
                "EMA",
                symbol,
                interval,
                &[
                    ("time_period", time_period.to_string()),
                    ("series_type", series_type.to_string()),
                ],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn macd(
        &self,
        symbol: &str,
        interval: &str,
        series_type: &str,
        cancel: &CancellationToken,
    ) -> Result<MacdResponse, IngestError> {
        let body = self
            .indicator_request(
                "MACD",
                symbol,
                interval,
                &[("series_type", series_type.to_string())],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn bbands(
        &self,
        symbol: &str,
        interval: &str,
        time_period: u32,
        series_type: &str,
        cancel: &CancellationToken,
    ) -> Result<BbandsResponse, IngestError> {
        let body = self
            .indicator_request(
                "BBANDS",
                symbol,
                interval,
                &[
                    ("time_period", time_period.to_string()),
                    ("series_type", series_type.to_string()),
                ],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn stoch(
        &self,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<StochResponse, IngestError> {
        let body = self
            .indicator_request("STOCH", symbol, interval, &[], cancel)
            .await?;
        self.decode(symbol, body)
    }

    pub async fn adx(
        &self,
        symbol: &str,
        interval: &str,
        time_period: u32,
        cancel: &CancellationToken,
    ) -> Result<AdxResponse, IngestError> {
        let body = self
            .indicator_request(
                "ADX",
                symbol,
                interval,
                &[("time_period", time_period.to_string())],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn cci(
        &self,
        symbol: &str,
        interval: &str,
        time_period: u32,
        cancel: &CancellationToken,
    ) -> Result<CciResponse, IngestError> {
        let body = self
            .indicator_request(
                "CCI",
                symbol,
                interval,
                &[("time_period", time_period.to_string())],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn aroon(
        &self,
        symbol: &str,
        interval: &str,
        time_period: u32,
        cancel: &CancellationToken,
    ) -> Result<AroonResponse, IngestError> {
        let body = self
            .indicator_request(
                "AROON",
                symbol,
                interval,
                &[("time_period", time_period.to_string())],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }

    pub async fn earnings(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<EarningsResponse, IngestError> {
        let body = self
            .send_request(
                symbol,
                &[
                    ("function", "EARNINGS".to_string()),
                    ("symbol", symbol.to_string()),
                ],
                cancel,
            )
            .await?;
        self.decode(symbol, body)
    }
}
