//! HTTP implementation of the paginated rating-events feed. The feed is a
//! bearer-authenticated JSON API returning `{ "items": [...], "next_page": "..." }`;
//! an empty `next_page` means the final page.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_core::limiter::RateLimiter;
use ingest_core::{IngestError, RatingEvent, RatingsPage, StockDataProvider};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

const PROVIDER: &str = "ratings-feed";
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

#[derive(Clone)]
pub struct RatingsApiClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
struct PagePayload {
    #[serde(default)]
    items: Vec<ItemPayload>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemPayload {
    ticker: String,
    company: String,
    brokerage: String,
    action: String,
    #[serde(default)]
    rating_from: Option<String>,
    #[serde(default)]
    rating_to: Option<String>,
    #[serde(default)]
    target_from: Option<String>,
    #[serde(default)]
    target_to: Option<String>,
    time: String,
}

impl RatingsApiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        let rate_limit: usize = std::env::var("RATINGS_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    async fn get_page(
        &self,
        next_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PagePayload, IngestError> {
        let url = format!("{}/list", self.base_url.trim_end_matches('/'));
        let mut last_err = IngestError::provider(PROVIDER, "-", "no attempts made");

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

            let mut request = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key);
            if let Some(token) = next_token {
                request = request.query(&[("next_page", token)]);
            }

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
                    return Err(IngestError::provider(PROVIDER, "-", e.to_string()));
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                last_err = IngestError::Transient(format!("{} HTTP {}", PROVIDER, status));
                continue;
            }
            if !status.is_success() {
                return Err(IngestError::provider(
                    PROVIDER,
                    "-",
                    format!("HTTP {}", status),
                ));
            }

            return response
                .json()
                .await
                .map_err(|e| IngestError::provider(PROVIDER, "-", e.to_string()));
        }

        Err(last_err)
    }
}

fn convert_item(item: ItemPayload) -> Result<RatingEvent, IngestError> {
    let event_time = DateTime::parse_from_rfc3339(&item.time)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            IngestError::provider(
                PROVIDER,
                &item.ticker,
                format!("bad event time {:?}: {}", item.time, e),
            )
        })?;

    Ok(RatingEvent {
        ticker: item.ticker,
        company_name: item.company,
        brokerage_name: item.brokerage,
        action: item.action,
        rating_from: item.rating_from,
        rating_to: item.rating_to,
        target_from: item.target_from,
        target_to: item.target_to,
        event_time,
    })
}

#[async_trait]
impl StockDataProvider for RatingsApiClient {
    async fn fetch_page(
        &self,
        next_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RatingsPage, IngestError> {
        let payload = self.get_page(next_token, cancel).await?;

        let mut items = Vec::with_capacity(payload.items.len());
        for item in payload.items {
            match convert_item(item) {
                Ok(event) => items.push(event),
                // One malformed item must not sink the page.
                Err(e) => tracing::warn!("skipping malformed rating item: {}", e),
            }
        }

        let next_page = payload.next_page.filter(|t| !t.is_empty());
        let has_more = next_page.is_some();
        Ok(RatingsPage {
            items,
            next_page,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_wire_item() {
        let item: ItemPayload = serde_json::from_str(
            r#"{
                "ticker": "bsbr",
                "company": "Banco Santander (Brasil)",
                "brokerage": "The Goldman Sachs Group",
                "action": "upgraded by",
                "rating_from": "Sell",
                "rating_to": "Neutral",
                "target_from": "$4.20",
                "target_to": "$4.70",
                "time": "2024-03-01T00:30:05.813548892Z"
            }"#,
        )
        .unwrap();

        let event = convert_item(item).unwrap();
        assert_eq!(event.ticker, "bsbr");
        assert_eq!(event.target_to.as_deref(), Some("$4.70"));
        assert_eq!(event.event_time.timezone(), Utc);
    }

    #[test]
    fn rejects_malformed_time() {
        let item: ItemPayload = serde_json::from_str(
            r#"{"ticker":"X","company":"X Corp","brokerage":"B","action":"a","time":"yesterday"}"#,
        )
        .unwrap();
        assert!(convert_item(item).is_err());
    }
}
