use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;

/// One rating event as delivered by the ratings feed. Target prices arrive as
/// display strings (`"$150.00"`); adapters parse them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingEvent {
    pub ticker: String,
    pub company_name: String,
    pub brokerage_name: String,
    pub action: String,
    pub rating_from: Option<String>,
    pub rating_to: Option<String>,
    pub target_from: Option<String>,
    pub target_to: Option<String>,
    pub event_time: DateTime<Utc>,
}

/// A page of rating events plus the continuation token.
#[derive(Debug, Clone, Default)]
pub struct RatingsPage {
    pub items: Vec<RatingEvent>,
    pub next_page: Option<String>,
    pub has_more: bool,
}

/// Source of paginated rating events. The population engine depends only on
/// this trait; production wires in the HTTP client, tests wire in scripted
/// pages.
#[async_trait]
pub trait StockDataProvider: Send + Sync {
    async fn fetch_page(
        &self,
        next_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RatingsPage, IngestError>;
}
