use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quotes go stale fast; everything else in this module uses a daily window.
pub const QUOTE_STALENESS_MINUTES: i64 = 5;
pub const SNAPSHOT_STALENESS_HOURS: i64 = 24;

/// Latest quote snapshot for a symbol, one logical row per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub id: Uuid,
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    pub volume: Option<i64>,
    pub market_timestamp: DateTime<Utc>,
    pub data_source: String,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MarketData {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > chrono::Duration::minutes(QUOTE_STALENESS_MINUTES)
    }
}

/// Provider-sourced company profile snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: Uuid,
    pub symbol: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub phone: Option<String>,
    pub ipo_date: Option<NaiveDate>,
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub data_source: String,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompanyProfile {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > chrono::Duration::hours(SNAPSHOT_STALENESS_HOURS)
    }
}

/// A single news article tied to a symbol, deduplicated by provider id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: Uuid,
    pub symbol: String,
    pub provider_id: String,
    pub headline: String,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub published_at: DateTime<Utc>,
    pub data_source: String,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key ratio snapshot from the financials endpoint, one row per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicFinancials {
    pub id: Uuid,
    pub symbol: String,
    pub pe_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub eps: Option<f64>,
    pub beta: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub week_high_52: Option<f64>,
    pub week_low_52: Option<f64>,
    pub current_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub gross_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub data_source: String,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BasicFinancials {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > chrono::Duration::hours(SNAPSHOT_STALENESS_HOURS)
    }
}

/// Reported quarter from the earnings calendar. Computed, not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsQuarter {
    pub symbol: String,
    pub fiscal_date_ending: NaiveDate,
    pub reported_date: Option<NaiveDate>,
    pub reported_eps: Option<f64>,
    pub estimated_eps: Option<f64>,
    pub surprise: Option<f64>,
    pub surprise_percentage: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_staleness_is_five_minutes() {
        let now = Utc::now();
        let mut quote = MarketData {
            id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            price: 190.0,
            change: 1.5,
            change_percent: 0.8,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            volume: None,
            market_timestamp: now,
            data_source: "finnhub".to_string(),
            last_updated: now - chrono::Duration::minutes(4),
            created_at: now,
            updated_at: now,
        };
        assert!(!quote.is_stale(now));
        quote.last_updated = now - chrono::Duration::minutes(6);
        assert!(quote.is_stale(now));
    }
}
