use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How old a stored financial snapshot may be before a refresh hits the provider.
pub const FINANCIALS_STALENESS_HOURS: i64 = 24;

/// One fundamental snapshot per company, replaced on every refresh.
/// Owned by the company row (cascade delete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub id: Uuid,
    pub company_id: Uuid,

    // Valuation
    pub pe_ratio: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub ev_to_ebitda: Option<f64>,

    // Profitability
    pub profit_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub return_on_assets: Option<f64>,

    // Health
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub interest_coverage: Option<f64>,

    // Growth
    pub revenue_growth_yoy: Option<f64>,
    pub earnings_growth_yoy: Option<f64>,

    // Per share
    pub eps: Option<f64>,
    pub book_value_per_share: Option<f64>,
    pub revenue_per_share: Option<f64>,
    pub free_cash_flow_per_share: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,

    // Analyst consensus
    pub analyst_rating: Option<String>,
    pub analyst_target_price: Option<f64>,
    pub strong_buy_count: Option<i64>,
    pub buy_count: Option<i64>,
    pub hold_count: Option<i64>,
    pub sell_count: Option<i64>,

    pub currency: Option<String>,
    pub data_source: String,
    pub reporting_date: Option<NaiveDate>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FinancialMetrics {
    pub fn new(company_id: Uuid, data_source: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company_id,
            pe_ratio: None,
            peg_ratio: None,
            price_to_book: None,
            price_to_sales: None,
            ev_to_ebitda: None,
            profit_margin: None,
            operating_margin: None,
            return_on_equity: None,
            return_on_assets: None,
            current_ratio: None,
            quick_ratio: None,
            debt_to_equity: None,
            interest_coverage: None,
            revenue_growth_yoy: None,
            earnings_growth_yoy: None,
            eps: None,
            book_value_per_share: None,
            revenue_per_share: None,
            free_cash_flow_per_share: None,
            dividend_yield: None,
            beta: None,
            analyst_rating: None,
            analyst_target_price: None,
            strong_buy_count: None,
            buy_count: None,
            hold_count: None,
            sell_count: None,
            currency: None,
            data_source: data_source.to_string(),
            reporting_date: None,
            last_updated: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > chrono::Duration::hours(FINANCIALS_STALENESS_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_window_is_24h() {
        let mut metrics = FinancialMetrics::new(Uuid::new_v4(), "alphavantage");
        let now = Utc::now();
        metrics.last_updated = now - chrono::Duration::hours(23);
        assert!(!metrics.is_stale(now));
        metrics.last_updated = now - chrono::Duration::hours(25);
        assert!(metrics.is_stale(now));
    }
}
