//! Overview and earnings payloads into fundamental entities.

use alphavantage_client::{CompanyOverview, EarningsResponse};
use chrono::Utc;
use ingest_core::{Company, EarningsQuarter, FinancialMetrics};
use uuid::Uuid;

use crate::parse::{parse_field, parse_field_i64, parse_utc_date};

/// Map an Alpha Vantage overview to a fresh metrics snapshot.
pub fn overview_to_financial_metrics(
    overview: &CompanyOverview,
    company_id: Uuid,
) -> FinancialMetrics {
    let mut metrics = FinancialMetrics::new(company_id, "alphavantage");

    metrics.pe_ratio = parse_field(&overview.pe_ratio);
    metrics.peg_ratio = parse_field(&overview.peg_ratio);
    metrics.price_to_book = parse_field(&overview.price_to_book);
    metrics.price_to_sales = parse_field(&overview.price_to_sales);
    metrics.ev_to_ebitda = parse_field(&overview.ev_to_ebitda);

    metrics.profit_margin = parse_field(&overview.profit_margin);
    metrics.operating_margin = parse_field(&overview.operating_margin);
    metrics.return_on_equity = parse_field(&overview.return_on_equity);
    metrics.return_on_assets = parse_field(&overview.return_on_assets);

    metrics.revenue_growth_yoy = parse_field(&overview.revenue_growth_yoy);
    metrics.earnings_growth_yoy = parse_field(&overview.earnings_growth_yoy);

    metrics.eps = parse_field(&overview.eps);
    metrics.book_value_per_share = parse_field(&overview.book_value);
    metrics.revenue_per_share = parse_field(&overview.revenue_per_share);
    metrics.dividend_yield = parse_field(&overview.dividend_yield);
    metrics.beta = parse_field(&overview.beta);

    metrics.analyst_target_price = parse_field(&overview.analyst_target_price);
    metrics.strong_buy_count = parse_field_i64(&overview.analyst_strong_buy);
    metrics.buy_count = parse_field_i64(&overview.analyst_buy);
    metrics.hold_count = parse_field_i64(&overview.analyst_hold);
    metrics.sell_count = parse_field_i64(&overview.analyst_sell);

    metrics.currency = overview.currency.clone();
    metrics.reporting_date = overview
        .latest_quarter
        .as_deref()
        .and_then(parse_utc_date);
    metrics.last_updated = Utc::now();

    metrics
}

/// Fold descriptive overview fields into an existing company row.
/// Only fields the overview actually carries are touched.
pub fn apply_overview_to_company(overview: &CompanyOverview, company: &mut Company) {
    if let Some(name) = &overview.name {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            company.name = trimmed.to_string();
        }
    }
    company.set_sector(overview.sector.as_deref());
    if overview.exchange.is_some() {
        company.exchange = overview.exchange.clone();
    }
    if overview.currency.is_some() {
        company.currency = overview.currency.clone();
    }
    if let Some(cap) = parse_field(&overview.market_capitalization) {
        if cap >= 0.0 {
            company.market_cap = Some(cap);
        }
    }
    if let Some(high) = parse_field(&overview.week_high_52) {
        company.week_high_52 = Some(high);
    }
    if let Some(low) = parse_field(&overview.week_low_52) {
        company.week_low_52 = Some(low);
    }
    company.updated_at = Utc::now();
}

/// Earnings calendar payload into reported quarters, newest first, unparseable
/// rows dropped.
pub fn earnings_to_quarters(earnings: &EarningsResponse) -> Vec<EarningsQuarter> {
    let mut quarters: Vec<EarningsQuarter> = earnings
        .quarterly_earnings
        .iter()
        .filter_map(|q| {
            let fiscal_date_ending = parse_utc_date(&q.fiscal_date_ending)?;
            Some(EarningsQuarter {
                symbol: earnings.symbol.clone(),
                fiscal_date_ending,
                reported_date: q.reported_date.as_deref().and_then(parse_utc_date),
                reported_eps: parse_field(&q.reported_eps),
                estimated_eps: parse_field(&q.estimated_eps),
                surprise: parse_field(&q.surprise),
                surprise_percentage: parse_field(&q.surprise_percentage),
            })
        })
        .collect();
    quarters.sort_by(|a, b| b.fiscal_date_ending.cmp(&a.fiscal_date_ending));
    quarters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_overview() -> CompanyOverview {
        serde_json::from_str(
            r#"{
                "Symbol": "IBM",
                "Name": "International Business Machines",
                "Sector": "TECHNOLOGY",
                "Exchange": "NYSE",
                "Currency": "USD",
                "MarketCapitalization": "168,553,415,000",
                "PERatio": "22.96",
                "PEGRatio": "None",
                "EPS": "8.23",
                "DividendYield": "0.0366",
                "AnalystTargetPrice": "181.5",
                "AnalystRatingBuy": "9",
                "AnalystRatingHold": "8",
                "AnalystRatingSell": "2",
                "LatestQuarter": "2023-12-31",
                "52WeekHigh": "199.18",
                "52WeekLow": "130.68"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn overview_maps_and_nulls_sentinels() {
        let metrics = overview_to_financial_metrics(&sample_overview(), Uuid::new_v4());
        assert_eq!(metrics.pe_ratio, Some(22.96));
        assert_eq!(metrics.peg_ratio, None); // "None" sentinel
        assert_eq!(metrics.buy_count, Some(9));
        assert_eq!(
            metrics.reporting_date,
            Some(chrono::NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
        );
        assert_eq!(metrics.data_source, "alphavantage");
    }

    #[test]
    fn overview_enriches_company() {
        let mut company = ingest_core::Company::new("IBM", "ibm placeholder").unwrap();
        apply_overview_to_company(&sample_overview(), &mut company);
        assert_eq!(company.name, "International Business Machines");
        assert_eq!(company.sector.as_deref(), Some("Technology"));
        assert_eq!(company.market_cap, Some(168_553_415_000.0));
        assert_eq!(company.week_low_52, Some(130.68));
    }

    #[test]
    fn earnings_sorted_newest_first() {
        let earnings: EarningsResponse = serde_json::from_str(
            r#"{
                "symbol": "IBM",
                "quarterlyEarnings": [
                    {"fiscalDateEnding": "2023-09-30", "reportedEPS": "2.20"},
                    {"fiscalDateEnding": "2023-12-31", "reportedEPS": "3.87", "estimatedEPS": "3.78"},
                    {"fiscalDateEnding": "not-a-date", "reportedEPS": "1.00"}
                ]
            }"#,
        )
        .unwrap();
        let quarters = earnings_to_quarters(&earnings);
        assert_eq!(quarters.len(), 2);
        assert_eq!(
            quarters[0].fiscal_date_ending,
            chrono::NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
        assert_eq!(quarters[0].estimated_eps, Some(3.78));
    }
}
