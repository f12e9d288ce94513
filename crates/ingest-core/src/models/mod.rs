mod brokerage;
mod company;
mod historical;
mod metrics;
mod rating;
mod snapshots;
mod technicals;

pub use brokerage::Brokerage;
pub use company::Company;
pub use historical::{HistoricalData, GAP_THRESHOLD, HISTORICAL_STALENESS_HOURS};
pub use metrics::{FinancialMetrics, FINANCIALS_STALENESS_HOURS};
pub use rating::StockRating;
pub use snapshots::{
    BasicFinancials, CompanyProfile, EarningsQuarter, MarketData, NewsItem,
    QUOTE_STALENESS_MINUTES, SNAPSHOT_STALENESS_HOURS,
};
pub use technicals::{
    IndicatorKind, Period, SignalLevel, TechnicalIndicators, TECHNICALS_STALENESS_HOURS,
};

/// Title-case a free-form sector/industry string: `"information technology"`
/// becomes `"Information Technology"`. Idempotent.
pub fn title_case(raw: &str) -> String {
    raw.trim()
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_is_idempotent() {
        let once = title_case("information  technology");
        assert_eq!(once, "Information Technology");
        assert_eq!(title_case(&once), once);
    }

    #[test]
    fn title_case_handles_mixed_input() {
        assert_eq!(title_case("HEALTH CARE"), "Health Care");
        assert_eq!(title_case(""), "");
    }
}
