//! Pure converters from provider payloads to domain entities. No I/O happens here;
//! everything is deterministic string/number munging plus validation.

pub mod fundamentals;
pub mod historical;
pub mod market;
pub mod parse;
pub mod technicals;

pub use fundamentals::{
    apply_overview_to_company, earnings_to_quarters, overview_to_financial_metrics,
};
pub use historical::time_series_to_historical;
pub use market::{
    financials_to_basic, news_to_items, profile_to_company_profile, quote_to_market_data,
};
pub use technicals::indicator_to_technicals;
