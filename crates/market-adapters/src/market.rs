//! Finnhub payloads into per-symbol snapshot entities.

use chrono::{DateTime, Utc};
use finnhub_client::{BasicFinancialsResponse, NewsArticle, ProfileResponse, QuoteResponse};
use ingest_core::{BasicFinancials, CompanyProfile, IngestError, MarketData, NewsItem};
use uuid::Uuid;

use crate::parse::parse_utc_date;

/// A quote with no price is a provider hiccup, not a snapshot.
pub fn quote_to_market_data(
    quote: &QuoteResponse,
    symbol: &str,
) -> Result<MarketData, IngestError> {
    if quote.current_price <= 0.0 {
        return Err(IngestError::Validation(format!(
            "{}: quote price must be positive",
            symbol
        )));
    }

    let now = Utc::now();
    let market_timestamp = DateTime::<Utc>::from_timestamp(quote.timestamp, 0).unwrap_or(now);

    Ok(MarketData {
        id: Uuid::new_v4(),
        symbol: symbol.trim().to_uppercase(),
        price: quote.current_price,
        change: quote.change.unwrap_or(0.0),
        change_percent: quote.change_percent.unwrap_or(0.0),
        open: quote.open,
        high: quote.high,
        low: quote.low,
        previous_close: quote.previous_close,
        volume: None,
        market_timestamp,
        data_source: "finnhub".to_string(),
        last_updated: now,
        created_at: now,
        updated_at: now,
    })
}

pub fn profile_to_company_profile(profile: &ProfileResponse, symbol: &str) -> CompanyProfile {
    let now = Utc::now();
    CompanyProfile {
        id: Uuid::new_v4(),
        symbol: symbol.trim().to_uppercase(),
        name: profile.name.clone(),
        country: profile.country.clone(),
        currency: profile.currency.clone(),
        exchange: profile.exchange.clone(),
        industry: profile.industry.clone(),
        website: profile.weburl.clone(),
        logo_url: profile.logo.clone(),
        phone: profile.phone.clone(),
        ipo_date: profile.ipo.as_deref().and_then(parse_utc_date),
        market_cap: profile.market_capitalization,
        shares_outstanding: profile.share_outstanding,
        data_source: "finnhub".to_string(),
        last_updated: now,
        created_at: now,
        updated_at: now,
    }
}

/// Articles with no headline or an unusable timestamp are dropped.
pub fn news_to_items(articles: &[NewsArticle], symbol: &str) -> Vec<NewsItem> {
    let now = Utc::now();
    articles
        .iter()
        .filter_map(|article| {
            if article.headline.trim().is_empty() {
                return None;
            }
            let published_at = DateTime::<Utc>::from_timestamp(article.datetime, 0)?;
            Some(NewsItem {
                id: Uuid::new_v4(),
                symbol: symbol.trim().to_uppercase(),
                provider_id: article.id.to_string(),
                headline: article.headline.clone(),
                summary: article.summary.clone().filter(|s| !s.is_empty()),
                url: article.url.clone(),
                image_url: article.image.clone().filter(|s| !s.is_empty()),
                source: article.source.clone(),
                category: article.category.clone(),
                published_at,
                data_source: "finnhub".to_string(),
                last_updated: now,
                created_at: now,
                updated_at: now,
            })
        })
        .collect()
}

pub fn financials_to_basic(resp: &BasicFinancialsResponse, symbol: &str) -> BasicFinancials {
    let now = Utc::now();
    BasicFinancials {
        id: Uuid::new_v4(),
        symbol: symbol.trim().to_uppercase(),
        pe_ratio: resp.metric_f64("peBasicExclExtraTTM"),
        price_to_book: resp.metric_f64("pbQuarterly"),
        eps: resp.metric_f64("epsBasicExclExtraItemsTTM"),
        beta: resp.metric_f64("beta"),
        dividend_yield: resp.metric_f64("dividendYieldIndicatedAnnual"),
        week_high_52: resp.metric_f64("52WeekHigh"),
        week_low_52: resp.metric_f64("52WeekLow"),
        current_ratio: resp.metric_f64("currentRatioQuarterly"),
        debt_to_equity: resp.metric_f64("totalDebt/totalEquityQuarterly"),
        gross_margin: resp.metric_f64("grossMarginTTM"),
        net_margin: resp.metric_f64("netProfitMarginTTM"),
        data_source: "finnhub".to_string(),
        last_updated: now,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_with_zero_price_is_rejected() {
        let quote: QuoteResponse =
            serde_json::from_str(r#"{"c":0.0,"t":1709312400}"#).unwrap();
        let err = quote_to_market_data(&quote, "AAPL").unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn quote_maps_to_market_data() {
        let quote: QuoteResponse = serde_json::from_str(
            r#"{"c":190.12,"d":1.32,"dp":0.7,"h":191.0,"l":188.5,"o":189.0,"pc":188.8,"t":1709312400}"#,
        )
        .unwrap();
        let data = quote_to_market_data(&quote, "aapl").unwrap();
        assert_eq!(data.symbol, "AAPL");
        assert_eq!(data.market_timestamp.timestamp(), 1709312400);
        assert_eq!(data.data_source, "finnhub");
    }

    #[test]
    fn news_drops_headline_less_articles() {
        let articles: Vec<NewsArticle> = serde_json::from_str(
            r#"[
                {"id":1,"datetime":1709312400,"headline":"Apple ships","summary":"","image":""},
                {"id":2,"datetime":1709312400,"headline":"   "}
            ]"#,
        )
        .unwrap();
        let items = news_to_items(&articles, "AAPL");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].provider_id, "1");
        assert_eq!(items[0].summary, None);
    }

    #[test]
    fn basic_financials_pull_known_metrics() {
        let resp: BasicFinancialsResponse = serde_json::from_str(
            r#"{"symbol":"AAPL","metric":{"peBasicExclExtraTTM":28.5,"52WeekHigh":199.6,"beta":1.29}}"#,
        )
        .unwrap();
        let basic = financials_to_basic(&resp, "AAPL");
        assert_eq!(basic.pe_ratio, Some(28.5));
        assert_eq!(basic.week_high_52, Some(199.6));
        assert_eq!(basic.price_to_book, None);
    }
}
