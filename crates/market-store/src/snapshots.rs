//! Repositories for the per-symbol snapshot tables: market data (quotes),
//! company profiles, news items and basic financials. Quotes, profiles and
//! financials collapse to one logical row per symbol via `upsert_by_symbol`;
//! news appends with provider-id dedup.

use chrono::{DateTime, NaiveDate, Utc};
use ingest_core::{BasicFinancials, CompanyProfile, IngestError, MarketData, NewsItem};
use sqlx::SqlitePool;

use crate::company::parse_id;

#[derive(Debug, sqlx::FromRow)]
struct MarketDataRow {
    id: String,
    symbol: String,
    price: f64,
    change: f64,
    change_percent: f64,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    previous_close: Option<f64>,
    volume: Option<i64>,
    market_timestamp: DateTime<Utc>,
    data_source: String,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MarketDataRow> for MarketData {
    type Error = IngestError;

    fn try_from(row: MarketDataRow) -> Result<Self, Self::Error> {
        Ok(MarketData {
            id: parse_id(&row.id)?,
            symbol: row.symbol,
            price: row.price,
            change: row.change,
            change_percent: row.change_percent,
            open: row.open,
            high: row.high,
            low: row.low,
            previous_close: row.previous_close,
            volume: row.volume,
            market_timestamp: row.market_timestamp,
            data_source: row.data_source,
            last_updated: row.last_updated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct MarketDataRepository {
    pool: SqlitePool,
}

impl MarketDataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_by_symbol(&self, data: &MarketData) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO market_data \
             (id, symbol, price, change, change_percent, open, high, low, previous_close, \
              volume, market_timestamp, data_source, last_updated, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(symbol) DO UPDATE SET \
              price = excluded.price, change = excluded.change, \
              change_percent = excluded.change_percent, open = excluded.open, \
              high = excluded.high, low = excluded.low, \
              previous_close = excluded.previous_close, volume = excluded.volume, \
              market_timestamp = excluded.market_timestamp, \
              data_source = excluded.data_source, last_updated = excluded.last_updated, \
              updated_at = excluded.updated_at",
        )
        .bind(data.id.to_string())
        .bind(&data.symbol)
        .bind(data.price)
        .bind(data.change)
        .bind(data.change_percent)
        .bind(data.open)
        .bind(data.high)
        .bind(data.low)
        .bind(data.previous_close)
        .bind(data.volume)
        .bind(data.market_timestamp)
        .bind(&data.data_source)
        .bind(data.last_updated)
        .bind(data.created_at)
        .bind(data.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_symbol(&self, symbol: &str) -> Result<Option<MarketData>, IngestError> {
        let row: Option<MarketDataRow> =
            sqlx::query_as("SELECT * FROM market_data WHERE symbol = ?")
                .bind(symbol.trim().to_uppercase())
                .fetch_optional(&self.pool)
                .await?;
        row.map(MarketData::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: String,
    symbol: String,
    name: Option<String>,
    country: Option<String>,
    currency: Option<String>,
    exchange: Option<String>,
    industry: Option<String>,
    website: Option<String>,
    logo_url: Option<String>,
    phone: Option<String>,
    ipo_date: Option<NaiveDate>,
    market_cap: Option<f64>,
    shares_outstanding: Option<f64>,
    data_source: String,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for CompanyProfile {
    type Error = IngestError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(CompanyProfile {
            id: parse_id(&row.id)?,
            symbol: row.symbol,
            name: row.name,
            country: row.country,
            currency: row.currency,
            exchange: row.exchange,
            industry: row.industry,
            website: row.website,
            logo_url: row.logo_url,
            phone: row.phone,
            ipo_date: row.ipo_date,
            market_cap: row.market_cap,
            shares_outstanding: row.shares_outstanding,
            data_source: row.data_source,
            last_updated: row.last_updated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct CompanyProfileRepository {
    pool: SqlitePool,
}

impl CompanyProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_by_symbol(&self, profile: &CompanyProfile) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO company_profiles \
             (id, symbol, name, country, currency, exchange, industry, website, logo_url, \
              phone, ipo_date, market_cap, shares_outstanding, data_source, last_updated, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(symbol) DO UPDATE SET \
              name = excluded.name, country = excluded.country, currency = excluded.currency, \
              exchange = excluded.exchange, industry = excluded.industry, \
              website = excluded.website, logo_url = excluded.logo_url, \
              phone = excluded.phone, ipo_date = excluded.ipo_date, \
              market_cap = excluded.market_cap, \
              shares_outstanding = excluded.shares_outstanding, \
              data_source = excluded.data_source, last_updated = excluded.last_updated, \
              updated_at = excluded.updated_at",
        )
        .bind(profile.id.to_string())
        .bind(&profile.symbol)
        .bind(&profile.name)
        .bind(&profile.country)
        .bind(&profile.currency)
        .bind(&profile.exchange)
        .bind(&profile.industry)
        .bind(&profile.website)
        .bind(&profile.logo_url)
        .bind(&profile.phone)
        .bind(profile.ipo_date)
        .bind(profile.market_cap)
        .bind(profile.shares_outstanding)
        .bind(&profile.data_source)
        .bind(profile.last_updated)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_symbol(&self, symbol: &str) -> Result<Option<CompanyProfile>, IngestError> {
        let row: Option<ProfileRow> =
            sqlx::query_as("SELECT * FROM company_profiles WHERE symbol = ?")
                .bind(symbol.trim().to_uppercase())
                .fetch_optional(&self.pool)
                .await?;
        row.map(CompanyProfile::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NewsRow {
    id: String,
    symbol: String,
    provider_id: String,
    headline: String,
    summary: Option<String>,
    url: Option<String>,
    image_url: Option<String>,
    source: Option<String>,
    category: Option<String>,
    published_at: DateTime<Utc>,
    data_source: String,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NewsRow> for NewsItem {
    type Error = IngestError;

    fn try_from(row: NewsRow) -> Result<Self, Self::Error> {
        Ok(NewsItem {
            id: parse_id(&row.id)?,
            symbol: row.symbol,
            provider_id: row.provider_id,
            headline: row.headline,
            summary: row.summary,
            url: row.url,
            image_url: row.image_url,
            source: row.source,
            category: row.category,
            published_at: row.published_at,
            data_source: row.data_source,
            last_updated: row.last_updated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct NewsRepository {
    pool: SqlitePool,
}

impl NewsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append-only with `(symbol, provider_id)` dedup.
    pub async fn bulk_insert_ignore_duplicates(
        &self,
        items: &[NewsItem],
    ) -> Result<(u64, u64), IngestError> {
        let mut inserted = 0u64;
        let mut skipped = 0u64;

        for item in items {
            let result = sqlx::query(
                "INSERT INTO news_items \
                 (id, symbol, provider_id, headline, summary, url, image_url, source, \
                  category, published_at, data_source, last_updated, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(symbol, provider_id) DO NOTHING",
            )
            .bind(item.id.to_string())
            .bind(&item.symbol)
            .bind(&item.provider_id)
            .bind(&item.headline)
            .bind(&item.summary)
            .bind(&item.url)
            .bind(&item.image_url)
            .bind(&item.source)
            .bind(&item.category)
            .bind(item.published_at)
            .bind(&item.data_source)
            .bind(item.last_updated)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }

        Ok((inserted, skipped))
    }

    pub async fn list_recent(
        &self,
        symbol: &str,
        limit: i64,
    ) -> Result<Vec<NewsItem>, IngestError> {
        let rows: Vec<NewsRow> = sqlx::query_as(
            "SELECT * FROM news_items WHERE symbol = ? ORDER BY published_at DESC LIMIT ?",
        )
        .bind(symbol.trim().to_uppercase())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NewsItem::try_from).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BasicFinancialsRow {
    id: String,
    symbol: String,
    pe_ratio: Option<f64>,
    price_to_book: Option<f64>,
    eps: Option<f64>,
    beta: Option<f64>,
    dividend_yield: Option<f64>,
    week_high_52: Option<f64>,
    week_low_52: Option<f64>,
    current_ratio: Option<f64>,
    debt_to_equity: Option<f64>,
    gross_margin: Option<f64>,
    net_margin: Option<f64>,
    data_source: String,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BasicFinancialsRow> for BasicFinancials {
    type Error = IngestError;

    fn try_from(row: BasicFinancialsRow) -> Result<Self, Self::Error> {
        Ok(BasicFinancials {
            id: parse_id(&row.id)?,
            symbol: row.symbol,
            pe_ratio: row.pe_ratio,
            price_to_book: row.price_to_book,
            eps: row.eps,
            beta: row.beta,
            dividend_yield: row.dividend_yield,
            week_high_52: row.week_high_52,
            week_low_52: row.week_low_52,
            current_ratio: row.current_ratio,
            debt_to_equity: row.debt_to_equity,
            gross_margin: row.gross_margin,
            net_margin: row.net_margin,
            data_source: row.data_source,
            last_updated: row.last_updated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct BasicFinancialsRepository {
    pool: SqlitePool,
}

impl BasicFinancialsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_by_symbol(&self, financials: &BasicFinancials) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO basic_financials \
             (id, symbol, pe_ratio, price_to_book, eps, beta, dividend_yield, week_high_52, \
              week_low_52, current_ratio, debt_to_equity, gross_margin, net_margin, \
              data_source, last_updated, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(symbol) DO UPDATE SET \
              pe_ratio = excluded.pe_ratio, price_to_book = excluded.price_to_book, \
              eps = excluded.eps, beta = excluded.beta, \
              dividend_yield = excluded.dividend_yield, \
              week_high_52 = excluded.week_high_52, week_low_52 = excluded.week_low_52, \
              current_ratio = excluded.current_ratio, \
              debt_to_equity = excluded.debt_to_equity, \
              gross_margin = excluded.gross_margin, net_margin = excluded.net_margin, \
              data_source = excluded.data_source, last_updated = excluded.last_updated, \
              updated_at = excluded.updated_at",
        )
        .bind(financials.id.to_string())
        .bind(&financials.symbol)
        .bind(financials.pe_ratio)
        .bind(financials.price_to_book)
        .bind(financials.eps)
        .bind(financials.beta)
        .bind(financials.dividend_yield)
        .bind(financials.week_high_52)
        .bind(financials.week_low_52)
        .bind(financials.current_ratio)
        .bind(financials.debt_to_equity)
        .bind(financials.gross_margin)
        .bind(financials.net_margin)
        .bind(&financials.data_source)
        .bind(financials.last_updated)
        .bind(financials.created_at)
        .bind(financials.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<Option<BasicFinancials>, IngestError> {
        let row: Option<BasicFinancialsRow> =
            sqlx::query_as("SELECT * FROM basic_financials WHERE symbol = ?")
                .bind(symbol.trim().to_uppercase())
                .fetch_optional(&self.pool)
                .await?;
        row.map(BasicFinancials::try_from).transpose()
    }
}
