use chrono::{DateTime, NaiveDate, Utc};
use ingest_core::{FinancialMetrics, IngestError};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::company::parse_id;

#[derive(Debug, sqlx::FromRow)]
struct MetricsRow {
    id: String,
    company_id: String,
    pe_ratio: Option<f64>,
    peg_ratio: Option<f64>,
    price_to_book: Option<f64>,
    price_to_sales: Option<f64>,
    ev_to_ebitda: Option<f64>,
    profit_margin: Option<f64>,
    operating_margin: Option<f64>,
    return_on_equity: Option<f64>,
    return_on_assets: Option<f64>,
    current_ratio: Option<f64>,
    quick_ratio: Option<f64>,
    debt_to_equity: Option<f64>,
    interest_coverage: Option<f64>,
    revenue_growth_yoy: Option<f64>,
    earnings_growth_yoy: Option<f64>,
    eps: Option<f64>,
    book_value_per_share: Option<f64>,
    revenue_per_share: Option<f64>,
    free_cash_flow_per_share: Option<f64>,
    dividend_yield: Option<f64>,
    beta: Option<f64>,
    analyst_rating: Option<String>,
    analyst_target_price: Option<f64>,
    strong_buy_count: Option<i64>,
    buy_count: Option<i64>,
    hold_count: Option<i64>,
    sell_count: Option<i64>,
    currency: Option<String>,
    data_source: String,
    reporting_date: Option<NaiveDate>,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MetricsRow> for FinancialMetrics {
    type Error = IngestError;

    fn try_from(row: MetricsRow) -> Result<Self, Self::Error> {
        Ok(FinancialMetrics {
            id: parse_id(&row.id)?,
            company_id: parse_id(&row.company_id)?,
            pe_ratio: row.pe_ratio,
            peg_ratio: row.peg_ratio,
            price_to_book: row.price_to_book,
            price_to_sales: row.price_to_sales,
            ev_to_ebitda: row.ev_to_ebitda,
            profit_margin: row.profit_margin,
            operating_margin: row.operating_margin,
            return_on_equity: row.return_on_equity,
            return_on_assets: row.return_on_assets,
            current_ratio: row.current_ratio,
            quick_ratio: row.quick_ratio,
            debt_to_equity: row.debt_to_equity,
            interest_coverage: row.interest_coverage,
            revenue_growth_yoy: row.revenue_growth_yoy,
            earnings_growth_yoy: row.earnings_growth_yoy,
            eps: row.eps,
            book_value_per_share: row.book_value_per_share,
            revenue_per_share: row.revenue_per_share,
            free_cash_flow_per_share: row.free_cash_flow_per_share,
            dividend_yield: row.dividend_yield,
            beta: row.beta,
            analyst_rating: row.analyst_rating,
            analyst_target_price: row.analyst_target_price,
            strong_buy_count: row.strong_buy_count,
            buy_count: row.buy_count,
            hold_count: row.hold_count,
            sell_count: row.sell_count,
            currency: row.currency,
            data_source: row.data_source,
            reporting_date: row.reporting_date,
            last_updated: row.last_updated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct FinancialMetricsRepository {
    pool: SqlitePool,
}

impl FinancialMetricsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// One snapshot per company: insert, or replace every metric column on
    /// conflict. `created_at` survives the replace.
    pub async fn upsert_for_company(&self, metrics: &FinancialMetrics) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO financial_metrics \
             (id, company_id, pe_ratio, peg_ratio, price_to_book, price_to_sales, ev_to_ebitda, \
              profit_margin, operating_margin, return_on_equity, return_on_assets, \
              current_ratio, quick_ratio, debt_to_equity, interest_coverage, \
              revenue_growth_yoy, earnings_growth_yoy, eps, book_value_per_share, \
              revenue_per_share, free_cash_flow_per_share, dividend_yield, beta, \
              analyst_rating, analyst_target_price, strong_buy_count, buy_count, hold_count, \
              sell_count, currency, data_source, reporting_date, last_updated, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(company_id) DO UPDATE SET \
              pe_ratio = excluded.pe_ratio, peg_ratio = excluded.peg_ratio, \
              price_to_book = excluded.price_to_book, price_to_sales = excluded.price_to_sales, \
              ev_to_ebitda = excluded.ev_to_ebitda, profit_margin = excluded.profit_margin, \
              operating_margin = excluded.operating_margin, \
              return_on_equity = excluded.return_on_equity, \
              return_on_assets = excluded.return_on_assets, \
              current_ratio = excluded.current_ratio, quick_ratio = excluded.quick_ratio, \
              debt_to_equity = excluded.debt_to_equity, \
              interest_coverage = excluded.interest_coverage, \
              revenue_growth_yoy = excluded.revenue_growth_yoy, \
              earnings_growth_yoy = excluded.earnings_growth_yoy, \
              eps = excluded.eps, book_value_per_share = excluded.book_value_per_share, \
              revenue_per_share = excluded.revenue_per_share, \
              free_cash_flow_per_share = excluded.free_cash_flow_per_share, \
              dividend_yield = excluded.dividend_yield, beta = excluded.beta, \
              analyst_rating = excluded.analyst_rating, \
              analyst_target_price = excluded.analyst_target_price, \
              strong_buy_count = excluded.strong_buy_count, buy_count = excluded.buy_count, \
              hold_count = excluded.hold_count, sell_count = excluded.sell_count, \
              currency = excluded.currency, data_source = excluded.data_source, \
              reporting_date = excluded.reporting_date, last_updated = excluded.last_updated, \
              updated_at = excluded.updated_at",
        )
        .bind(metrics.id.to_string())
        .bind(metrics.company_id.to_string())
        .bind(metrics.pe_ratio)
        .bind(metrics.peg_ratio)
        .bind(metrics.price_to_book)
        .bind(metrics.price_to_sales)
        .bind(metrics.ev_to_ebitda)
        .bind(metrics.profit_margin)
        .bind(metrics.operating_margin)
        .bind(metrics.return_on_equity)
        .bind(metrics.return_on_assets)
        .bind(metrics.current_ratio)
        .bind(metrics.quick_ratio)
        .bind(metrics.debt_to_equity)
        .bind(metrics.interest_coverage)
        .bind(metrics.revenue_growth_yoy)
        .bind(metrics.earnings_growth_yoy)
        .bind(metrics.eps)
        .bind(metrics.book_value_per_share)
        .bind(metrics.revenue_per_share)
        .bind(metrics.free_cash_flow_per_share)
        .bind(metrics.dividend_yield)
        .bind(metrics.beta)
        .bind(&metrics.analyst_rating)
        .bind(metrics.analyst_target_price)
        .bind(metrics.strong_buy_count)
        .bind(metrics.buy_count)
        .bind(metrics.hold_count)
        .bind(metrics.sell_count)
        .bind(&metrics.currency)
        .bind(&metrics.data_source)
        .bind(metrics.reporting_date)
        .bind(metrics.last_updated)
        .bind(metrics.created_at)
        .bind(metrics.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_company(
        &self,
        company_id: Uuid,
    ) -> Result<Option<FinancialMetrics>, IngestError> {
        let row: Option<MetricsRow> =
            sqlx::query_as("SELECT * FROM financial_metrics WHERE company_id = ?")
                .bind(company_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(FinancialMetrics::try_from).transpose()
    }

    pub async fn get_by_pe_ratio(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<FinancialMetrics>, IngestError> {
        let rows: Vec<MetricsRow> = sqlx::query_as(
            "SELECT * FROM financial_metrics \
             WHERE pe_ratio IS NOT NULL AND pe_ratio >= ? AND pe_ratio <= ? \
             ORDER BY pe_ratio ASC",
        )
        .bind(min)
        .bind(max)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FinancialMetrics::try_from).collect()
    }

    /// Classic value screen: cheap on earnings and book.
    pub async fn get_value_stocks(&self) -> Result<Vec<FinancialMetrics>, IngestError> {
        let rows: Vec<MetricsRow> = sqlx::query_as(
            "SELECT * FROM financial_metrics \
             WHERE pe_ratio IS NOT NULL AND pe_ratio > 0 AND pe_ratio < 15 \
               AND price_to_book IS NOT NULL AND price_to_book > 0 AND price_to_book < 2 \
             ORDER BY pe_ratio ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FinancialMetrics::try_from).collect()
    }

    pub async fn delete_by_company(&self, company_id: Uuid) -> Result<(), IngestError> {
        sqlx::query("DELETE FROM financial_metrics WHERE company_id = ?")
            .bind(company_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
