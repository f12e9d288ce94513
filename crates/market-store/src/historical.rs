use chrono::{DateTime, NaiveDate, Utc};
use ingest_core::{HistoricalData, IngestError, Period};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::company::parse_id;

#[derive(Debug, sqlx::FromRow)]
struct HistoricalRow {
    id: String,
    company_id: String,
    symbol: String,
    date: NaiveDate,
    timeframe: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    adjusted_close: Option<f64>,
    volume: i64,
    daily_return: Option<f64>,
    price_range: f64,
    gap_up: bool,
    gap_down: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HistoricalRow> for HistoricalData {
    type Error = IngestError;

    fn try_from(row: HistoricalRow) -> Result<Self, Self::Error> {
        Ok(HistoricalData {
            id: parse_id(&row.id)?,
            company_id: parse_id(&row.company_id)?,
            symbol: row.symbol,
            date: row.date,
            timeframe: Period::parse(&row.timeframe)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            adjusted_close: row.adjusted_close,
            volume: row.volume,
            daily_return: row.daily_return,
            price_range: row.price_range,
            gap_up: row.gap_up,
            gap_down: row.gap_down,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const INSERT_IGNORE_SQL: &str = "INSERT INTO historical_data \
    (id, company_id, symbol, date, timeframe, open, high, low, close, adjusted_close, \
     volume, daily_return, price_range, gap_up, gap_down, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(company_id, date, timeframe) DO NOTHING";

#[derive(Clone)]
pub struct HistoricalDataRepository {
    pool: SqlitePool,
}

impl HistoricalDataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bulk insert with per-row duplicate tolerance. Historical bars are
    /// immutable observations, so replays simply skip.
    pub async fn bulk_insert_ignore_duplicates(
        &self,
        rows: &[HistoricalData],
    ) -> Result<(u64, u64), IngestError> {
        let mut inserted = 0u64;
        let mut skipped = 0u64;

        for row in rows {
            row.validate()?;
            let result = sqlx::query(INSERT_IGNORE_SQL)
                .bind(row.id.to_string())
                .bind(row.company_id.to_string())
                .bind(&row.symbol)
                .bind(row.date)
                .bind(row.timeframe.as_str())
                .bind(row.open)
                .bind(row.high)
                .bind(row.low)
                .bind(row.close)
                .bind(row.adjusted_close)
                .bind(row.volume)
                .bind(row.daily_return)
                .bind(row.price_range)
                .bind(row.gap_up)
                .bind(row.gap_down)
                .bind(row.created_at)
                .bind(row.updated_at)
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

    pub async fn get_by_symbol_and_date(
        &self,
        symbol: &str,
        date: NaiveDate,
        timeframe: Period,
    ) -> Result<Option<HistoricalData>, IngestError> {
        let row: Option<HistoricalRow> = sqlx::query_as(
            "SELECT * FROM historical_data WHERE symbol = ? AND date = ? AND timeframe = ?",
        )
        .bind(symbol.trim().to_uppercase())
        .bind(date)
        .bind(timeframe.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(HistoricalData::try_from).transpose()
    }

    pub async fn list_range(
        &self,
        company_id: Uuid,
        timeframe: Period,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HistoricalData>, IngestError> {
        let rows: Vec<HistoricalRow> = sqlx::query_as(
            "SELECT * FROM historical_data \
             WHERE company_id = ? AND timeframe = ? AND date >= ? AND date <= ? \
             ORDER BY date ASC",
        )
        .bind(company_id.to_string())
        .bind(timeframe.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HistoricalData::try_from).collect()
    }

    /// Most recent stored bar, used by the freshness gate.
    pub async fn latest_for_company(
        &self,
        company_id: Uuid,
        timeframe: Period,
    ) -> Result<Option<HistoricalData>, IngestError> {
        let row: Option<HistoricalRow> = sqlx::query_as(
            "SELECT * FROM historical_data WHERE company_id = ? AND timeframe = ? \
             ORDER BY date DESC LIMIT 1",
        )
        .bind(company_id.to_string())
        .bind(timeframe.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(HistoricalData::try_from).transpose()
    }

    pub async fn count(&self) -> Result<i64, IngestError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM historical_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
