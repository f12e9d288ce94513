use chrono::{DateTime, Utc};
use ingest_core::{Brokerage, Company, IngestError, StockRating};
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::company::parse_id;

#[derive(Debug, sqlx::FromRow)]
struct RatingRow {
    id: String,
    company_id: String,
    brokerage_id: String,
    action: String,
    rating_from: Option<String>,
    rating_to: Option<String>,
    target_from: Option<f64>,
    target_to: Option<f64>,
    event_time: DateTime<Utc>,
    source: String,
    is_processed: bool,
    raw_payload: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RatingRow> for StockRating {
    type Error = IngestError;

    fn try_from(row: RatingRow) -> Result<Self, Self::Error> {
        Ok(StockRating {
            id: parse_id(&row.id)?,
            company_id: parse_id(&row.company_id)?,
            brokerage_id: parse_id(&row.brokerage_id)?,
            action: row.action,
            rating_from: row.rating_from,
            rating_to: row.rating_to,
            target_from: row.target_from,
            target_to: row.target_to,
            event_time: row.event_time,
            source: row.source,
            is_processed: row.is_processed,
            raw_payload: row.raw_payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A rating with its dimensions eagerly loaded. Either side may be gone when
/// the dimension was soft-deleted under the fact.
#[derive(Debug, Clone)]
pub struct RatingWithRelations {
    pub rating: StockRating,
    pub company: Option<Company>,
    pub brokerage: Option<Brokerage>,
}

const INSERT_IGNORE_SQL: &str = "INSERT INTO stock_ratings \
    (id, company_id, brokerage_id, action, rating_from, rating_to, target_from, target_to, \
     event_time, source, is_processed, raw_payload, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(company_id, brokerage_id, event_time) DO NOTHING";

#[derive(Clone)]
pub struct StockRatingRepository {
    pool: SqlitePool,
}

impl StockRatingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, rating: &StockRating) -> Result<(), IngestError> {
        rating.validate()?;
        let result = sqlx::query(INSERT_IGNORE_SQL)
            .bind(rating.id.to_string())
            .bind(rating.company_id.to_string())
            .bind(rating.brokerage_id.to_string())
            .bind(&rating.action)
            .bind(&rating.rating_from)
            .bind(&rating.rating_to)
            .bind(rating.target_from)
            .bind(rating.target_to)
            .bind(rating.event_time)
            .bind(&rating.source)
            .bind(rating.is_processed)
            .bind(&rating.raw_payload)
            .bind(rating.created_at)
            .bind(rating.updated_at)
            .execute(&self.pool)
            .await?;
        // Single-row path surfaces the conflict instead of counting a skip.
        if result.rows_affected() == 0 {
            return Err(IngestError::Conflict(format!(
                "rating ({}, {}, {}) already exists",
                rating.company_id, rating.brokerage_id, rating.event_time
            )));
        }
        Ok(())
    }

    /// Per-row conflict-tolerant bulk insert. Returns `(inserted, skipped)`;
    /// a duplicate row counts as skipped and never aborts the batch.
    pub async fn bulk_insert_ignore_duplicates_with_tx(
        conn: &mut SqliteConnection,
        ratings: &[StockRating],
    ) -> Result<(u64, u64), IngestError> {
        let mut inserted = 0u64;
        let mut skipped = 0u64;

        for rating in ratings {
            rating.validate()?;
            let result = sqlx::query(INSERT_IGNORE_SQL)
                .bind(rating.id.to_string())
                .bind(rating.company_id.to_string())
                .bind(rating.brokerage_id.to_string())
                .bind(&rating.action)
                .bind(&rating.rating_from)
                .bind(&rating.rating_to)
                .bind(rating.target_from)
                .bind(rating.target_to)
                .bind(rating.event_time)
                .bind(&rating.source)
                .bind(rating.is_processed)
                .bind(&rating.raw_payload)
                .bind(rating.created_at)
                .bind(rating.updated_at)
                .execute(&mut *conn)
                .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }

        Ok((inserted, skipped))
    }

    pub async fn get(&self, id: Uuid) -> Result<StockRating, IngestError> {
        let row: Option<RatingRow> = sqlx::query_as("SELECT * FROM stock_ratings WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(StockRating::try_from)
            .transpose()?
            .ok_or_else(|| IngestError::NotFound(format!("stock rating {}", id)))
    }

    /// The only mutation allowed on a persisted rating.
    pub async fn mark_processed(&self, id: Uuid, processed: bool) -> Result<(), IngestError> {
        let result = sqlx::query(
            "UPDATE stock_ratings SET is_processed = ?, updated_at = ? WHERE id = ?",
        )
        .bind(processed)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(IngestError::NotFound(format!("stock rating {}", id)));
        }
        Ok(())
    }

    pub async fn list_by_company(
        &self,
        company_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StockRating>, IngestError> {
        let rows: Vec<RatingRow> = sqlx::query_as(
            "SELECT * FROM stock_ratings WHERE company_id = ? \
             ORDER BY event_time DESC LIMIT ?",
        )
        .bind(company_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StockRating::try_from).collect()
    }

    pub async fn list_unprocessed(&self, limit: i64) -> Result<Vec<StockRating>, IngestError> {
        let rows: Vec<RatingRow> = sqlx::query_as(
            "SELECT * FROM stock_ratings WHERE is_processed = 0 \
             ORDER BY event_time ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StockRating::try_from).collect()
    }

    /// Eagerly load both dimensions for a page of recent ratings in one query.
    pub async fn list_with_relations(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RatingWithRelations>, IngestError> {
        #[derive(Debug, sqlx::FromRow)]
        struct JoinedRow {
            // rating
            id: String,
            company_id: String,
            brokerage_id: String,
            action: String,
            rating_from: Option<String>,
            rating_to: Option<String>,
            target_from: Option<f64>,
            target_to: Option<f64>,
            event_time: DateTime<Utc>,
            source: String,
            is_processed: bool,
            raw_payload: Option<String>,
            created_at: DateTime<Utc>,
            updated_at: DateTime<Utc>,
            // company (nullable under LEFT JOIN)
            c_id: Option<String>,
            c_ticker: Option<String>,
            c_name: Option<String>,
            c_is_active: Option<bool>,
            c_created_at: Option<DateTime<Utc>>,
            c_updated_at: Option<DateTime<Utc>>,
            c_deleted_at: Option<DateTime<Utc>>,
            // brokerage
            b_id: Option<String>,
            b_name: Option<String>,
            b_website: Option<String>,
            b_country: Option<String>,
            b_is_active: Option<bool>,
            b_created_at: Option<DateTime<Utc>>,
            b_updated_at: Option<DateTime<Utc>>,
            b_deleted_at: Option<DateTime<Utc>>,
        }

        let rows: Vec<JoinedRow> = sqlx::query_as(
            "SELECT r.*, \
                    c.id AS c_id, c.ticker AS c_ticker, c.name AS c_name, \
                    c.is_active AS c_is_active, c.created_at AS c_created_at, \
                    c.updated_at AS c_updated_at, c.deleted_at AS c_deleted_at, \
                    b.id AS b_id, b.name AS b_name, b.website AS b_website, \
                    b.country AS b_country, b.is_active AS b_is_active, \
                    b.created_at AS b_created_at, b.updated_at AS b_updated_at, \
                    b.deleted_at AS b_deleted_at \
             FROM stock_ratings r \
             LEFT JOIN companies c ON c.id = r.company_id AND c.deleted_at IS NULL \
             LEFT JOIN brokerages b ON b.id = r.brokerage_id AND b.deleted_at IS NULL \
             ORDER BY r.event_time DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let company = match (row.c_id, row.c_ticker, row.c_name) {
                    (Some(id), Some(ticker), Some(name)) => Some(Company {
                        id: parse_id(&id)?,
                        ticker,
                        name,
                        sector: None,
                        exchange: None,
                        market_cap: None,
                        logo_url: None,
                        currency: None,
                        ipo_date: None,
                        employee_count: None,
                        week_high_52: None,
                        week_low_52: None,
                        is_active: row.c_is_active.unwrap_or(false),
                        created_at: row.c_created_at.unwrap_or(row.created_at),
                        updated_at: row.c_updated_at.unwrap_or(row.updated_at),
                        deleted_at: row.c_deleted_at,
                    }),
                    _ => None,
                };
                let brokerage = match (row.b_id, row.b_name) {
                    (Some(id), Some(name)) => Some(Brokerage {
                        id: parse_id(&id)?,
                        name,
                        website: row.b_website,
                        country: row.b_country,
                        is_active: row.b_is_active.unwrap_or(false),
                        created_at: row.b_created_at.unwrap_or(row.created_at),
                        updated_at: row.b_updated_at.unwrap_or(row.updated_at),
                        deleted_at: row.b_deleted_at,
                    }),
                    _ => None,
                };
                Ok(RatingWithRelations {
                    rating: StockRating {
                        id: parse_id(&row.id)?,
                        company_id: parse_id(&row.company_id)?,
                        brokerage_id: parse_id(&row.brokerage_id)?,
                        action: row.action,
                        rating_from: row.rating_from,
                        rating_to: row.rating_to,
                        target_from: row.target_from,
                        target_to: row.target_to,
                        event_time: row.event_time,
                        source: row.source,
                        is_processed: row.is_processed,
                        raw_payload: row.raw_payload,
                        created_at: row.created_at,
                        updated_at: row.updated_at,
                    },
                    company,
                    brokerage,
                })
            })
            .collect()
    }

    /// Single-row preload of both dimensions.
    pub async fn get_with_relations(&self, id: Uuid) -> Result<RatingWithRelations, IngestError> {
        let rating = self.get(id).await?;
        let company = self
            .get_company_if_live(rating.company_id)
            .await?;
        let brokerage = self
            .get_brokerage_if_live(rating.brokerage_id)
            .await?;
        Ok(RatingWithRelations {
            rating,
            company,
            brokerage,
        })
    }

    async fn get_company_if_live(&self, id: Uuid) -> Result<Option<Company>, IngestError> {
        let row: Option<crate::company::CompanyRow> =
            sqlx::query_as("SELECT * FROM companies WHERE id = ? AND deleted_at IS NULL")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Company::try_from).transpose()
    }

    async fn get_brokerage_if_live(&self, id: Uuid) -> Result<Option<Brokerage>, IngestError> {
        let row: Option<crate::brokerage::BrokerageRow> =
            sqlx::query_as("SELECT * FROM brokerages WHERE id = ? AND deleted_at IS NULL")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Brokerage::try_from).transpose()
    }

    pub async fn count(&self) -> Result<i64, IngestError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_ratings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_processed(&self) -> Result<(i64, i64), IngestError> {
        let processed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_ratings WHERE is_processed = 1")
                .fetch_one(&self.pool)
                .await?;
        let unprocessed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_ratings WHERE is_processed = 0")
                .fetch_one(&self.pool)
                .await?;
        Ok((processed, unprocessed))
    }
}
