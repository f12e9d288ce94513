use chrono::{DateTime, Utc};
use ingest_core::{Brokerage, IngestError};
use sqlx::sqlite::SqliteConnection;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::company::parse_id;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BrokerageRow {
    id: String,
    name: String,
    website: Option<String>,
    country: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<BrokerageRow> for Brokerage {
    type Error = IngestError;

    fn try_from(row: BrokerageRow) -> Result<Self, Self::Error> {
        Ok(Brokerage {
            id: parse_id(&row.id)?,
            name: row.name,
            website: row.website,
            country: row.country,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

const INSERT_IGNORE_SQL: &str = "INSERT INTO brokerages \
    (id, name, website, country, is_active, created_at, updated_at, deleted_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(name) DO NOTHING";

#[derive(Clone)]
pub struct BrokerageRepository {
    pool: SqlitePool,
}

impl BrokerageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, brokerage: &Brokerage) -> Result<(), IngestError> {
        brokerage.validate()?;
        sqlx::query(
            "INSERT INTO brokerages \
             (id, name, website, country, is_active, created_at, updated_at, deleted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(brokerage.id.to_string())
        .bind(&brokerage.name)
        .bind(&brokerage.website)
        .bind(&brokerage.country)
        .bind(brokerage.is_active)
        .bind(brokerage.created_at)
        .bind(brokerage.updated_at)
        .bind(brokerage.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert-or-no-op on the name; see the company variant for semantics.
    pub async fn create_ignore_duplicates_with_tx(
        conn: &mut SqliteConnection,
        brokerage: &Brokerage,
    ) -> Result<(Brokerage, bool), IngestError> {
        brokerage.validate()?;
        let result = sqlx::query(INSERT_IGNORE_SQL)
            .bind(brokerage.id.to_string())
            .bind(&brokerage.name)
            .bind(&brokerage.website)
            .bind(&brokerage.country)
            .bind(brokerage.is_active)
            .bind(brokerage.created_at)
            .bind(brokerage.updated_at)
            .bind(brokerage.deleted_at)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() > 0 {
            return Ok((brokerage.clone(), true));
        }

        let existing = Self::fetch_by_name(conn, &brokerage.name)
            .await?
            .ok_or_else(|| {
                IngestError::Database(format!(
                    "conflict on brokerage {} but canonical row missing",
                    brokerage.name
                ))
            })?;
        Ok((existing, false))
    }

    async fn fetch_by_name<'e, E>(executor: E, name: &str) -> Result<Option<Brokerage>, IngestError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: Option<BrokerageRow> =
            sqlx::query_as("SELECT * FROM brokerages WHERE name = ?")
                .bind(name.trim())
                .fetch_optional(executor)
                .await?;
        row.map(Brokerage::try_from).transpose()
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Brokerage>, IngestError> {
        Self::fetch_by_name(&self.pool, name).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Brokerage, IngestError> {
        let row: Option<BrokerageRow> = sqlx::query_as("SELECT * FROM brokerages WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Brokerage::try_from)
            .transpose()?
            .ok_or_else(|| IngestError::NotFound(format!("brokerage {}", id)))
    }

    pub async fn update(&self, brokerage: &Brokerage) -> Result<(), IngestError> {
        brokerage.validate()?;
        sqlx::query(
            "UPDATE brokerages SET website = ?, country = ?, is_active = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&brokerage.website)
        .bind(&brokerage.country)
        .bind(brokerage.is_active)
        .bind(Utc::now())
        .bind(brokerage.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<(), IngestError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE brokerages SET deleted_at = ?, is_active = 0, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(IngestError::NotFound(format!("brokerage {}", id)));
        }
        Ok(())
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Brokerage>, IngestError> {
        let rows: Vec<BrokerageRow> = sqlx::query_as(
            "SELECT * FROM brokerages WHERE deleted_at IS NULL ORDER BY name LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Brokerage::try_from).collect()
    }

    pub async fn count(&self) -> Result<i64, IngestError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM brokerages WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
