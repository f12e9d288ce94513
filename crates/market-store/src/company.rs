use chrono::{DateTime, NaiveDate, Utc};
use ingest_core::{Company, IngestError};
use sqlx::sqlite::SqliteConnection;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CompanyRow {
    id: String,
    ticker: String,
    name: String,
    sector: Option<String>,
    exchange: Option<String>,
    market_cap: Option<f64>,
    logo_url: Option<String>,
    currency: Option<String>,
    ipo_date: Option<NaiveDate>,
    employee_count: Option<i64>,
    week_high_52: Option<f64>,
    week_low_52: Option<f64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, IngestError> {
    Uuid::parse_str(raw).map_err(|e| IngestError::Database(format!("corrupt id {:?}: {}", raw, e)))
}

impl TryFrom<CompanyRow> for Company {
    type Error = IngestError;

    fn try_from(row: CompanyRow) -> Result<Self, Self::Error> {
        Ok(Company {
            id: parse_id(&row.id)?,
            ticker: row.ticker,
            name: row.name,
            sector: row.sector,
            exchange: row.exchange,
            market_cap: row.market_cap,
            logo_url: row.logo_url,
            currency: row.currency,
            ipo_date: row.ipo_date,
            employee_count: row.employee_count,
            week_high_52: row.week_high_52,
            week_low_52: row.week_low_52,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

const INSERT_SQL: &str = "INSERT INTO companies \
    (id, ticker, name, sector, exchange, market_cap, logo_url, currency, ipo_date, \
     employee_count, week_high_52, week_low_52, is_active, created_at, updated_at, deleted_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const INSERT_IGNORE_SQL: &str = "INSERT INTO companies \
    (id, ticker, name, sector, exchange, market_cap, logo_url, currency, ipo_date, \
     employee_count, week_high_52, week_low_52, is_active, created_at, updated_at, deleted_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(ticker) DO NOTHING";

fn bind_company<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    company: &'q Company,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(company.id.to_string())
        .bind(&company.ticker)
        .bind(&company.name)
        .bind(&company.sector)
        .bind(&company.exchange)
        .bind(company.market_cap)
        .bind(&company.logo_url)
        .bind(&company.currency)
        .bind(company.ipo_date)
        .bind(company.employee_count)
        .bind(company.week_high_52)
        .bind(company.week_low_52)
        .bind(company.is_active)
        .bind(company.created_at)
        .bind(company.updated_at)
        .bind(company.deleted_at)
}

#[derive(Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, company: &Company) -> Result<(), IngestError> {
        company.validate()?;
        bind_company(sqlx::query(INSERT_SQL), company)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_with_tx(
        conn: &mut SqliteConnection,
        company: &Company,
    ) -> Result<(), IngestError> {
        company.validate()?;
        bind_company(sqlx::query(INSERT_SQL), company)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Insert-or-no-op on the ticker. Returns the canonical row and whether
    /// this call created it. A conflict never poisons the transaction: the
    /// insert itself is conflict-tolerant and the canonical row is re-read
    /// on the same connection.
    pub async fn create_ignore_duplicates_with_tx(
        conn: &mut SqliteConnection,
        company: &Company,
    ) -> Result<(Company, bool), IngestError> {
        company.validate()?;
        let result = bind_company(sqlx::query(INSERT_IGNORE_SQL), company)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() > 0 {
            return Ok((company.clone(), true));
        }

        let existing = Self::get_by_ticker_with_tx(conn, &company.ticker)
            .await?
            .ok_or_else(|| {
                IngestError::Database(format!(
                    "conflict on ticker {} but canonical row missing",
                    company.ticker
                ))
            })?;
        Ok((existing, false))
    }

    async fn fetch_by_ticker<'e, E>(
        executor: E,
        ticker: &str,
    ) -> Result<Option<Company>, IngestError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let normalized = Company::normalize_ticker(ticker);
        let row: Option<CompanyRow> =
            sqlx::query_as("SELECT * FROM companies WHERE ticker = ?")
                .bind(normalized)
                .fetch_optional(executor)
                .await?;
        row.map(Company::try_from).transpose()
    }

    pub async fn get_by_ticker(&self, ticker: &str) -> Result<Option<Company>, IngestError> {
        Self::fetch_by_ticker(&self.pool, ticker).await
    }

    pub async fn get_by_ticker_with_tx(
        conn: &mut SqliteConnection,
        ticker: &str,
    ) -> Result<Option<Company>, IngestError> {
        Self::fetch_by_ticker(conn, ticker).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Company, IngestError> {
        let row: Option<CompanyRow> = sqlx::query_as("SELECT * FROM companies WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Company::try_from)
            .transpose()?
            .ok_or_else(|| IngestError::NotFound(format!("company {}", id)))
    }

    pub async fn update(&self, company: &Company) -> Result<(), IngestError> {
        company.validate()?;
        sqlx::query(
            "UPDATE companies SET name = ?, sector = ?, exchange = ?, market_cap = ?, \
             logo_url = ?, currency = ?, ipo_date = ?, employee_count = ?, \
             week_high_52 = ?, week_low_52 = ?, is_active = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&company.name)
        .bind(&company.sector)
        .bind(&company.exchange)
        .bind(company.market_cap)
        .bind(&company.logo_url)
        .bind(&company.currency)
        .bind(company.ipo_date)
        .bind(company.employee_count)
        .bind(company.week_high_52)
        .bind(company.week_low_52)
        .bind(company.is_active)
        .bind(Utc::now())
        .bind(company.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Companies are only ever soft-deleted; rating facts keep their target.
    pub async fn soft_delete(&self, id: Uuid) -> Result<(), IngestError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE companies SET deleted_at = ?, is_active = 0, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(IngestError::NotFound(format!("company {}", id)));
        }
        Ok(())
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Company>, IngestError> {
        let rows: Vec<CompanyRow> = sqlx::query_as(
            "SELECT * FROM companies WHERE deleted_at IS NULL ORDER BY ticker LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Company::try_from).collect()
    }

    pub async fn count(&self) -> Result<i64, IngestError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM companies WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
