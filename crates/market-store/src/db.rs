use std::str::FromStr;

use ingest_core::IngestError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Pool wrapper owning schema initialization. The schema is embedded and
/// applied statement-by-statement at startup; sqlx does not run multiple
/// statements per query.
#[derive(Clone)]
pub struct MarketDb {
    pool: SqlitePool,
}

impl MarketDb {
    pub async fn connect(database_url: &str) -> Result<Self, IngestError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| IngestError::Fatal(format!("bad database url: {}", e)))?
            .create_if_missing(true);

        // Sized for workers x (1 + transactions in flight). In-memory databases
        // are per-connection, so they must stay on a single connection.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 10 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| IngestError::Fatal(format!("database unreachable: {}", e)))?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), IngestError> {
        // WAL allows concurrent refresh workers to write without lock storms.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&self.pool)
            .await?;

        let schema = include_str!("../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Best-effort truncation of fact tables before a clean load. Dimensions
    /// (companies, brokerages) are preserved to keep identities stable.
    pub async fn clear_fact_tables(&self) -> Result<(), IngestError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "stock_ratings",
            "technical_indicators",
            "financial_metrics",
            "historical_data",
            "market_data",
            "company_profiles",
            "news_items",
            "basic_financials",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_applies_to_fresh_db() {
        let db = MarketDb::connect("sqlite::memory:").await.unwrap();
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert!(count >= 10);
    }
}
