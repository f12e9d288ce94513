#[cfg(test)]
mod tests {
    use crate::*;
    use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
    use futures_util::FutureExt;
    use ingest_core::{
        Brokerage, Company, HistoricalData, IngestError, MarketData, Period, StockRating,
        TechnicalIndicators,
    };
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    async fn store() -> MarketStore {
        let db = MarketDb::connect("sqlite::memory:").await.unwrap();
        MarketStore::new(db)
    }

    async fn seed_dimensions(store: &MarketStore) -> (Company, Brokerage) {
        let company = Company::new("AAPL", "Apple Inc.").unwrap();
        let brokerage = Brokerage::new("The Goldman Sachs Group").unwrap();
        store.companies.create(&company).await.unwrap();
        store.brokerages.create(&brokerage).await.unwrap();
        (company, brokerage)
    }

    fn rating_at(
        company: &Company,
        brokerage: &Brokerage,
        offset_hours: i64,
    ) -> StockRating {
        StockRating::new(
            company.id,
            brokerage.id,
            "upgraded by",
            Utc::now() - ChronoDuration::hours(offset_hours),
            "test-feed",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn company_round_trip_by_ticker() {
        let store = store().await;
        let company = Company::new(" aapl ", "Apple Inc.").unwrap();
        store.companies.create(&company).await.unwrap();

        let loaded = store.companies.get_by_ticker("AAPL").await.unwrap().unwrap();
        assert_eq!(loaded.id, company.id);
        assert_eq!(loaded.ticker, "AAPL");
        assert!(loaded.is_active);

        // Lookup normalizes too.
        assert!(store
            .companies
            .get_by_ticker("  aapl ")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn create_ignore_duplicates_returns_canonical_row() {
        let store = store().await;
        let cancel = CancellationToken::new();

        let first = Company::new("MSFT", "Microsoft Corporation").unwrap();
        let second = Company::new("MSFT", "Microsoft Corp (duplicate)").unwrap();

        let (created, was_created, kept, was_kept) = store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let first = first.clone();
                let second = second.clone();
                async move {
                    let (a, a_new) =
                        CompanyRepository::create_ignore_duplicates_with_tx(conn, &first).await?;
                    let (b, b_new) =
                        CompanyRepository::create_ignore_duplicates_with_tx(conn, &second).await?;
                    Ok((a, a_new, b, b_new))
                }
                .boxed()
            })
            .await
            .unwrap();

        assert!(was_created);
        assert!(!was_kept);
        // First wins: the conflicting row is preserved, the new one skipped.
        assert_eq!(kept.id, created.id);
        assert_eq!(kept.name, "Microsoft Corporation");
        assert_eq!(store.companies.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn conflict_does_not_poison_transaction() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let (company, _brokerage) = seed_dimensions(&store).await;

        // Conflict on the ticker inside a transaction, then keep writing.
        let duplicate = Company::new("AAPL", "Apple Again").unwrap();
        let fresh = Company::new("NVDA", "NVIDIA Corporation").unwrap();

        store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let duplicate = duplicate.clone();
                let fresh = fresh.clone();
                async move {
                    let (kept, created) =
                        CompanyRepository::create_ignore_duplicates_with_tx(conn, &duplicate)
                            .await?;
                    assert!(!created);
                    let (_, created) =
                        CompanyRepository::create_ignore_duplicates_with_tx(conn, &fresh).await?;
                    assert!(created);
                    Ok(kept)
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(store.companies.count().await.unwrap(), 2);
        let kept = store.companies.get(company.id).await.unwrap();
        assert_eq!(kept.name, "Apple Inc.");
    }

    #[tokio::test]
    async fn bulk_insert_counts_inserted_and_skipped() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let (company, brokerage) = seed_dimensions(&store).await;

        let ratings = vec![
            rating_at(&company, &brokerage, 1),
            rating_at(&company, &brokerage, 2),
        ];
        let replay = ratings.clone();

        let (inserted, skipped) = store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let ratings = ratings.clone();
                async move {
                    StockRatingRepository::bulk_insert_ignore_duplicates_with_tx(conn, &ratings)
                        .await
                }
                .boxed()
            })
            .await
            .unwrap();
        assert_eq!((inserted, skipped), (2, 0));

        let (inserted, skipped) = store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let replay = replay.clone();
                async move {
                    StockRatingRepository::bulk_insert_ignore_duplicates_with_tx(conn, &replay)
                        .await
                }
                .boxed()
            })
            .await
            .unwrap();
        assert_eq!((inserted, skipped), (0, 2));
        assert_eq!(store.ratings.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back_dimension_writes() {
        let store = store().await;
        let cancel = CancellationToken::new();

        let company = Company::new("TSLA", "Tesla Inc.").unwrap();
        let result: Result<(), IngestError> = store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let company = company.clone();
                async move {
                    CompanyRepository::create_with_tx(conn, &company).await?;
                    // Injected failure after the dimension write, before facts.
                    Err(IngestError::Database("injected failure".to_string()))
                }
                .boxed()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.companies.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retry_gives_up_on_permanent_errors_immediately() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let mut calls = 0u32;

        let result: Result<(), IngestError> = store
            .transactions
            .execute_with_retry(3, &cancel, |_conn| {
                calls += 1;
                async move { Err(IngestError::Validation("bad input".to_string())) }.boxed()
            })
            .await;

        assert_eq!(result.unwrap_err().category(), "validation");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_retries_transient_errors() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let mut calls = 0u32;

        let result = store
            .transactions
            .execute_with_retry(3, &cancel, |_conn| {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err(IngestError::Transient("database is locked".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_work() {
        let store = store().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), IngestError> = store
            .transactions
            .execute_in_transaction(&cancel, |_conn| async move { Ok(()) }.boxed())
            .await;
        assert_eq!(result.unwrap_err().category(), "cancelled");
    }

    #[tokio::test]
    async fn preload_exposes_relations_and_flags_missing_ones() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let (company, brokerage) = seed_dimensions(&store).await;

        let ratings = vec![rating_at(&company, &brokerage, 1)];
        store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let ratings = ratings.clone();
                async move {
                    StockRatingRepository::bulk_insert_ignore_duplicates_with_tx(conn, &ratings)
                        .await
                }
                .boxed()
            })
            .await
            .unwrap();

        let loaded = store.ratings.list_with_relations(10, 0).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].company.as_ref().unwrap().ticker, "AAPL");
        assert_eq!(
            loaded[0].brokerage.as_ref().unwrap().name,
            "The Goldman Sachs Group"
        );

        // Soft-deleting the company turns the preload into a miss.
        store.companies.soft_delete(company.id).await.unwrap();
        let loaded = store.ratings.list_with_relations(10, 0).await.unwrap();
        assert!(loaded[0].company.is_none());
        assert!(loaded[0].brokerage.is_some());
    }

    #[tokio::test]
    async fn integrity_detects_orphans_and_duplicates_then_repairs() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let (company, brokerage) = seed_dimensions(&store).await;

        // One healthy rating, one duplicate pair, one orphan (soft-deleted dim).
        let healthy = rating_at(&company, &brokerage, 1);
        let dup_time = Utc::now() - ChronoDuration::hours(5);
        let mut dup_a = rating_at(&company, &brokerage, 0);
        dup_a.event_time = dup_time;
        let mut dup_b = rating_at(&company, &brokerage, 0);
        dup_b.event_time = dup_time;
        dup_b.id = Uuid::new_v4();

        let orphan_company = Company::new("DOOM", "Doomed Corp").unwrap();
        store.companies.create(&orphan_company).await.unwrap();
        let orphan = rating_at(&orphan_company, &brokerage, 2);

        store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let rows = vec![healthy.clone(), dup_a.clone(), orphan.clone()];
                async move {
                    StockRatingRepository::bulk_insert_ignore_duplicates_with_tx(conn, &rows).await
                }
                .boxed()
            })
            .await
            .unwrap();

        // A true duplicate cannot exist while the unique index is in place.
        // Simulate legacy data: drop the index, insert the twin row.
        sqlx::query("DROP INDEX idx_stock_ratings_event")
            .execute(store.db.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO stock_ratings \
             (id, company_id, brokerage_id, action, event_time, source, is_processed, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(dup_b.id.to_string())
        .bind(dup_b.company_id.to_string())
        .bind(dup_b.brokerage_id.to_string())
        .bind("upgraded by")
        .bind(dup_time)
        .bind("legacy")
        .bind(dup_b.created_at)
        .bind(dup_b.updated_at)
        .execute(store.db.pool())
        .await
        .unwrap();

        store.companies.soft_delete(orphan_company.id).await.unwrap();

        let report = store.integrity.validate_full_integrity().await.unwrap();
        assert_eq!(report.overall_status, HealthStatus::Critical);
        assert_eq!(report.count(IssueKind::OrphanedCompanyRef), 1);
        assert_eq!(report.count(IssueKind::DuplicateRatings), 1);
        assert!(report.critical_issues >= 1);

        let summary = store.integrity.repair_minor_issues(false).await.unwrap();
        assert!(summary.orphans_removed >= 1);

        let report = store.integrity.validate_full_integrity().await.unwrap();
        assert_eq!(report.count(IssueKind::OrphanedCompanyRef), 0);
        assert_eq!(report.count(IssueKind::DuplicateRatings), 0);
        assert_ne!(report.overall_status, HealthStatus::Critical);
    }

    #[tokio::test]
    async fn dry_run_repair_changes_nothing() {
        let store = store().await;
        let (company, brokerage) = seed_dimensions(&store).await;
        let cancel = CancellationToken::new();

        let rows = vec![rating_at(&company, &brokerage, 1)];
        store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let rows = rows.clone();
                async move {
                    StockRatingRepository::bulk_insert_ignore_duplicates_with_tx(conn, &rows).await
                }
                .boxed()
            })
            .await
            .unwrap();
        store.companies.soft_delete(company.id).await.unwrap();

        let summary = store.integrity.repair_minor_issues(true).await.unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.orphans_removed, 1);
        assert_eq!(store.ratings.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn market_data_upsert_collapses_to_one_row_per_symbol() {
        let store = store().await;
        let now = Utc::now();

        let mut quote = MarketData {
            id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            price: 190.0,
            change: 1.0,
            change_percent: 0.5,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            volume: None,
            market_timestamp: now,
            data_source: "finnhub".to_string(),
            last_updated: now,
            created_at: now,
            updated_at: now,
        };
        store.market_data.upsert_by_symbol(&quote).await.unwrap();

        quote.id = Uuid::new_v4();
        quote.price = 195.5;
        store.market_data.upsert_by_symbol(&quote).await.unwrap();

        let loaded = store
            .market_data
            .get_by_symbol("AAPL")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.price, 195.5);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM market_data")
            .fetch_one(store.db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn technicals_upsert_recomputes_signals_on_write() {
        let store = store().await;
        let (company, _brokerage) = seed_dimensions(&store).await;

        let mut snapshot = TechnicalIndicators::new(company.id, "AAPL", Period::Daily);
        snapshot.sma_20 = Some(105.0);
        snapshot.sma_50 = Some(100.0);
        snapshot.rsi_14 = Some(28.0);
        snapshot.macd_histogram = Some(0.4);
        // Deliberately stale signal fields; the repo must not trust them.
        snapshot.signal_strength = -42.0;

        store
            .technical_indicators
            .upsert_snapshot(&snapshot)
            .await
            .unwrap();

        let loaded = store
            .technical_indicators
            .get_by_company_and_timeframe(company.id, Period::Daily)
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.signal_strength >= 0.0);
        assert_ne!(loaded.signal_strength, -42.0);

        let bullish = store.technical_indicators.get_bullish_stocks(0.0).await.unwrap();
        assert_eq!(bullish.len(), 1);
    }

    #[tokio::test]
    async fn historical_unique_per_company_date_timeframe() {
        let store = store().await;
        let (company, _brokerage) = seed_dimensions(&store).await;
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let bar = HistoricalData::new(
            company.id,
            "AAPL",
            date,
            Period::Daily,
            100.0,
            104.0,
            99.0,
            103.0,
            1_000_000,
        )
        .unwrap();

        let (inserted, skipped) = store
            .historical
            .bulk_insert_ignore_duplicates(&[bar.clone()])
            .await
            .unwrap();
        assert_eq!((inserted, skipped), (1, 0));

        let mut replay = bar.clone();
        replay.id = Uuid::new_v4();
        let (inserted, skipped) = store
            .historical
            .bulk_insert_ignore_duplicates(&[replay])
            .await
            .unwrap();
        assert_eq!((inserted, skipped), (0, 1));

        let loaded = store
            .historical
            .get_by_symbol_and_date("AAPL", date, Period::Daily)
            .await
            .unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn clear_fact_tables_preserves_dimensions() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let (company, brokerage) = seed_dimensions(&store).await;

        let rows = vec![rating_at(&company, &brokerage, 1)];
        store
            .transactions
            .execute_in_transaction(&cancel, |conn| {
                let rows = rows.clone();
                async move {
                    StockRatingRepository::bulk_insert_ignore_duplicates_with_tx(conn, &rows).await
                }
                .boxed()
            })
            .await
            .unwrap();

        store.db.clear_fact_tables().await.unwrap();
        assert_eq!(store.ratings.count().await.unwrap(), 0);
        assert_eq!(store.companies.count().await.unwrap(), 1);
        assert_eq!(store.brokerages.count().await.unwrap(), 1);
    }
}
