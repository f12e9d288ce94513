//! Post-load referential validation and repair for the ratings fact table.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use ingest_core::IngestError;
use sqlx::SqlitePool;
use tokio::time::Instant;

/// Aggregate health verdict of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

/// Issue kinds, ordered by severity. Orphans break every downstream join and
/// are therefore critical; the rest degrade analytics but not integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueKind {
    OrphanedCompanyRef,
    OrphanedBrokerageRef,
    DuplicateRatings,
    FutureEventTime,
    AncientEventTime,
    MissingAction,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::OrphanedCompanyRef => "orphaned_company_ref",
            IssueKind::OrphanedBrokerageRef => "orphaned_brokerage_ref",
            IssueKind::DuplicateRatings => "duplicate_ratings",
            IssueKind::FutureEventTime => "future_event_time",
            IssueKind::AncientEventTime => "ancient_event_time",
            IssueKind::MissingAction => "missing_action",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            IssueKind::OrphanedCompanyRef | IssueKind::OrphanedBrokerageRef
        )
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub overall_status: HealthStatus,
    pub total_issues: u64,
    pub critical_issues: u64,
    pub issues_by_kind: BTreeMap<IssueKind, u64>,
    pub processed_count: i64,
    pub unprocessed_count: i64,
    pub duration: Duration,
}

impl IntegrityReport {
    pub fn count(&self, kind: IssueKind) -> u64 {
        self.issues_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Which row survives when a duplicate group is repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKeep {
    Newest,
    Oldest,
}

#[derive(Debug, Clone, Default)]
pub struct RepairSummary {
    pub orphans_removed: u64,
    pub duplicates_removed: u64,
    pub dry_run: bool,
}

const ORPHAN_COMPANY_SQL: &str = "SELECT COUNT(*) FROM stock_ratings r \
    LEFT JOIN companies c ON c.id = r.company_id \
    WHERE c.id IS NULL OR c.deleted_at IS NOT NULL";

const ORPHAN_BROKERAGE_SQL: &str = "SELECT COUNT(*) FROM stock_ratings r \
    LEFT JOIN brokerages b ON b.id = r.brokerage_id \
    WHERE b.id IS NULL OR b.deleted_at IS NOT NULL";

const DUPLICATE_GROUPS_SQL: &str = "SELECT COUNT(*) FROM (\
    SELECT company_id, brokerage_id, event_time FROM stock_ratings \
    GROUP BY company_id, brokerage_id, event_time HAVING COUNT(*) > 1)";

#[derive(Clone)]
pub struct IntegrityService {
    pool: SqlitePool,
    duplicate_keep: DuplicateKeep,
}

impl IntegrityService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            duplicate_keep: DuplicateKeep::Newest,
        }
    }

    pub fn keep_on_repair(mut self, keep: DuplicateKeep) -> Self {
        self.duplicate_keep = keep;
        self
    }

    /// Run every check and fold the counts into a report.
    pub async fn validate_full_integrity(&self) -> Result<IntegrityReport, IngestError> {
        let started = Instant::now();
        let mut issues_by_kind = BTreeMap::new();

        let orphan_companies: i64 = sqlx::query_scalar(ORPHAN_COMPANY_SQL)
            .fetch_one(&self.pool)
            .await?;
        issues_by_kind.insert(IssueKind::OrphanedCompanyRef, orphan_companies as u64);

        let orphan_brokerages: i64 = sqlx::query_scalar(ORPHAN_BROKERAGE_SQL)
            .fetch_one(&self.pool)
            .await?;
        issues_by_kind.insert(IssueKind::OrphanedBrokerageRef, orphan_brokerages as u64);

        let duplicate_groups: i64 = sqlx::query_scalar(DUPLICATE_GROUPS_SQL)
            .fetch_one(&self.pool)
            .await?;
        issues_by_kind.insert(IssueKind::DuplicateRatings, duplicate_groups as u64);

        // Clock skew tolerance: a day ahead is suspicious, beyond it broken.
        let future_cutoff = Utc::now() + chrono::Duration::hours(24);
        let future_rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stock_ratings WHERE datetime(event_time) > datetime(?)",
        )
        .bind(future_cutoff)
        .fetch_one(&self.pool)
        .await?;
        issues_by_kind.insert(IssueKind::FutureEventTime, future_rows as u64);

        let ancient_cutoff = Utc
            .with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
            .single()
            .expect("fixed date");
        let ancient_rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stock_ratings WHERE datetime(event_time) < datetime(?)",
        )
        .bind(ancient_cutoff)
        .fetch_one(&self.pool)
        .await?;
        issues_by_kind.insert(IssueKind::AncientEventTime, ancient_rows as u64);

        let missing_action: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stock_ratings \
             WHERE action IS NULL OR TRIM(action) = '' \
                OR company_id IS NULL OR TRIM(company_id) = '' \
                OR brokerage_id IS NULL OR TRIM(brokerage_id) = ''",
        )
        .fetch_one(&self.pool)
        .await?;
        issues_by_kind.insert(IssueKind::MissingAction, missing_action as u64);

        let processed_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_ratings WHERE is_processed = 1")
                .fetch_one(&self.pool)
                .await?;
        let unprocessed_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_ratings WHERE is_processed = 0")
                .fetch_one(&self.pool)
                .await?;

        let total_issues: u64 = issues_by_kind.values().sum();
        let critical_issues: u64 = issues_by_kind
            .iter()
            .filter(|(kind, _)| kind.is_critical())
            .map(|(_, count)| count)
            .sum();

        let overall_status = if critical_issues > 0 {
            HealthStatus::Critical
        } else if total_issues > 0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let report = IntegrityReport {
            overall_status,
            total_issues,
            critical_issues,
            issues_by_kind,
            processed_count,
            unprocessed_count,
            duration: started.elapsed(),
        };

        tracing::info!(
            "integrity: status={} total={} critical={} in {:?}",
            report.overall_status.as_str(),
            report.total_issues,
            report.critical_issues,
            report.duration
        );

        Ok(report)
    }

    /// Drop orphans, then collapse each duplicate group to one survivor.
    pub async fn repair_minor_issues(&self, dry_run: bool) -> Result<RepairSummary, IngestError> {
        let mut summary = RepairSummary {
            dry_run,
            ..Default::default()
        };

        let orphan_delete = "DELETE FROM stock_ratings WHERE id IN (\
            SELECT r.id FROM stock_ratings r \
            LEFT JOIN companies c ON c.id = r.company_id \
            LEFT JOIN brokerages b ON b.id = r.brokerage_id \
            WHERE c.id IS NULL OR c.deleted_at IS NOT NULL \
               OR b.id IS NULL OR b.deleted_at IS NOT NULL)";

        // rowid is a reliable insertion-order tiebreak when created_at collides.
        let survivor = match self.duplicate_keep {
            DuplicateKeep::Newest => "MAX(rowid)",
            DuplicateKeep::Oldest => "MIN(rowid)",
        };
        let duplicate_delete = format!(
            "DELETE FROM stock_ratings WHERE rowid NOT IN (\
             SELECT {} FROM stock_ratings GROUP BY company_id, brokerage_id, event_time)",
            survivor
        );

        if dry_run {
            let orphans: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM stock_ratings r \
                 LEFT JOIN companies c ON c.id = r.company_id \
                 LEFT JOIN brokerages b ON b.id = r.brokerage_id \
                 WHERE c.id IS NULL OR c.deleted_at IS NOT NULL \
                    OR b.id IS NULL OR b.deleted_at IS NOT NULL",
            )
            .fetch_one(&self.pool)
            .await?;
            summary.orphans_removed = orphans as u64;

            let duplicates: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM stock_ratings WHERE rowid NOT IN (\
                 SELECT {} FROM stock_ratings GROUP BY company_id, brokerage_id, event_time)",
                survivor
            ))
            .fetch_one(&self.pool)
            .await?;
            summary.duplicates_removed = duplicates as u64;
            return Ok(summary);
        }

        let result = sqlx::query(orphan_delete).execute(&self.pool).await?;
        summary.orphans_removed = result.rows_affected();

        let result = sqlx::query(&duplicate_delete).execute(&self.pool).await?;
        summary.duplicates_removed = result.rows_affected();

        tracing::info!(
            "integrity repair: orphans={} duplicates={}",
            summary.orphans_removed,
            summary.duplicates_removed
        );

        Ok(summary)
    }
}
