//! Database operations for `scrape_runs`.

use adwatch_core::{RunCounters, RunKind, ScrapeRun};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `scrape_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeRunRow {
    pub id: i64,
    pub run_type: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub competitors_total: i32,
    pub competitors_processed: i32,
    pub competitors_failed: i32,
    pub ads_found: i32,
    pub ads_new: i32,
    pub ads_updated: i32,
    pub ads_deleted: i32,
    pub media_downloaded: i32,
    pub errors_count: i32,
    pub metadata: serde_json::Value,
}

impl TryFrom<ScrapeRunRow> for ScrapeRun {
    type Error = DbError;

    fn try_from(row: ScrapeRunRow) -> Result<Self, Self::Error> {
        Ok(ScrapeRun {
            id: row.id,
            run_type: row.run_type.parse()?,
            status: row.status.parse()?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            counters: RunCounters {
                competitors_total: row.competitors_total,
                competitors_processed: row.competitors_processed,
                competitors_failed: row.competitors_failed,
                ads_found: row.ads_found,
                ads_new: row.ads_new,
                ads_updated: row.ads_updated,
                ads_deleted: row.ads_deleted,
                media_downloaded: row.media_downloaded,
                errors_count: row.errors_count,
            },
            metadata: row.metadata,
        })
    }
}

const COLUMNS: &str = "id, run_type, status, started_at, completed_at, competitors_total, \
     competitors_processed, competitors_failed, ads_found, ads_new, ads_updated, ads_deleted, \
     media_downloaded, errors_count, metadata";

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Creates a new run in `running` status with zeroed counters.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_scrape_run(
    pool: &PgPool,
    run_type: RunKind,
    metadata: &serde_json::Value,
) -> Result<ScrapeRun, DbError> {
    let row = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "INSERT INTO scrape_runs (run_type, status, metadata) \
         VALUES ($1, 'running', $2) \
         RETURNING {COLUMNS}"
    ))
    .bind(run_type.as_str())
    .bind(metadata)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Persists the current counters of a run that is still `running`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is no longer
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn update_run_counters(
    pool: &PgPool,
    id: i64,
    counters: &RunCounters,
) -> Result<(), DbError> {
    finish_or_update(pool, id, counters, None).await
}

/// Marks a run as `completed` with its final counters and `completed_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn complete_scrape_run(
    pool: &PgPool,
    id: i64,
    counters: &RunCounters,
) -> Result<(), DbError> {
    finish_or_update(pool, id, counters, Some("completed")).await
}

/// Marks a run as `failed` with its final counters and `completed_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_scrape_run(
    pool: &PgPool,
    id: i64,
    counters: &RunCounters,
) -> Result<(), DbError> {
    finish_or_update(pool, id, counters, Some("failed")).await
}

async fn finish_or_update(
    pool: &PgPool,
    id: i64,
    counters: &RunCounters,
    terminal_status: Option<&'static str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scrape_runs SET \
             status = COALESCE($11, status), \
             completed_at = CASE WHEN $11::TEXT IS NULL THEN completed_at ELSE NOW() END, \
             competitors_total = $2, competitors_processed = $3, competitors_failed = $4, \
             ads_found = $5, ads_new = $6, ads_updated = $7, ads_deleted = $8, \
             media_downloaded = $9, errors_count = $10 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(counters.competitors_total)
    .bind(counters.competitors_processed)
    .bind(counters.competitors_failed)
    .bind(counters.ads_found)
    .bind(counters.ads_new)
    .bind(counters.ads_updated)
    .bind(counters.ads_deleted)
    .bind(counters.media_downloaded)
    .bind(counters.errors_count)
    .bind(terminal_status)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks runs stuck in `running` since before `started_before` as `failed`.
///
/// Such runs belong to processes that were killed mid-run. The run's
/// metadata gains `"abandoned": true`. Returns the number of runs closed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn abandon_stale_runs(
    pool: &PgPool,
    started_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE scrape_runs SET \
             status = 'failed', completed_at = NOW(), \
             metadata = metadata || '{\"abandoned\": true}'::jsonb \
         WHERE status = 'running' AND started_at < $1",
    )
    .bind(started_before)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches a single run by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_scrape_run(pool: &PgPool, id: i64) -> Result<ScrapeRun, DbError> {
    let row = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "SELECT {COLUMNS} FROM scrape_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scrape_runs(pool: &PgPool, limit: i64) -> Result<Vec<ScrapeRun>, DbError> {
    let rows = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "SELECT {COLUMNS} FROM scrape_runs ORDER BY started_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ScrapeRun::try_from).collect()
}
