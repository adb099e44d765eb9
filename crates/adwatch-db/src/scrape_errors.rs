//! Database operations for the append-only `scrape_errors` log.

use adwatch_core::NewScrapeError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `scrape_errors` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeErrorRow {
    pub id: i64,
    pub scrape_run_id: i64,
    pub page_id: String,
    pub error_type: String,
    pub error_message: String,
    pub detail: Option<String>,
    pub screenshot_path: Option<String>,
    pub page_url: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Appends one failed attempt.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_scrape_error(pool: &PgPool, error: &NewScrapeError) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO scrape_errors \
             (scrape_run_id, page_id, error_type, error_message, detail, screenshot_path, \
              page_url, retry_count) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(error.scrape_run_id)
    .bind(&error.page_id)
    .bind(&error.error_type)
    .bind(&error.error_message)
    .bind(&error.detail)
    .bind(&error.screenshot_path)
    .bind(&error.page_url)
    .bind(error.retry_count)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Most recent errors across all runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_errors(pool: &PgPool, limit: i64) -> Result<Vec<ScrapeErrorRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapeErrorRow>(
        "SELECT id, scrape_run_id, page_id, error_type, error_message, detail, screenshot_path, \
                page_url, retry_count, created_at \
         FROM scrape_errors \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
