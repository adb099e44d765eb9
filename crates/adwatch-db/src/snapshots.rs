//! Database operations for `ad_snapshots`.

use std::collections::HashMap;

use adwatch_core::AdSnapshot;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::DbError;

/// Appends a snapshot row.
///
/// The `(ad_id, scrape_run_id)` unique constraint makes this a no-op for a
/// second observation of the same ad in the same run. Returns `true` when a
/// row was written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_snapshot(pool: &PgPool, snapshot: &AdSnapshot) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO ad_snapshots \
             (ad_id, snapshot_date, scrape_run_id, is_active, has_low_impressions, ad_text, \
              media_url, landing_page_url, platforms, regions, raw_data) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (ad_id, scrape_run_id) DO NOTHING",
    )
    .bind(&snapshot.ad_id)
    .bind(snapshot.snapshot_date)
    .bind(snapshot.scrape_run_id)
    .bind(snapshot.is_active)
    .bind(snapshot.has_low_impressions)
    .bind(&snapshot.ad_text)
    .bind(&snapshot.media_url)
    .bind(&snapshot.landing_page_url)
    .bind(Json(&snapshot.platforms))
    .bind(Json(&snapshot.regions))
    .bind(&snapshot.raw_data)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Number of snapshots recorded per ad, keyed by external ad id.
///
/// Ads without any snapshot are absent from the map.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn snapshot_counts(pool: &PgPool) -> Result<HashMap<String, i64>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT ad_id, COUNT(*) FROM ad_snapshots GROUP BY ad_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}
