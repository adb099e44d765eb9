//! Read-only aggregate queries behind the `stats` admin views.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct AdTotals {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub winners: i64,
    pub clustered: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MediaTypeCount {
    /// `None` groups ads whose media type was unknown.
    pub media_type: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CompetitorAdCount {
    pub page_id: String,
    pub page_name: String,
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecentAdRow {
    pub ad_id: String,
    pub page_name: Option<String>,
    pub media_type: Option<String>,
    pub is_active: bool,
    pub winner_score: i32,
    pub first_seen_at: DateTime<Utc>,
}

/// Ad counts across the whole dataset. Winners are ads scoring 50 or more.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn ad_totals(pool: &PgPool) -> Result<AdTotals, DbError> {
    let totals = sqlx::query_as::<_, AdTotals>(
        "SELECT \
             COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE is_active) AS active, \
             COUNT(*) FILTER (WHERE NOT is_active) AS inactive, \
             COUNT(*) FILTER (WHERE winner_score >= 50) AS winners, \
             COUNT(*) FILTER (WHERE scaling_cluster_id IS NOT NULL) AS clustered \
         FROM ads",
    )
    .fetch_one(pool)
    .await?;

    Ok(totals)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn ads_by_media_type(pool: &PgPool) -> Result<Vec<MediaTypeCount>, DbError> {
    let rows = sqlx::query_as::<_, MediaTypeCount>(
        "SELECT media_type, COUNT(*) AS count \
         FROM ads \
         GROUP BY media_type \
         ORDER BY count DESC, media_type",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Competitors with the most ads, largest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn ads_by_competitor(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<CompetitorAdCount>, DbError> {
    let rows = sqlx::query_as::<_, CompetitorAdCount>(
        "SELECT c.page_id, c.page_name, \
                COUNT(a.id) AS total, \
                COUNT(a.id) FILTER (WHERE a.is_active) AS active \
         FROM competitors c \
         JOIN ads a ON a.page_id = c.page_id \
         GROUP BY c.page_id, c.page_name \
         ORDER BY total DESC, c.page_name \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Most recently discovered ads.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn recent_ads(pool: &PgPool, limit: i64) -> Result<Vec<RecentAdRow>, DbError> {
    let rows = sqlx::query_as::<_, RecentAdRow>(
        "SELECT ad_id, page_name, media_type, is_active, winner_score, first_seen_at \
         FROM ads \
         ORDER BY first_seen_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
