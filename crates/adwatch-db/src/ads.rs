//! Database operations for the `ads` table.

use adwatch_core::{Ad, MediaType, ScoreBreakdown};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `ads` table.
///
/// `media_type` is stored as text; values outside the known set decode to
/// `None` rather than failing the read.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdRow {
    pub id: i64,
    pub ad_id: String,
    pub page_id: String,
    pub page_name: Option<String>,
    pub ad_text: Option<String>,
    pub started_running_on: Option<NaiveDate>,
    pub is_active: bool,
    pub has_low_impressions: bool,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub cta_type: Option<String>,
    pub landing_page_url: Option<String>,
    pub platforms: Json<Vec<String>>,
    pub regions: Json<Vec<String>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub days_running: i32,
    pub media_downloaded: bool,
    pub local_media_path: Option<String>,
    pub winner_score: i32,
    pub score_breakdown: Option<Json<ScoreBreakdown>>,
    pub scaling_cluster_id: Option<String>,
    pub snapshot_count: i32,
}

impl From<AdRow> for Ad {
    fn from(row: AdRow) -> Self {
        Ad {
            ad_id: row.ad_id,
            page_id: row.page_id,
            page_name: row.page_name,
            ad_text: row.ad_text,
            started_running_on: row.started_running_on,
            is_active: row.is_active,
            has_low_impressions: row.has_low_impressions,
            media_type: row.media_type.as_deref().and_then(MediaType::parse),
            media_url: row.media_url,
            thumbnail_url: row.thumbnail_url,
            cta_type: row.cta_type,
            landing_page_url: row.landing_page_url,
            platforms: row.platforms.0,
            regions: row.regions.0,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
            days_running: row.days_running,
            media_downloaded: row.media_downloaded,
            local_media_path: row.local_media_path,
            winner_score: row.winner_score,
            score_breakdown: row.score_breakdown.map(|b| b.0),
            scaling_cluster_id: row.scaling_cluster_id,
            snapshot_count: row.snapshot_count,
        }
    }
}

const COLUMNS: &str = "id, ad_id, page_id, page_name, ad_text, started_running_on, is_active, \
     has_low_impressions, media_type, media_url, thumbnail_url, cta_type, landing_page_url, \
     platforms, regions, first_seen_at, last_seen_at, days_running, media_downloaded, \
     local_media_path, winner_score, score_breakdown, scaling_cluster_id, snapshot_count";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches an ad by its external id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_ad(pool: &PgPool, ad_id: &str) -> Result<Option<Ad>, DbError> {
    let row = sqlx::query_as::<_, AdRow>(&format!("SELECT {COLUMNS} FROM ads WHERE ad_id = $1"))
        .bind(ad_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Ad::from))
}

/// Returns every ad in insertion order.
///
/// Insertion order is what keeps clustering deterministic across passes.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ads(pool: &PgPool) -> Result<Vec<Ad>, DbError> {
    let rows = sqlx::query_as::<_, AdRow>(&format!("SELECT {COLUMNS} FROM ads ORDER BY id"))
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Ad::from).collect())
}

/// External ids of the competitor's ads currently flagged active.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn active_ad_ids(pool: &PgPool, page_id: &str) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT ad_id FROM ads WHERE page_id = $1 AND is_active = true ORDER BY id",
    )
    .bind(page_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a newly observed ad.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a duplicate `ad_id`).
pub async fn insert_ad(pool: &PgPool, ad: &Ad) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO ads \
             (ad_id, page_id, page_name, ad_text, started_running_on, is_active, \
              has_low_impressions, media_type, media_url, thumbnail_url, cta_type, \
              landing_page_url, platforms, regions, first_seen_at, last_seen_at, \
              days_running, snapshot_count) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
    )
    .bind(&ad.ad_id)
    .bind(&ad.page_id)
    .bind(&ad.page_name)
    .bind(&ad.ad_text)
    .bind(ad.started_running_on)
    .bind(ad.is_active)
    .bind(ad.has_low_impressions)
    .bind(ad.media_type.map(MediaType::as_str))
    .bind(&ad.media_url)
    .bind(&ad.thumbnail_url)
    .bind(&ad.cta_type)
    .bind(&ad.landing_page_url)
    .bind(Json(&ad.platforms))
    .bind(Json(&ad.regions))
    .bind(ad.first_seen_at)
    .bind(ad.last_seen_at)
    .bind(ad.days_running)
    .bind(ad.snapshot_count.max(1))
    .execute(pool)
    .await?;

    Ok(())
}

/// Writes back the observation fields of an existing ad.
///
/// Scoring columns and media columns have their own writers and are left
/// untouched here.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the ad does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_ad(pool: &PgPool, ad: &Ad) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ads SET \
             page_name = $2, ad_text = $3, started_running_on = $4, is_active = $5, \
             has_low_impressions = $6, media_type = $7, media_url = $8, thumbnail_url = $9, \
             cta_type = $10, landing_page_url = $11, platforms = $12, regions = $13, \
             last_seen_at = $14, days_running = $15, updated_at = NOW() \
         WHERE ad_id = $1",
    )
    .bind(&ad.ad_id)
    .bind(&ad.page_name)
    .bind(&ad.ad_text)
    .bind(ad.started_running_on)
    .bind(ad.is_active)
    .bind(ad.has_low_impressions)
    .bind(ad.media_type.map(MediaType::as_str))
    .bind(&ad.media_url)
    .bind(&ad.thumbnail_url)
    .bind(&ad.cta_type)
    .bind(&ad.landing_page_url)
    .bind(Json(&ad.platforms))
    .bind(Json(&ad.regions))
    .bind(ad.last_seen_at)
    .bind(ad.days_running)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Soft-deletes ads: flags them inactive and stamps `last_seen_at`.
///
/// Returns the number of rows changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn deactivate_ads(
    pool: &PgPool,
    ad_ids: &[String],
    seen_at: DateTime<Utc>,
) -> Result<u64, DbError> {
    if ad_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE ads SET is_active = false, last_seen_at = $2, updated_at = NOW() \
         WHERE ad_id = ANY($1)",
    )
    .bind(ad_ids)
    .bind(seen_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Records where an ad's media landed on disk.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_local_media(pool: &PgPool, ad_id: &str, path: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE ads SET local_media_path = $2, media_downloaded = true, updated_at = NOW() \
         WHERE ad_id = $1",
    )
    .bind(ad_id)
    .bind(path)
    .execute(pool)
    .await?;

    Ok(())
}

/// Stores the outcome of a scoring pass for one ad.
///
/// `scaling_cluster_id` is always overwritten, so passing `None` clears a
/// stale cluster from a previous pass.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_ad_score(
    pool: &PgPool,
    ad_id: &str,
    breakdown: &ScoreBreakdown,
    snapshot_count: i32,
    scaling_cluster_id: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE ads SET winner_score = $2, score_breakdown = $3, snapshot_count = $4, \
             scaling_cluster_id = $5, updated_at = NOW() \
         WHERE ad_id = $1",
    )
    .bind(ad_id)
    .bind(breakdown.total)
    .bind(Json(breakdown))
    .bind(snapshot_count.max(1))
    .bind(scaling_cluster_id)
    .execute(pool)
    .await?;

    Ok(())
}
