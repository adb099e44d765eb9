//! Database operations for the `competitors` table.

use adwatch_core::Competitor;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{is_unique_violation, DbError};

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `competitors` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompetitorRow {
    pub page_id: String,
    pub page_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CompetitorRow> for Competitor {
    fn from(row: CompetitorRow) -> Self {
        Competitor {
            page_id: row.page_id,
            page_name: row.page_name,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const COLUMNS: &str = "page_id, page_name, is_active, created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns active competitors ordered by name, optionally narrowed to one page id.
///
/// An inactive competitor is never returned, even when named explicitly.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_competitors(
    pool: &PgPool,
    page_id: Option<&str>,
) -> Result<Vec<Competitor>, DbError> {
    let rows = sqlx::query_as::<_, CompetitorRow>(&format!(
        "SELECT {COLUMNS} FROM competitors \
         WHERE is_active = true AND ($1::TEXT IS NULL OR page_id = $1) \
         ORDER BY page_name, page_id"
    ))
    .bind(page_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Competitor::from).collect())
}

/// Returns every competitor regardless of status, ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_competitors(pool: &PgPool) -> Result<Vec<Competitor>, DbError> {
    let rows = sqlx::query_as::<_, CompetitorRow>(&format!(
        "SELECT {COLUMNS} FROM competitors ORDER BY page_name, page_id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Competitor::from).collect())
}

/// Fetches one competitor by page id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_competitor(pool: &PgPool, page_id: &str) -> Result<Option<Competitor>, DbError> {
    let row = sqlx::query_as::<_, CompetitorRow>(&format!(
        "SELECT {COLUMNS} FROM competitors WHERE page_id = $1"
    ))
    .bind(page_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Competitor::from))
}

/// Registers a new competitor page as active.
///
/// # Errors
///
/// Returns [`DbError::AlreadyExists`] if the page id is already tracked, or
/// [`DbError::Sqlx`] if the insert fails for another reason.
pub async fn insert_competitor(
    pool: &PgPool,
    page_id: &str,
    page_name: &str,
) -> Result<Competitor, DbError> {
    let result = sqlx::query_as::<_, CompetitorRow>(&format!(
        "INSERT INTO competitors (page_id, page_name) VALUES ($1, $2) RETURNING {COLUMNS}"
    ))
    .bind(page_id)
    .bind(page_name)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row.into()),
        Err(e) if is_unique_violation(&e) => Err(DbError::AlreadyExists {
            entity: "competitor",
            key: page_id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Flips a competitor's `is_active` flag.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no competitor has this page id.
pub async fn set_competitor_active(
    pool: &PgPool,
    page_id: &str,
    is_active: bool,
) -> Result<Competitor, DbError> {
    let row = sqlx::query_as::<_, CompetitorRow>(&format!(
        "UPDATE competitors SET is_active = $2, updated_at = NOW() \
         WHERE page_id = $1 RETURNING {COLUMNS}"
    ))
    .bind(page_id)
    .bind(is_active)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row.into())
}

/// Deletes a competitor. Its ads and their snapshots cascade with it.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no competitor has this page id.
pub async fn delete_competitor(pool: &PgPool, page_id: &str) -> Result<Competitor, DbError> {
    let row = sqlx::query_as::<_, CompetitorRow>(&format!(
        "DELETE FROM competitors WHERE page_id = $1 RETURNING {COLUMNS}"
    ))
    .bind(page_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row.into())
}
