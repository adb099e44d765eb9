//! Persistence seam for the engine.
//!
//! [`AdStore`] is implemented by [`PgStore`] (Postgres, used by the CLI) and
//! by [`crate::MemoryStore`] (tests). Every method maps to one query; there is
//! no lazy loading and no caching behind the trait.

use std::collections::HashMap;

use adwatch_core::{
    Ad, AdSnapshot, Competitor, NewScrapeError, RunCounters, RunKind, ScoreBreakdown, ScrapeRun,
};
use adwatch_db::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[async_trait]
pub trait AdStore: Send + Sync {
    // -- competitors --------------------------------------------------------

    /// Active competitors ordered by name then page id, optionally narrowed
    /// to one page id.
    async fn active_competitors(&self, page_id: Option<&str>) -> Result<Vec<Competitor>, DbError>;

    // -- ads ----------------------------------------------------------------

    async fn get_ad(&self, ad_id: &str) -> Result<Option<Ad>, DbError>;

    /// All ads in insertion order.
    async fn list_ads(&self) -> Result<Vec<Ad>, DbError>;

    async fn active_ad_ids(&self, page_id: &str) -> Result<Vec<String>, DbError>;

    async fn insert_ad(&self, ad: &Ad) -> Result<(), DbError>;

    async fn update_ad(&self, ad: &Ad) -> Result<(), DbError>;

    async fn deactivate_ads(&self, ad_ids: &[String], seen_at: DateTime<Utc>)
        -> Result<u64, DbError>;

    async fn set_local_media(&self, ad_id: &str, path: &str) -> Result<(), DbError>;

    async fn update_ad_score(
        &self,
        ad_id: &str,
        breakdown: &ScoreBreakdown,
        snapshot_count: i32,
        scaling_cluster_id: Option<&str>,
    ) -> Result<(), DbError>;

    // -- snapshots ----------------------------------------------------------

    /// Returns `false` when a snapshot for this (ad, run) already exists.
    async fn insert_snapshot(&self, snapshot: &AdSnapshot) -> Result<bool, DbError>;

    async fn snapshot_counts(&self) -> Result<HashMap<String, i64>, DbError>;

    // -- runs ---------------------------------------------------------------

    async fn create_run(
        &self,
        run_type: RunKind,
        metadata: &serde_json::Value,
    ) -> Result<ScrapeRun, DbError>;

    async fn update_run_counters(&self, run_id: i64, counters: &RunCounters)
        -> Result<(), DbError>;

    async fn complete_run(&self, run_id: i64, counters: &RunCounters) -> Result<(), DbError>;

    async fn fail_run(&self, run_id: i64, counters: &RunCounters) -> Result<(), DbError>;

    async fn insert_scrape_error(&self, error: &NewScrapeError) -> Result<(), DbError>;
}

/// [`AdStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AdStore for PgStore {
    async fn active_competitors(&self, page_id: Option<&str>) -> Result<Vec<Competitor>, DbError> {
        adwatch_db::list_active_competitors(&self.pool, page_id).await
    }

    async fn get_ad(&self, ad_id: &str) -> Result<Option<Ad>, DbError> {
        adwatch_db::get_ad(&self.pool, ad_id).await
    }

    async fn list_ads(&self) -> Result<Vec<Ad>, DbError> {
        adwatch_db::list_ads(&self.pool).await
    }

    async fn active_ad_ids(&self, page_id: &str) -> Result<Vec<String>, DbError> {
        adwatch_db::active_ad_ids(&self.pool, page_id).await
    }

    async fn insert_ad(&self, ad: &Ad) -> Result<(), DbError> {
        adwatch_db::insert_ad(&self.pool, ad).await
    }

    async fn update_ad(&self, ad: &Ad) -> Result<(), DbError> {
        adwatch_db::update_ad(&self.pool, ad).await
    }

    async fn deactivate_ads(
        &self,
        ad_ids: &[String],
        seen_at: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        adwatch_db::deactivate_ads(&self.pool, ad_ids, seen_at).await
    }

    async fn set_local_media(&self, ad_id: &str, path: &str) -> Result<(), DbError> {
        adwatch_db::set_local_media(&self.pool, ad_id, path).await
    }

    async fn update_ad_score(
        &self,
        ad_id: &str,
        breakdown: &ScoreBreakdown,
        snapshot_count: i32,
        scaling_cluster_id: Option<&str>,
    ) -> Result<(), DbError> {
        adwatch_db::update_ad_score(
            &self.pool,
            ad_id,
            breakdown,
            snapshot_count,
            scaling_cluster_id,
        )
        .await
    }

    async fn insert_snapshot(&self, snapshot: &AdSnapshot) -> Result<bool, DbError> {
        adwatch_db::insert_snapshot(&self.pool, snapshot).await
    }

    async fn snapshot_counts(&self) -> Result<HashMap<String, i64>, DbError> {
        adwatch_db::snapshot_counts(&self.pool).await
    }

    async fn create_run(
        &self,
        run_type: RunKind,
        metadata: &serde_json::Value,
    ) -> Result<ScrapeRun, DbError> {
        adwatch_db::create_scrape_run(&self.pool, run_type, metadata).await
    }

    async fn update_run_counters(
        &self,
        run_id: i64,
        counters: &RunCounters,
    ) -> Result<(), DbError> {
        adwatch_db::update_run_counters(&self.pool, run_id, counters).await
    }

    async fn complete_run(&self, run_id: i64, counters: &RunCounters) -> Result<(), DbError> {
        adwatch_db::complete_scrape_run(&self.pool, run_id, counters).await
    }

    async fn fail_run(&self, run_id: i64, counters: &RunCounters) -> Result<(), DbError> {
        adwatch_db::fail_scrape_run(&self.pool, run_id, counters).await
    }

    async fn insert_scrape_error(&self, error: &NewScrapeError) -> Result<(), DbError> {
        adwatch_db::insert_scrape_error(&self.pool, error)
            .await
            .map(|_| ())
    }
}
