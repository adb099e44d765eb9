//! In-memory [`AdStore`] for tests and dry runs.
//!
//! Mirrors the Postgres constraints the engine relies on: unique ad ids,
//! one snapshot per (ad, run) and guarded run transitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use adwatch_core::{
    Ad, AdSnapshot, Competitor, NewScrapeError, RunCounters, RunKind, RunStatus, ScoreBreakdown,
    ScrapeRun,
};
use adwatch_db::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::store::AdStore;

#[derive(Debug, Default)]
struct State {
    competitors: Vec<Competitor>,
    ads: Vec<Ad>,
    snapshots: Vec<AdSnapshot>,
    runs: Vec<ScrapeRun>,
    errors: Vec<NewScrapeError>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_ad_writes: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a competitor. Replaces any existing entry with the same page id.
    pub fn add_competitor(&self, page_id: &str, page_name: &str, is_active: bool) {
        let now = Utc::now();
        let mut state = self.lock();
        state.competitors.retain(|c| c.page_id != page_id);
        state.competitors.push(Competitor {
            page_id: page_id.to_string(),
            page_name: page_name.to_string(),
            is_active,
            created_at: now,
            updated_at: now,
        });
    }

    /// Makes every subsequent ad insert/update fail like a lost connection.
    pub fn fail_ad_writes(&self, fail: bool) {
        self.fail_ad_writes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn ads(&self) -> Vec<Ad> {
        self.lock().ads.clone()
    }

    #[must_use]
    pub fn ad(&self, ad_id: &str) -> Option<Ad> {
        self.lock().ads.iter().find(|a| a.ad_id == ad_id).cloned()
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<AdSnapshot> {
        self.lock().snapshots.clone()
    }

    #[must_use]
    pub fn runs(&self) -> Vec<ScrapeRun> {
        self.lock().runs.clone()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<NewScrapeError> {
        self.lock().errors.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_ad_writes(&self) -> Result<(), DbError> {
        if self.fail_ad_writes.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn finish(
        &self,
        run_id: i64,
        counters: &RunCounters,
        status: Option<RunStatus>,
    ) -> Result<(), DbError> {
        let mut state = self.lock();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == RunStatus::Running)
            .ok_or(DbError::InvalidRunTransition {
                id: run_id,
                expected_status: "running",
            })?;
        run.counters = *counters;
        if let Some(status) = status {
            run.status = status;
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl AdStore for MemoryStore {
    async fn active_competitors(&self, page_id: Option<&str>) -> Result<Vec<Competitor>, DbError> {
        let mut competitors: Vec<Competitor> = self
            .lock()
            .competitors
            .iter()
            .filter(|c| c.is_active && page_id.map_or(true, |id| c.page_id == id))
            .cloned()
            .collect();
        competitors.sort_by(|a, b| {
            a.page_name
                .cmp(&b.page_name)
                .then_with(|| a.page_id.cmp(&b.page_id))
        });
        Ok(competitors)
    }

    async fn get_ad(&self, ad_id: &str) -> Result<Option<Ad>, DbError> {
        Ok(self.ad(ad_id))
    }

    async fn list_ads(&self) -> Result<Vec<Ad>, DbError> {
        Ok(self.ads())
    }

    async fn active_ad_ids(&self, page_id: &str) -> Result<Vec<String>, DbError> {
        Ok(self
            .lock()
            .ads
            .iter()
            .filter(|a| a.page_id == page_id && a.is_active)
            .map(|a| a.ad_id.clone())
            .collect())
    }

    async fn insert_ad(&self, ad: &Ad) -> Result<(), DbError> {
        self.check_ad_writes()?;
        let mut state = self.lock();
        if state.ads.iter().any(|a| a.ad_id == ad.ad_id) {
            return Err(DbError::AlreadyExists {
                entity: "ad",
                key: ad.ad_id.clone(),
            });
        }
        let mut stored = ad.clone();
        stored.snapshot_count = stored.snapshot_count.max(1);
        state.ads.push(stored);
        Ok(())
    }

    async fn update_ad(&self, ad: &Ad) -> Result<(), DbError> {
        self.check_ad_writes()?;
        let mut state = self.lock();
        let existing = state
            .ads
            .iter_mut()
            .find(|a| a.ad_id == ad.ad_id)
            .ok_or(DbError::NotFound)?;

        // Same column set as the Postgres writer: scoring and media columns
        // are left alone.
        existing.page_name.clone_from(&ad.page_name);
        existing.ad_text.clone_from(&ad.ad_text);
        existing.started_running_on = ad.started_running_on;
        existing.is_active = ad.is_active;
        existing.has_low_impressions = ad.has_low_impressions;
        existing.media_type = ad.media_type;
        existing.media_url.clone_from(&ad.media_url);
        existing.thumbnail_url.clone_from(&ad.thumbnail_url);
        existing.cta_type.clone_from(&ad.cta_type);
        existing.landing_page_url.clone_from(&ad.landing_page_url);
        existing.platforms.clone_from(&ad.platforms);
        existing.regions.clone_from(&ad.regions);
        existing.last_seen_at = ad.last_seen_at;
        existing.days_running = ad.days_running;
        Ok(())
    }

    async fn deactivate_ads(
        &self,
        ad_ids: &[String],
        seen_at: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let mut changed = 0;
        for ad in self
            .lock()
            .ads
            .iter_mut()
            .filter(|a| ad_ids.contains(&a.ad_id))
        {
            ad.is_active = false;
            ad.last_seen_at = seen_at;
            changed += 1;
        }
        Ok(changed)
    }

    async fn set_local_media(&self, ad_id: &str, path: &str) -> Result<(), DbError> {
        if let Some(ad) = self.lock().ads.iter_mut().find(|a| a.ad_id == ad_id) {
            ad.local_media_path = Some(path.to_string());
            ad.media_downloaded = true;
        }
        Ok(())
    }

    async fn update_ad_score(
        &self,
        ad_id: &str,
        breakdown: &ScoreBreakdown,
        snapshot_count: i32,
        scaling_cluster_id: Option<&str>,
    ) -> Result<(), DbError> {
        if let Some(ad) = self.lock().ads.iter_mut().find(|a| a.ad_id == ad_id) {
            ad.winner_score = breakdown.total;
            ad.score_breakdown = Some(*breakdown);
            ad.snapshot_count = snapshot_count.max(1);
            ad.scaling_cluster_id = scaling_cluster_id.map(str::to_string);
        }
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: &AdSnapshot) -> Result<bool, DbError> {
        let mut state = self.lock();
        let duplicate = state
            .snapshots
            .iter()
            .any(|s| s.ad_id == snapshot.ad_id && s.scrape_run_id == snapshot.scrape_run_id);
        if duplicate {
            return Ok(false);
        }
        state.snapshots.push(snapshot.clone());
        Ok(true)
    }

    async fn snapshot_counts(&self) -> Result<HashMap<String, i64>, DbError> {
        let mut counts = HashMap::new();
        for snapshot in &self.lock().snapshots {
            *counts.entry(snapshot.ad_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn create_run(
        &self,
        run_type: RunKind,
        metadata: &serde_json::Value,
    ) -> Result<ScrapeRun, DbError> {
        let mut state = self.lock();
        let id = i64::try_from(state.runs.len()).unwrap_or(i64::MAX) + 1;
        let run = ScrapeRun {
            id,
            run_type,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            counters: RunCounters::default(),
            metadata: metadata.clone(),
        };
        state.runs.push(run.clone());
        Ok(run)
    }

    async fn update_run_counters(
        &self,
        run_id: i64,
        counters: &RunCounters,
    ) -> Result<(), DbError> {
        self.finish(run_id, counters, None)
    }

    async fn complete_run(&self, run_id: i64, counters: &RunCounters) -> Result<(), DbError> {
        self.finish(run_id, counters, Some(RunStatus::Completed))
    }

    async fn fail_run(&self, run_id: i64, counters: &RunCounters) -> Result<(), DbError> {
        self.finish(run_id, counters, Some(RunStatus::Failed))
    }

    async fn insert_scrape_error(&self, error: &NewScrapeError) -> Result<(), DbError> {
        self.lock().errors.push(error.clone());
        Ok(())
    }
}
