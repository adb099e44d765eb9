//! Run orchestration.
//!
//! A run walks the selected competitors strictly one at a time. Each
//! competitor gets up to `max_attempts` scrape attempts; a competitor that
//! exhausts them is counted as failed and the run moves on. Persistence
//! failures end the run as `failed`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adwatch_core::{AppConfig, Competitor, NewScrapeError, RunCounters, RunKind, ScrapeRun};
use adwatch_scraper::{AdScraper, ScraperError};
use chrono::{DateTime, Utc};

use crate::error::{error_chain, EngineError};
use crate::media::{sanitize_segment, MediaStore};
use crate::reconciler::reconcile;
use crate::retry::{DelayRange, Pause, RetryPolicy, TokioPause};
use crate::store::AdStore;

/// Which competitors a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompetitorSelector {
    /// Every active competitor.
    All,
    /// One page id. Ignored with a warning unless that competitor is active.
    One(String),
}

/// Tunables for one controller, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub retry: RetryPolicy,
    pub competitor_delay: DelayRange,
    pub media_concurrency: usize,
    pub screenshot_dir: PathBuf,
}

impl RunSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            retry: RetryPolicy::fixed(
                config.max_retries,
                Duration::from_secs(config.retry_delay_secs),
            ),
            competitor_delay: DelayRange::new(
                Duration::from_secs(config.min_competitor_delay_secs),
                Duration::from_secs(config.max_competitor_delay_secs),
            ),
            media_concurrency: config.media_concurrency,
            screenshot_dir: config.screenshot_dir.clone(),
        }
    }
}

/// Per-competitor result of a successful [`RunController::process_competitor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompetitorReport {
    pub attempts: u32,
    pub found: usize,
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    pub media_downloaded: usize,
}

pub struct RunController {
    store: Arc<dyn AdStore>,
    scraper: Arc<dyn AdScraper>,
    media: MediaStore,
    settings: RunSettings,
    pause: Arc<dyn Pause>,
    clock: fn() -> DateTime<Utc>,
}

impl RunController {
    #[must_use]
    pub fn new(
        store: Arc<dyn AdStore>,
        scraper: Arc<dyn AdScraper>,
        media: MediaStore,
        settings: RunSettings,
    ) -> Self {
        Self {
            store,
            scraper,
            media,
            settings,
            pause: Arc::new(TokioPause),
            clock: Utc::now,
        }
    }

    /// Builds a controller with a fresh [`MediaStore`] and settings taken
    /// from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::HttpClient`] if the media HTTP client cannot be
    /// built.
    pub fn from_config(
        store: Arc<dyn AdStore>,
        scraper: Arc<dyn AdScraper>,
        config: &AppConfig,
    ) -> Result<Self, EngineError> {
        let media = MediaStore::new(
            &config.media_base_path,
            Duration::from_secs(config.media_timeout_secs),
            &config.user_agent,
        )?;
        Ok(Self::new(store, scraper, media, RunSettings::from_config(config)))
    }

    /// Replaces the sleeper used for jitter and retry delays.
    #[must_use]
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    /// Replaces the wall clock used for processing dates.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Inserts a new `running` run with zeroed counters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the run cannot be persisted.
    pub async fn start_run(
        &self,
        kind: RunKind,
        metadata: &serde_json::Value,
    ) -> Result<ScrapeRun, EngineError> {
        let run = self.store.create_run(kind, metadata).await?;
        tracing::info!(run_id = run.id, run_type = %kind, "scrape run started");
        Ok(run)
    }

    /// Processes every selected competitor and finalizes `run`.
    ///
    /// Counters are committed after each competitor. The run ends
    /// `completed` when the loop finishes, even if some competitors failed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on any persistence failure, after
    /// marking the run `failed` on a best-effort basis.
    pub async fn execute(
        &self,
        run: &ScrapeRun,
        selector: &CompetitorSelector,
    ) -> Result<RunCounters, EngineError> {
        let mut counters = RunCounters::default();

        if let Err(err) = self.run_loop(run, selector, &mut counters).await {
            tracing::error!(run_id = run.id, error = %err, "scrape run failed");
            self.fail_run_best_effort(run.id, &counters).await;
            return Err(err);
        }

        if let Err(err) = self.store.complete_run(run.id, &counters).await {
            tracing::error!(run_id = run.id, error = %err, "failed to complete scrape run");
            self.fail_run_best_effort(run.id, &counters).await;
            return Err(err.into());
        }

        tracing::info!(
            run_id = run.id,
            processed = counters.competitors_processed,
            failed = counters.competitors_failed,
            ads_found = counters.ads_found,
            ads_new = counters.ads_new,
            ads_updated = counters.ads_updated,
            ads_deleted = counters.ads_deleted,
            media_downloaded = counters.media_downloaded,
            errors = counters.errors_count,
            "scrape run completed"
        );
        Ok(counters)
    }

    async fn run_loop(
        &self,
        run: &ScrapeRun,
        selector: &CompetitorSelector,
        counters: &mut RunCounters,
    ) -> Result<(), EngineError> {
        let competitors = match selector {
            CompetitorSelector::All => self.store.active_competitors(None).await?,
            CompetitorSelector::One(page_id) => {
                let found = self.store.active_competitors(Some(page_id)).await?;
                if found.is_empty() {
                    tracing::warn!(page_id = %page_id, "competitor is unknown or inactive; nothing to scrape");
                }
                found
            }
        };

        counters.competitors_total = saturating_i32(competitors.len());
        self.store.update_run_counters(run.id, counters).await?;

        for (idx, competitor) in competitors.iter().enumerate() {
            if idx > 0 {
                let delay = self.settings.competitor_delay.sample();
                tracing::debug!(
                    delay_secs = delay.as_secs_f64(),
                    "pausing before next competitor"
                );
                self.pause.pause(delay).await;
            }

            match self.process_competitor(run, competitor, counters).await {
                Ok(report) => {
                    counters.competitors_processed += 1;
                    tracing::info!(
                        page_id = %competitor.page_id,
                        page_name = %competitor.page_name,
                        attempts = report.attempts,
                        found = report.found,
                        new = report.new,
                        updated = report.updated,
                        deleted = report.deleted,
                        media = report.media_downloaded,
                        "competitor processed"
                    );
                }
                Err(err @ EngineError::ScrapeFailed { .. }) => {
                    counters.competitors_failed += 1;
                    tracing::error!(
                        page_id = %competitor.page_id,
                        error = %err,
                        "competitor failed; continuing with the next one"
                    );
                }
                Err(err) => return Err(err),
            }

            self.store.update_run_counters(run.id, counters).await?;
        }

        Ok(())
    }

    /// Scrapes, reconciles and downloads media for one competitor.
    ///
    /// Every failed attempt is recorded as a scrape error and counted in
    /// `counters.errors_count`. Ad and media counters are only accumulated
    /// on success.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScrapeFailed`] once all attempts failed, or
    /// [`EngineError::Store`] on a persistence failure.
    pub async fn process_competitor(
        &self,
        run: &ScrapeRun,
        competitor: &Competitor,
        counters: &mut RunCounters,
    ) -> Result<CompetitorReport, EngineError> {
        let page_id = competitor.page_id.as_str();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(page_id, attempt, "scraping competitor");

            let err = match self.scraper.scrape_competitor(page_id).await {
                Ok(records) => {
                    return self
                        .ingest(run, competitor, &records, attempt, counters)
                        .await;
                }
                Err(err) => err,
            };

            tracing::warn!(
                page_id,
                attempt,
                max_attempts = self.settings.retry.max_attempts(),
                error_type = err.kind(),
                error = %err,
                "scrape attempt failed"
            );
            self.record_failure(run, page_id, &err, attempt).await?;
            counters.errors_count += 1;

            if !self.settings.retry.should_retry(attempt) {
                return Err(EngineError::ScrapeFailed {
                    page_id: page_id.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
            self.pause.pause(self.settings.retry.delay_after(attempt)).await;
        }
    }

    async fn ingest(
        &self,
        run: &ScrapeRun,
        competitor: &Competitor,
        records: &[adwatch_core::RawAdRecord],
        attempts: u32,
        counters: &mut RunCounters,
    ) -> Result<CompetitorReport, EngineError> {
        let outcome = reconcile(
            self.store.as_ref(),
            competitor,
            run,
            records,
            (self.clock)(),
        )
        .await?;

        add(&mut counters.ads_found, outcome.found);
        add(&mut counters.ads_new, outcome.new);
        add(&mut counters.ads_updated, outcome.updated);
        add(&mut counters.ads_deleted, outcome.deleted);

        let mut media_downloaded = 0;
        if !outcome.new_ads.is_empty() {
            let batch = self
                .media
                .download_batch(&outcome.new_ads, self.settings.media_concurrency)
                .await;
            for item in &batch.outcomes {
                if let Some(path) = item.outcome.media_path() {
                    self.store
                        .set_local_media(&item.ad_id, &path.to_string_lossy())
                        .await?;
                }
            }
            media_downloaded = batch.success;
            add(&mut counters.media_downloaded, batch.success);
        }

        Ok(CompetitorReport {
            attempts,
            found: outcome.found,
            new: outcome.new,
            updated: outcome.updated,
            deleted: outcome.deleted,
            media_downloaded,
        })
    }

    /// Persists one failed attempt. Diagnostic capture is best effort and
    /// never replaces the scrape error.
    async fn record_failure(
        &self,
        run: &ScrapeRun,
        page_id: &str,
        err: &ScraperError,
        attempt: u32,
    ) -> Result<(), EngineError> {
        let path = diagnostic_path(
            &self.settings.screenshot_dir,
            page_id,
            self.scraper.diagnostic_extension(),
            (self.clock)(),
        );
        let screenshot_path = match self.scraper.capture_diagnostic(&path).await {
            Ok(()) => Some(path.display().to_string()),
            Err(capture_err) => {
                tracing::debug!(page_id, error = %capture_err, "diagnostic capture skipped");
                None
            }
        };

        let record = NewScrapeError {
            scrape_run_id: run.id,
            page_id: page_id.to_string(),
            error_type: err.kind().to_string(),
            error_message: err.to_string(),
            detail: Some(error_chain(err)),
            screenshot_path,
            page_url: self.scraper.current_url(),
            retry_count: i32::try_from(attempt).unwrap_or(i32::MAX),
        };
        self.store.insert_scrape_error(&record).await?;
        Ok(())
    }

    async fn fail_run_best_effort(&self, run_id: i64, counters: &RunCounters) {
        if let Err(err) = self.store.fail_run(run_id, counters).await {
            tracing::error!(run_id, error = %err, "failed to mark scrape run as failed");
        }
    }
}

/// `<dir>/<page_id>_<YYYYmmdd_HHMMSS>.<extension>`
fn diagnostic_path(dir: &Path, page_id: &str, extension: &str, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "{}_{}.{extension}",
        sanitize_segment(page_id),
        now.format("%Y%m%d_%H%M%S")
    ))
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn add(counter: &mut i32, n: usize) {
    *counter = counter.saturating_add(saturating_i32(n));
}
