//! End-to-end tests for `RunController` over the in-memory store.
//!
//! The scraper is scripted per page id, sleeping is recorded instead of
//! performed, and the clock is pinned so processing dates are stable.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adwatch_core::{RawAdRecord, RunKind, RunStatus};
use adwatch_engine::{
    AdStore, CompetitorSelector, DelayRange, EngineError, MediaStore, MemoryStore, Pause,
    RetryPolicy, RunController, RunSettings,
};
use adwatch_scraper::{AdScraper, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

type Reply = Result<Vec<RawAdRecord>, ScraperError>;

#[derive(Default)]
struct ScriptedScraper {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedScraper {
    fn reply(&self, page_id: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(page_id.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdScraper for ScriptedScraper {
    async fn scrape_competitor(&self, page_id: &str) -> Result<Vec<RawAdRecord>, ScraperError> {
        self.calls.lock().unwrap().push(page_id.to_string());
        self.replies
            .lock()
            .unwrap()
            .get_mut(page_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn capture_diagnostic(&self, path: &Path) -> Result<(), ScraperError> {
        let io = |source: std::io::Error| ScraperError::Diagnostic {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(path, b"last response").map_err(io)
    }

    fn diagnostic_extension(&self) -> &'static str {
        "html"
    }

    fn current_url(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|page_id| format!("https://ads.example.com/pages/{page_id}/ads"))
    }
}

#[derive(Default)]
struct RecordingPause {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const RETRY_DELAY: Duration = Duration::from_secs(5);

fn pinned_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 15, 9, 0, 0).unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    scraper: Arc<ScriptedScraper>,
    pause: Arc<RecordingPause>,
    controller: RunController,
    dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let scraper = Arc::new(ScriptedScraper::default());
    let pause = Arc::new(RecordingPause::default());

    let media = MediaStore::new(
        dir.path().join("media"),
        Duration::from_secs(5),
        "adwatch-test/0.1",
    )
    .unwrap();
    let settings = RunSettings {
        retry: RetryPolicy::fixed(3, RETRY_DELAY),
        competitor_delay: DelayRange::new(Duration::from_secs(30), Duration::from_secs(60)),
        media_concurrency: 2,
        screenshot_dir: dir.path().join("screenshots"),
    };
    let controller = RunController::new(
        Arc::clone(&store) as Arc<dyn AdStore>,
        Arc::clone(&scraper) as Arc<dyn AdScraper>,
        media,
        settings,
    )
    .with_pause(Arc::clone(&pause) as Arc<dyn Pause>)
    .with_clock(pinned_now);

    Harness {
        store,
        scraper,
        pause,
        controller,
        dir,
    }
}

fn record(page_id: &str, ad_id: &str) -> RawAdRecord {
    RawAdRecord {
        ad_id: Some(ad_id.to_string()),
        ad_text: Some(format!("creative {ad_id}")),
        ..RawAdRecord::new(page_id)
    }
}

fn unavailable(page_id: &str) -> Reply {
    Err(ScraperError::UnexpectedStatus {
        status: 503,
        url: format!("https://ads.example.com/pages/{page_id}/ads"),
    })
}

async fn run_all(h: &Harness) -> Result<adwatch_core::RunCounters, EngineError> {
    let run = h
        .controller
        .start_run(RunKind::Full, &serde_json::json!({"cli_args": {}}))
        .await
        .unwrap();
    h.controller.execute(&run, &CompetitorSelector::All).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_run_creates_running_run_with_zero_counters() {
    let h = harness();
    let run = h
        .controller
        .start_run(RunKind::Backfill, &serde_json::json!({"cli_args": {"backfill": true}}))
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.run_type, RunKind::Backfill);
    assert_eq!(run.counters, adwatch_core::RunCounters::default());
    assert_eq!(run.metadata["cli_args"]["backfill"], true);
}

#[tokio::test]
async fn failing_competitor_does_not_stop_the_run() {
    let h = harness();
    h.store.add_competitor("pg_a", "Alpha", true);
    h.store.add_competitor("pg_b", "Beta", true);
    h.scraper
        .reply("pg_a", unavailable("pg_a"))
        .reply("pg_a", unavailable("pg_a"))
        .reply("pg_a", unavailable("pg_a"))
        .reply("pg_b", Ok(vec![record("pg_b", "b1"), record("pg_b", "b2")]));

    let counters = run_all(&h).await.unwrap();

    assert_eq!(counters.competitors_total, 2);
    assert_eq!(counters.competitors_processed, 1);
    assert_eq!(counters.competitors_failed, 1);
    assert_eq!(counters.errors_count, 3);
    assert_eq!(counters.ads_found, 2);
    assert_eq!(counters.ads_new, 2);
    assert_eq!(h.scraper.calls(), vec!["pg_a", "pg_a", "pg_a", "pg_b"]);

    let runs = h.store.runs();
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert!(runs[0].completed_at.is_some());
    assert_eq!(runs[0].counters, counters);
}

#[tokio::test]
async fn every_failed_attempt_is_recorded() {
    let h = harness();
    h.store.add_competitor("pg_a", "Alpha", true);
    h.scraper
        .reply("pg_a", unavailable("pg_a"))
        .reply("pg_a", unavailable("pg_a"))
        .reply("pg_a", unavailable("pg_a"));

    run_all(&h).await.unwrap();

    let errors = h.store.errors();
    assert_eq!(errors.len(), 3);
    let ordinals: Vec<i32> = errors.iter().map(|e| e.retry_count).collect();
    assert_eq!(ordinals, vec![1, 2, 3]);

    let first = &errors[0];
    assert_eq!(first.page_id, "pg_a");
    assert_eq!(first.error_type, "http_status");
    assert!(first.error_message.contains("503"));
    assert!(first.detail.is_some());
    assert_eq!(
        first.page_url.as_deref(),
        Some("https://ads.example.com/pages/pg_a/ads")
    );

    let shot = first.screenshot_path.as_deref().unwrap();
    assert!(shot.ends_with("pg_a_20260215_090000.html"), "got {shot}");
    assert!(h.dir.path().join("screenshots/pg_a_20260215_090000.html").exists());
}

#[tokio::test]
async fn retry_succeeds_on_second_attempt() {
    let h = harness();
    h.store.add_competitor("pg_a", "Alpha", true);
    h.scraper
        .reply("pg_a", unavailable("pg_a"))
        .reply("pg_a", Ok(vec![record("pg_a", "a1")]));

    let counters = run_all(&h).await.unwrap();

    assert_eq!(counters.competitors_processed, 1);
    assert_eq!(counters.competitors_failed, 0);
    assert_eq!(counters.errors_count, 1);
    assert_eq!(counters.ads_new, 1);
    assert_eq!(h.pause.pauses(), vec![RETRY_DELAY]);
}

#[tokio::test]
async fn jitter_only_between_competitors() {
    let h = harness();
    for (id, name) in [("pg_c", "Gamma"), ("pg_a", "Alpha"), ("pg_b", "Beta")] {
        h.store.add_competitor(id, name, true);
    }

    run_all(&h).await.unwrap();

    assert_eq!(h.scraper.calls(), vec!["pg_a", "pg_b", "pg_c"]);
    let pauses = h.pause.pauses();
    assert_eq!(pauses.len(), 2);
    assert!(pauses
        .iter()
        .all(|d| *d >= Duration::from_secs(30) && *d <= Duration::from_secs(60)));
}

#[tokio::test]
async fn single_competitor_selector() {
    let h = harness();
    h.store.add_competitor("pg_a", "Alpha", true);
    h.store.add_competitor("pg_b", "Beta", true);
    h.scraper.reply("pg_b", Ok(vec![record("pg_b", "b1")]));

    let run = h
        .controller
        .start_run(RunKind::Single, &serde_json::json!({}))
        .await
        .unwrap();
    let counters = h
        .controller
        .execute(&run, &CompetitorSelector::One("pg_b".to_string()))
        .await
        .unwrap();

    assert_eq!(counters.competitors_total, 1);
    assert_eq!(h.scraper.calls(), vec!["pg_b"]);
    assert!(h.pause.pauses().is_empty());
}

#[tokio::test]
async fn inactive_single_competitor_completes_empty() {
    let h = harness();
    h.store.add_competitor("pg_a", "Alpha", false);

    let run = h
        .controller
        .start_run(RunKind::Single, &serde_json::json!({}))
        .await
        .unwrap();
    let counters = h
        .controller
        .execute(&run, &CompetitorSelector::One("pg_a".to_string()))
        .await
        .unwrap();

    assert_eq!(counters.competitors_total, 0);
    assert!(h.scraper.calls().is_empty());
    assert_eq!(h.store.runs()[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn second_run_updates_and_soft_deletes() {
    let h = harness();
    h.store.add_competitor("pg_a", "Alpha", true);
    h.scraper
        .reply(
            "pg_a",
            Ok(vec![
                record("pg_a", "A"),
                record("pg_a", "B"),
                record("pg_a", "C"),
            ]),
        )
        .reply("pg_a", Ok(vec![record("pg_a", "A"), record("pg_a", "C")]));

    run_all(&h).await.unwrap();
    let counters = run_all(&h).await.unwrap();

    assert_eq!(counters.ads_found, 2);
    assert_eq!(counters.ads_new, 0);
    assert_eq!(counters.ads_updated, 2);
    assert_eq!(counters.ads_deleted, 1);
    assert!(!h.store.ad("B").unwrap().is_active);
    assert_eq!(h.store.snapshots().len(), 5);
}

#[tokio::test]
async fn persistence_failure_marks_run_failed() {
    let h = harness();
    h.store.add_competitor("pg_a", "Alpha", true);
    h.scraper.reply("pg_a", Ok(vec![record("pg_a", "a1")]));
    h.store.fail_ad_writes(true);

    let err = run_all(&h).await.unwrap_err();

    assert!(matches!(err, EngineError::Store(_)), "got {err:?}");
    let run = &h.store.runs()[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
    assert_eq!(run.counters.competitors_total, 1);
    assert_eq!(run.counters.competitors_processed, 0);
}

#[tokio::test]
async fn new_ads_get_local_media() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/v/clip.mp4"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(b"video".as_slice()))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.store.add_competitor("pg_a", "Alpha", true);
    let url = format!("{}/v/clip.mp4", server.uri());
    let mut first = record("pg_a", "a1");
    first.media_url = Some(url.clone());
    let mut second = record("pg_a", "a2");
    second.media_url = Some(url);
    let third = record("pg_a", "a3");
    h.scraper.reply("pg_a", Ok(vec![first, second, third]));

    let counters = run_all(&h).await.unwrap();

    assert_eq!(counters.media_downloaded, 2);
    let a1 = h.store.ad("a1").unwrap();
    let a2 = h.store.ad("a2").unwrap();
    assert!(a1.media_downloaded);
    assert_eq!(a1.local_media_path, a2.local_media_path);
    assert!(a1
        .local_media_path
        .as_deref()
        .unwrap()
        .ends_with("/media.mp4"));
    assert!(!h.store.ad("a3").unwrap().media_downloaded);
}
