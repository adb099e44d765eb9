//! Live integration tests for adwatch-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/adwatch-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use adwatch_core::{
    Ad, AdSnapshot, MediaType, NewScrapeError, RunCounters, RunKind, RunStatus, ScoreBreakdown,
};
use adwatch_db::{
    abandon_stale_runs, active_ad_ids, ad_totals, ads_by_competitor, complete_scrape_run,
    create_scrape_run, deactivate_ads, delete_competitor, fail_scrape_run, get_ad,
    get_competitor, get_scrape_run, insert_ad, insert_competitor, insert_scrape_error,
    insert_snapshot, list_active_competitors, list_ads, list_recent_errors, set_competitor_active,
    set_local_media, snapshot_counts, update_ad, update_ad_score, update_run_counters, DbError,
};
use chrono::{Duration, NaiveDate, Utc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_ad(ad_id: &str, page_id: &str) -> Ad {
    let now = Utc::now();
    Ad {
        ad_id: ad_id.to_string(),
        page_id: page_id.to_string(),
        page_name: Some("Acme".to_string()),
        ad_text: Some("Buy now".to_string()),
        started_running_on: NaiveDate::from_ymd_opt(2026, 1, 1),
        is_active: true,
        has_low_impressions: false,
        media_type: Some(MediaType::Video),
        media_url: Some("https://cdn.example.com/v.mp4".to_string()),
        thumbnail_url: None,
        cta_type: None,
        landing_page_url: Some("https://acme.example.com".to_string()),
        platforms: vec!["facebook".to_string(), "instagram".to_string()],
        regions: vec![],
        first_seen_at: now,
        last_seen_at: now,
        days_running: 45,
        media_downloaded: false,
        local_media_path: None,
        winner_score: 0,
        score_breakdown: None,
        scaling_cluster_id: None,
        snapshot_count: 1,
    }
}

fn make_snapshot(ad_id: &str, run_id: i64) -> AdSnapshot {
    AdSnapshot {
        ad_id: ad_id.to_string(),
        snapshot_date: NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
        scrape_run_id: run_id,
        is_active: true,
        has_low_impressions: false,
        ad_text: Some("Buy now".to_string()),
        media_url: None,
        landing_page_url: None,
        platforms: vec![],
        regions: vec![],
        raw_data: serde_json::json!({"ad_id": ad_id, "started_running_on": "2026-01-01"}),
    }
}

async fn seed_competitor(pool: &sqlx::PgPool, page_id: &str, page_name: &str) {
    insert_competitor(pool, page_id, page_name)
        .await
        .unwrap_or_else(|e| panic!("insert_competitor failed for '{page_id}': {e}"));
}

// ---------------------------------------------------------------------------
// Section 1: Competitors
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn active_competitors_are_ordered_by_name(pool: sqlx::PgPool) {
    seed_competitor(&pool, "pg_2", "Zeta").await;
    seed_competitor(&pool, "pg_1", "Alpha").await;
    seed_competitor(&pool, "pg_3", "Mid").await;
    set_competitor_active(&pool, "pg_3", false)
        .await
        .expect("deactivate failed");

    let all = list_active_competitors(&pool, None)
        .await
        .expect("list_active_competitors failed");
    let ids: Vec<&str> = all.iter().map(|c| c.page_id.as_str()).collect();
    assert_eq!(ids, vec!["pg_1", "pg_2"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn single_selector_excludes_inactive_competitor(pool: sqlx::PgPool) {
    seed_competitor(&pool, "pg_1", "Alpha").await;
    set_competitor_active(&pool, "pg_1", false)
        .await
        .expect("deactivate failed");

    let selected = list_active_competitors(&pool, Some("pg_1"))
        .await
        .expect("list_active_competitors failed");
    assert!(selected.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_competitor_is_already_exists(pool: sqlx::PgPool) {
    seed_competitor(&pool, "pg_1", "Alpha").await;

    let err = insert_competitor(&pool, "pg_1", "Again")
        .await
        .expect_err("duplicate insert should fail");
    assert!(matches!(err, DbError::AlreadyExists { .. }), "got {err:?}");
}

#[sqlx::test(migrations = "../../migrations")]
async fn deleting_competitor_cascades_to_ads(pool: sqlx::PgPool) {
    seed_competitor(&pool, "pg_1", "Alpha").await;
    insert_ad(&pool, &make_ad("100", "pg_1"))
        .await
        .expect("insert_ad failed");

    delete_competitor(&pool, "pg_1")
        .await
        .expect("delete_competitor failed");

    assert!(get_competitor(&pool, "pg_1").await.unwrap().is_none());
    assert!(get_ad(&pool, "100").await.unwrap().is_none());
    assert!(matches!(
        delete_competitor(&pool, "pg_1").await,
        Err(DbError::NotFound)
    ));
}

// ---------------------------------------------------------------------------
// Section 2: Ads and snapshots
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn ad_round_trips_through_insert_and_get(pool: sqlx::PgPool) {
    seed_competitor(&pool, "pg_1", "Alpha").await;
    let ad = make_ad("100", "pg_1");
    insert_ad(&pool, &ad).await.expect("insert_ad failed");

    let stored = get_ad(&pool, "100")
        .await
        .expect("get_ad failed")
        .expect("ad should exist");

    assert_eq!(stored.media_type, Some(MediaType::Video));
    assert_eq!(stored.platforms, ad.platforms);
    assert_eq!(stored.days_running, 45);
    assert_eq!(stored.snapshot_count, 1);
    assert!(stored.score_breakdown.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_of_missing_ad_is_not_found(pool: sqlx::PgPool) {
    let err = update_ad(&pool, &make_ad("nope", "pg_1"))
        .await
        .expect_err("update should fail");
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn deactivate_ads_only_touches_listed_ids(pool: sqlx::PgPool) {
    seed_competitor(&pool, "pg_1", "Alpha").await;
    for id in ["A", "B", "C"] {
        insert_ad(&pool, &make_ad(id, "pg_1")).await.unwrap();
    }

    let changed = deactivate_ads(&pool, &["B".to_string()], Utc::now())
        .await
        .expect("deactivate_ads failed");
    assert_eq!(changed, 1);

    let active = active_ad_ids(&pool, "pg_1").await.unwrap();
    assert_eq!(active, vec!["A".to_string(), "C".to_string()]);
    assert_eq!(deactivate_ads(&pool, &[], Utc::now()).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn snapshot_is_unique_per_ad_and_run(pool: sqlx::PgPool) {
    seed_competitor(&pool, "pg_1", "Alpha").await;
    insert_ad(&pool, &make_ad("100", "pg_1")).await.unwrap();
    let run1 = create_scrape_run(&pool, RunKind::Full, &serde_json::json!({}))
        .await
        .unwrap();
    let run2 = create_scrape_run(&pool, RunKind::Full, &serde_json::json!({}))
        .await
        .unwrap();

    assert!(insert_snapshot(&pool, &make_snapshot("100", run1.id)).await.unwrap());
    assert!(!insert_snapshot(&pool, &make_snapshot("100", run1.id)).await.unwrap());
    assert!(insert_snapshot(&pool, &make_snapshot("100", run2.id)).await.unwrap());

    let counts = snapshot_counts(&pool).await.unwrap();
    assert_eq!(counts.get("100"), Some(&2));
}

#[sqlx::test(migrations = "../../migrations")]
async fn score_update_overwrites_cluster(pool: sqlx::PgPool) {
    seed_competitor(&pool, "pg_1", "Alpha").await;
    insert_ad(&pool, &make_ad("100", "pg_1")).await.unwrap();
    let breakdown = ScoreBreakdown {
        days_running: 25,
        active: 10,
        impressions: 15,
        media_type: 5,
        landing_page: 5,
        consistency: 0,
        total: 60,
    };

    update_ad_score(&pool, "100", &breakdown, 1, Some("cluster_pg_1_1"))
        .await
        .unwrap();
    update_ad_score(&pool, "100", &breakdown, 2, None)
        .await
        .unwrap();
    set_local_media(&pool, "100", "data/media/pg_1/100/media.mp4")
        .await
        .unwrap();

    let ads = list_ads(&pool).await.unwrap();
    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0].winner_score, 60);
    assert_eq!(ads[0].score_breakdown, Some(breakdown));
    assert_eq!(ads[0].snapshot_count, 2);
    assert!(ads[0].scaling_cluster_id.is_none());
    assert!(ads[0].media_downloaded);

    let totals = ad_totals(&pool).await.unwrap();
    assert_eq!(totals.total, 1);
    assert_eq!(totals.winners, 1);
    assert_eq!(totals.clustered, 0);

    let by_competitor = ads_by_competitor(&pool, 10).await.unwrap();
    assert_eq!(by_competitor[0].page_name, "Alpha");
    assert_eq!(by_competitor[0].active, 1);
}

// ---------------------------------------------------------------------------
// Section 3: Run lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn run_lifecycle_running_to_completed(pool: sqlx::PgPool) {
    let run = create_scrape_run(&pool, RunKind::Single, &serde_json::json!({"cli_args": {}}))
        .await
        .expect("create_scrape_run failed");
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.counters, RunCounters::default());

    let counters = RunCounters {
        competitors_total: 1,
        competitors_processed: 1,
        ads_found: 3,
        ads_new: 3,
        ..RunCounters::default()
    };
    update_run_counters(&pool, run.id, &counters).await.unwrap();
    complete_scrape_run(&pool, run.id, &counters).await.unwrap();

    let fetched = get_scrape_run(&pool, run.id).await.unwrap();
    assert_eq!(fetched.status, RunStatus::Completed);
    assert!(fetched.completed_at.is_some());
    assert_eq!(fetched.counters.ads_new, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn finished_run_rejects_further_transitions(pool: sqlx::PgPool) {
    let run = create_scrape_run(&pool, RunKind::Full, &serde_json::json!({}))
        .await
        .unwrap();
    fail_scrape_run(&pool, run.id, &RunCounters::default())
        .await
        .unwrap();

    let err = complete_scrape_run(&pool, run.id, &RunCounters::default())
        .await
        .expect_err("completed after failed should be rejected");
    assert!(
        matches!(err, DbError::InvalidRunTransition { id, .. } if id == run.id),
        "got {err:?}"
    );
    assert_eq!(
        get_scrape_run(&pool, run.id).await.unwrap().status,
        RunStatus::Failed
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_runs_are_abandoned(pool: sqlx::PgPool) {
    let run = create_scrape_run(&pool, RunKind::Full, &serde_json::json!({"cli_args": {}}))
        .await
        .unwrap();

    let none = abandon_stale_runs(&pool, Utc::now() - Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(none, 0);

    let closed = abandon_stale_runs(&pool, Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(closed, 1);

    let fetched = get_scrape_run(&pool, run.id).await.unwrap();
    assert_eq!(fetched.status, RunStatus::Failed);
    assert_eq!(fetched.metadata["abandoned"], serde_json::json!(true));
    assert!(fetched.metadata.get("cli_args").is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn scrape_errors_are_listed_newest_first(pool: sqlx::PgPool) {
    let run = create_scrape_run(&pool, RunKind::Full, &serde_json::json!({}))
        .await
        .unwrap();

    for attempt in 1..=2 {
        insert_scrape_error(
            &pool,
            &NewScrapeError {
                scrape_run_id: run.id,
                page_id: "pg_1".to_string(),
                error_type: "timeout".to_string(),
                error_message: format!("attempt {attempt} timed out"),
                detail: None,
                screenshot_path: None,
                page_url: Some("http://127.0.0.1/pages/pg_1/ads".to_string()),
                retry_count: attempt,
            },
        )
        .await
        .unwrap();
    }

    let errors = list_recent_errors(&pool, 10).await.unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].retry_count, 2);
    assert_eq!(errors[1].error_message, "attempt 1 timed out");
}
