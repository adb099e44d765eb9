//! Integration tests for `MediaStore::download_batch`.
//!
//! A `wiremock` server plays the CDN and every test writes into its own
//! temporary directory.

use std::time::Duration;

use adwatch_core::{Ad, MediaType};
use adwatch_engine::{MediaOutcome, MediaStore};
use chrono::Utc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(dir: &TempDir) -> MediaStore {
    MediaStore::new(dir.path(), Duration::from_secs(5), "adwatch-test/0.1")
        .expect("failed to build test MediaStore")
}

fn ad(ad_id: &str, media_url: Option<String>) -> Ad {
    let now = Utc::now();
    Ad {
        ad_id: ad_id.to_string(),
        page_id: "pg_1".to_string(),
        page_name: None,
        ad_text: None,
        started_running_on: None,
        is_active: true,
        has_low_impressions: false,
        media_type: Some(MediaType::Image),
        media_url,
        thumbnail_url: None,
        cta_type: None,
        landing_page_url: None,
        platforms: Vec::new(),
        regions: Vec::new(),
        first_seen_at: now,
        last_seen_at: now,
        days_running: 0,
        media_downloaded: false,
        local_media_path: None,
        winner_score: 0,
        score_breakdown: None,
        scaling_cluster_id: None,
        snapshot_count: 1,
    }
}

async fn serve(server: &MockServer, at: &str, body: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn downloads_media_and_thumbnail_under_page_and_ad() {
    let server = MockServer::start().await;
    serve(&server, "/v/clip.mp4", b"video-bytes").await;
    serve(&server, "/t/thumb.png", b"thumb-bytes").await;
    let dir = TempDir::new().unwrap();

    let mut a = ad("100", Some(format!("{}/v/clip.mp4?sig=abc", server.uri())));
    a.media_type = Some(MediaType::Video);
    a.thumbnail_url = Some(format!("{}/t/thumb.png", server.uri()));

    let result = store(&dir).download_batch(&[a], 3).await;
    assert_eq!(result.total, 1);
    assert_eq!(result.success, 1);
    assert_eq!(result.deduplicated, 0);

    let media = dir.path().join("pg_1/100/media.mp4");
    let thumb = dir.path().join("pg_1/100/thumbnail.png");
    assert_eq!(
        result.outcomes[0].outcome,
        MediaOutcome::Downloaded {
            media_path: media.clone(),
            thumbnail_path: Some(thumb.clone()),
        }
    );
    assert_eq!(std::fs::read(media).unwrap(), b"video-bytes");
    assert_eq!(std::fs::read(thumb).unwrap(), b"thumb-bytes");
}

#[tokio::test]
async fn extension_falls_back_to_media_type() {
    let server = MockServer::start().await;
    serve(&server, "/asset/42", b"v").await;
    let dir = TempDir::new().unwrap();

    let mut a = ad("42", Some(format!("{}/asset/42", server.uri())));
    a.media_type = Some(MediaType::Video);

    let result = store(&dir).download_batch(&[a], 1).await;
    assert_eq!(
        result.outcomes[0].outcome.media_path(),
        Some(dir.path().join("pg_1/42/media.mp4").as_path())
    );
}

#[tokio::test]
async fn ad_without_media_url_is_skipped() {
    let dir = TempDir::new().unwrap();
    let result = store(&dir)
        .download_batch(&[ad("1", None), ad("2", Some("  ".to_string()))], 2)
        .await;

    assert_eq!(result.total, 2);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.success, 0);
    assert!(result
        .outcomes
        .iter()
        .all(|o| o.outcome == MediaOutcome::Skipped));
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_url_is_fetched_once_sequentially() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shared.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".as_slice()))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let url = format!("{}/shared.jpg", server.uri());

    let result = store(&dir)
        .download_batch(&[ad("a", Some(url.clone())), ad("b", Some(url))], 1)
        .await;

    assert_eq!(result.success, 2);
    assert_eq!(result.deduplicated, 1);
    let first = result.outcomes[0].outcome.media_path().unwrap();
    let second = result.outcomes[1].outcome.media_path().unwrap();
    assert_eq!(first, second);
    assert_eq!(first, dir.path().join("pg_1/a/media.jpg"));
    assert!(matches!(
        result.outcomes[1].outcome,
        MediaOutcome::Deduplicated { .. }
    ));
    assert!(!dir.path().join("pg_1/b").exists());
}

#[tokio::test]
async fn concurrent_requests_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shared.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"img".as_slice())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let url = format!("{}/shared.jpg", server.uri());

    let ads: Vec<Ad> = (0..4)
        .map(|i| ad(&format!("ad{i}"), Some(url.clone())))
        .collect();
    let result = store(&dir).download_batch(&ads, 4).await;

    assert_eq!(result.success, 4);
    assert_eq!(result.deduplicated, 3);
    let paths: Vec<_> = result
        .outcomes
        .iter()
        .map(|o| o.outcome.media_path().unwrap().to_path_buf())
        .collect();
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn failed_fetch_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    serve(&server, "/flaky.jpg", b"img").await;
    let dir = TempDir::new().unwrap();
    let url = format!("{}/flaky.jpg", server.uri());

    let result = store(&dir)
        .download_batch(&[ad("a", Some(url.clone())), ad("b", Some(url))], 1)
        .await;

    assert_eq!(result.failed, 1);
    assert_eq!(result.success, 1);
    assert_eq!(result.deduplicated, 0);
    assert!(matches!(
        result.outcomes[1].outcome,
        MediaOutcome::Downloaded { .. }
    ));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn http_error_fails_only_that_ad() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    serve(&server, "/ok.jpg", b"img").await;
    let dir = TempDir::new().unwrap();

    let result = store(&dir)
        .download_batch(
            &[
                ad("bad", Some(format!("{}/gone.jpg", server.uri()))),
                ad("good", Some(format!("{}/ok.jpg", server.uri()))),
            ],
            2,
        )
        .await;

    assert_eq!(result.failed, 1);
    assert_eq!(result.success, 1);
    match &result.outcomes[0].outcome {
        MediaOutcome::Failed { error } => assert!(error.contains("404"), "got: {error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(result.outcomes[1].ad_id, "good");
}

#[tokio::test]
async fn non_http_url_fails_without_network() {
    let dir = TempDir::new().unwrap();
    let result = store(&dir)
        .download_batch(&[ad("1", Some("ftp://cdn.example.com/a.jpg".to_string()))], 1)
        .await;

    assert_eq!(result.failed, 1);
    match &result.outcomes[0].outcome {
        MediaOutcome::Failed { error } => assert!(error.contains("unsupported URL scheme")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn thumbnail_failure_does_not_fail_the_ad() {
    let server = MockServer::start().await;
    serve(&server, "/m.jpg", b"img").await;
    Mock::given(method("GET"))
        .and(path("/t.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let mut a = ad("1", Some(format!("{}/m.jpg", server.uri())));
    a.thumbnail_url = Some(format!("{}/t.jpg", server.uri()));

    let result = store(&dir).download_batch(&[a], 1).await;
    assert_eq!(result.success, 1);
    assert_eq!(
        result.outcomes[0].outcome,
        MediaOutcome::Downloaded {
            media_path: dir.path().join("pg_1/1/media.jpg"),
            thumbnail_path: None,
        }
    );
}

#[tokio::test]
async fn timeout_counts_as_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.jpg"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let media = MediaStore::new(dir.path(), Duration::from_millis(200), "adwatch-test/0.1").unwrap();

    let result = media
        .download_batch(&[ad("1", Some(format!("{}/slow.jpg", server.uri())))], 1)
        .await;
    assert_eq!(result.failed, 1);
    match &result.outcomes[0].outcome {
        MediaOutcome::Failed { error } => assert!(error.contains("timed out"), "got: {error}"),
        other => panic!("expected failure, got {other:?}"),
    }
}
