//! HTTP surface tests, including the golden end-to-end path

use msense_core::{CacheEntry, FailureKind, PredictionCache};
use msense_scoring::{ArtifactPaths, ScorerHandle};
use msense_service::{routes, Refresher, GREETING};
use msense_test_utils::{golden_features, write_golden_artifacts, ScriptedSource, GOLDEN_SCORES};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::watch;
use warp::http::StatusCode;

async fn get_json(cache: &PredictionCache, path: &str) -> (StatusCode, Value) {
    let response = warp::test::request()
        .method("GET")
        .path(path)
        .reply(&routes(cache.clone()))
        .await;
    let value = serde_json::from_slice(response.body()).unwrap();
    (response.status(), value)
}

fn assert_fallback(value: &Value) {
    assert_eq!(value["status"], "success");
    assert_eq!(value["source"], "test_data");
    assert_eq!(value["predictions"], json!([6.2, 7.1, 7.8, 8.3]));
    assert_eq!(value["next_minutes"], json!([15, 30, 45, 60]));
    assert!(value["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));
}

#[tokio::test]
async fn empty_cache_serves_fallback() {
    let (cache, _publisher) = PredictionCache::with_publisher();
    let (status, value) = get_json(&cache, "/current-predictions").await;
    assert_eq!(status, StatusCode::OK);
    assert_fallback(&value);
}

#[tokio::test]
async fn stale_cache_serves_fallback() {
    let (cache, publisher) = PredictionCache::with_publisher();
    publisher.publish(CacheEntry::stale(FailureKind::ScoringFailure, None));
    let (status, value) = get_json(&cache, "/current-predictions").await;
    assert_eq!(status, StatusCode::OK);
    assert_fallback(&value);
}

#[tokio::test]
async fn health_and_index() {
    let (cache, _publisher) = PredictionCache::with_publisher();
    let (status, value) = get_json(&cache, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({ "status": "healthy" }));

    let response = warp::test::request().path("/").reply(&routes(cache)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), GREETING.as_bytes());
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (cache, _publisher) = PredictionCache::with_publisher();
    let response = warp::test::request().path("/predictions").reply(&routes(cache)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (cache, _publisher) = PredictionCache::with_publisher();
    let filter = routes(cache);

    let preflight = warp::test::request()
        .method("OPTIONS")
        .path("/current-predictions")
        .header("origin", "https://app.example")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "content-type")
        .reply(&filter)
        .await;
    assert_eq!(preflight.status(), StatusCode::OK);
    assert!(preflight.headers().contains_key("access-control-allow-origin"));

    let simple = warp::test::request()
        .path("/health")
        .header("origin", "https://app.example")
        .reply(&filter)
        .await;
    assert!(simple.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test(start_paused = true)]
async fn golden_features_flow_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_golden_artifacts(dir.path()).unwrap();
    let scorer = ScorerHandle::load(&ArtifactPaths::in_dir(dir.path())).unwrap();

    let (cache, publisher) = PredictionCache::with_publisher();
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(
        Refresher::new(publisher, ScriptedSource::always(Ok(golden_features())), scorer).run(rx),
    );
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (status, value) = get_json(&cache, "/current-predictions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "success");
    assert_eq!(value["predictions"], json!(GOLDEN_SCORES));
    assert_eq!(value["next_minutes"], json!([1, 2, 3]));
    assert!(value.get("source").is_none());

    tx.send(true).unwrap();
    assert_eq!(task.await.unwrap().successes, 1);
}

#[tokio::test(start_paused = true)]
async fn missing_artifacts_keep_serving_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let scorer = ScorerHandle::load_or_unavailable(&ArtifactPaths::in_dir(dir.path()));
    assert!(!scorer.is_ready());

    let (cache, publisher) = PredictionCache::with_publisher();
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(
        Refresher::new(publisher, ScriptedSource::always(Ok(golden_features())), scorer).run(rx),
    );
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        *cache.read(),
        CacheEntry::stale(FailureKind::ScoringUnavailable, None)
    );
    let (_, value) = get_json(&cache, "/current-predictions").await;
    assert_fallback(&value);

    tx.send(true).unwrap();
    task.await.unwrap();
}
