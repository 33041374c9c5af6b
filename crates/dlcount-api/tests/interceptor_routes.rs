//! Router-level tests for the download interceptor.
//!
//! Counting happens on a detached task, so assertions on the store poll
//! until the count lands (or a short deadline passes).

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use dlcount_api::{build_router, with_download_counting};
use dlcount_core::DayKey;
use dlcount_core::config::CounterSection;
use dlcount_counter::DownloadCounter;
use dlcount_pool::memory::MemoryStore;
use dlcount_pool::{ConnectionPool, PoolConfig};
use tower::ServiceExt;

async fn test_counter(store: &MemoryStore) -> Arc<DownloadCounter> {
    let config = PoolConfig {
        initial_size: 2,
        refill_size: 1,
        max_size: 4,
        acquire_timeout: Duration::from_millis(200),
    };
    let pool = ConnectionPool::open(config, Arc::new(store.factory(0))).await;
    let section = CounterSection::default();
    Arc::new(DownloadCounter::from_config(Arc::new(pool), &section).unwrap())
}

fn today() -> String {
    let offset = CounterSection::default().offset().unwrap();
    DayKey::today(offset).to_string()
}

/// Wait for `package`'s field in today's record to equal `expected`.
async fn wait_for_field(store: &MemoryStore, package: &str, expected: &str) -> Option<String> {
    let day = today();
    let mut last = None;
    for _ in 0..100 {
        last = store.hget(0, &day, package).await;
        if last.as_deref() == Some(expected) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    last
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn scoped_download_counted_and_acknowledged() {
    let store = MemoryStore::new();
    let router = build_router(test_counter(&store).await);

    let resp = router
        .clone()
        .oneshot(get_request("/@scope%2Fpkg/-/@scope/pkg-1.2.3.tgz"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        wait_for_field(&store, "@scope/pkg", r#"{"1.2.3":1}"#).await.as_deref(),
        Some(r#"{"1.2.3":1}"#)
    );

    router
        .oneshot(get_request("/@scope%2Fpkg/-/@scope/pkg-1.2.3.tgz"))
        .await
        .unwrap();
    assert_eq!(
        wait_for_field(&store, "@scope/pkg", r#"{"1.2.3":2}"#).await.as_deref(),
        Some(r#"{"1.2.3":2}"#)
    );
}

#[tokio::test]
async fn non_get_requests_are_not_counted() {
    let store = MemoryStore::new();
    let router = build_router(test_counter(&store).await);

    let req = Request::builder()
        .method("PUT")
        .uri("/lodash/-/lodash-4.17.21.tgz")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.keys(0).await.is_empty());
}

#[tokio::test]
async fn other_paths_are_forwarded_without_counting() {
    let store = MemoryStore::new();
    let router = build_router(test_counter(&store).await);

    for uri in ["/lodash", "/-/v1/search?text=x", "/", "/lodash/-"] {
        let resp = router.clone().oneshot(get_request(uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT, "uri {uri}");
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.keys(0).await.is_empty());
}

#[tokio::test]
async fn store_outage_never_affects_the_response() {
    let store = MemoryStore::new();
    let counter = test_counter(&store).await;
    store.set_fail_reads(true);
    store.set_fail_connect(true);

    let registry = Router::new().route("/{package}/-/{filename}", get(|| async { "tarball" }));
    let router = with_download_counting(registry, counter);

    let resp = router
        .oneshot(get_request("/lodash/-/lodash-4.17.21.tgz"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"tarball");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.keys(0).await.is_empty());
}

#[tokio::test]
async fn wrapped_registry_router_counts_downloads() {
    let store = MemoryStore::new();
    let counter = test_counter(&store).await;

    let registry = Router::new().route("/{package}/-/{filename}", get(|| async { "tarball" }));
    let router = with_download_counting(registry, counter);

    let resp = router
        .oneshot(get_request("/lodash/-/lodash-4.17.21.tgz"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        wait_for_field(&store, "lodash", r#"{"4.17.21":1}"#).await.as_deref(),
        Some(r#"{"4.17.21":1}"#)
    );
}

#[tokio::test]
async fn healthz_reports_pool_stats() {
    let store = MemoryStore::new();
    let router = build_router(test_counter(&store).await);

    let resp = router.oneshot(get_request("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["pool"]["total"], 2);
    assert_eq!(json["pool"]["idle"], 2);
    assert_eq!(json["pool"]["in_use"], 0);
    assert_eq!(json["pool"]["live"], 2);
    assert!(store.keys(0).await.is_empty());
}
