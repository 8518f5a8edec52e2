// tests/metrics.rs
mod common;

use serde_json::json;
use shuttle_axum::axum::body::{self, Body};
use shuttle_axum::axum::http::{Request, StatusCode};
use shuttle_axum::axum::{routing::get, Json, Router};
use tower::ServiceExt;

use common::spawn_upstream;

#[serial_test::serial]
#[tokio::test]
async fn metrics_endpoint_contains_search_series() {
    let upstream = Router::new().route(
        "/items",
        get(|| async { Json(json!([{"id": 1, "title": "one"}, {"id": 2, "title": "two"}])) }),
    );
    let base = spawn_upstream(upstream).await;

    let dir = tempfile::tempdir().unwrap();
    let sources = dir.path().join("sources.json");
    std::fs::write(
        &sources,
        json!([{
            "id": "items",
            "name": "Items",
            "endpoint": format!("{base}/items"),
            "mapping": {"id": "id", "name": "title"}
        }])
        .to_string(),
    )
    .unwrap();

    std::env::set_var("SOURCES_CONFIG_PATH", &sources);
    std::env::set_var("METRICS_ENABLED", "1");
    std::env::set_var("SOURCE_FETCH_ATTEMPTS", "1");
    let app = source_search::app().await.expect("app() should build Router in tests");
    std::env::remove_var("SOURCES_CONFIG_PATH");
    std::env::remove_var("METRICS_ENABLED");
    std::env::remove_var("SOURCE_FETCH_ATTEMPTS");

    let resp = app
        .clone()
        .oneshot(
            Request::post("/search/items")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap(); // 1 MiB
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "search_requests_total",
        "search_results_total",
        "upstream_fetch_attempts_total",
        "search_duration_ms",
    ] {
        assert!(text.contains(needle), "missing {needle} in:\n{text}");
    }
}
