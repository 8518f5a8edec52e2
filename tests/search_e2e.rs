// tests/search_e2e.rs
//
// End-to-end searches against an in-process upstream:
// - backend filters run on the raw shape, before mapping
// - api filters and secrets reach the upstream request
// - unknown / inactive sources are rejected before any fetch

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use shuttle_axum::axum::{extract::Query, http::HeaderMap, routing::get, Json, Router};

use source_search::config::Secrets;
use source_search::SearchError;

use common::{descriptor, fast_fetch, service, service_with_secrets, spawn_upstream};

fn btc_source(base: &str) -> Value {
    json!({
        "id": "coins",
        "name": "Coins",
        "endpoint": format!("{base}/coins"),
        "backend_filters": [
            {"key": "price", "type": "number", "path": "price"},
            {"key": "nm", "type": "string"}
        ],
        "mapping": {"id": "sym", "name": "nm"}
    })
}

async fn coins_upstream() -> String {
    let app = Router::new().route(
        "/coins",
        get(|| async { Json(json!([{"sym": "BTC", "nm": "Bitcoin", "price": 45000}])) }),
    );
    spawn_upstream(app).await
}

fn obj(v: Value) -> Map<String, Value> {
    v.as_object().cloned().expect("object")
}

#[tokio::test]
async fn btc_filter_keeps_matching_record_with_raw() {
    let base = coins_upstream().await;
    let svc = service(vec![descriptor(btc_source(&base))], fast_fetch(1, 10));

    let items = svc
        .search("coins", &Map::new(), &obj(json!({"price": {"gte": 1000}})))
        .await
        .expect("search ok");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "BTC");
    assert_eq!(items[0].name.as_deref(), Some("Bitcoin"));
    assert_eq!(
        items[0].raw,
        json!({"sym": "BTC", "nm": "Bitcoin", "price": 45000})
    );
    assert_eq!(items[0].url, "#");
}

#[tokio::test]
async fn btc_filter_above_price_yields_empty() {
    let base = coins_upstream().await;
    let svc = service(vec![descriptor(btc_source(&base))], fast_fetch(1, 10));

    let items = svc
        .search("coins", &Map::new(), &obj(json!({"price": {"gte": 100000}})))
        .await
        .expect("search ok");
    assert!(items.is_empty());
}

#[tokio::test]
async fn filter_paths_address_raw_fields_not_unified_ones() {
    let base = coins_upstream().await;
    let svc = service(vec![descriptor(btc_source(&base))], fast_fetch(1, 10));

    // `nm` exists only in the raw record; the unified item calls it `name`.
    let items = svc
        .search("coins", &Map::new(), &obj(json!({"nm": {"contains": "coin"}})))
        .await
        .expect("search ok");
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn wrapped_payload_nested_paths_and_forwarded_params() {
    let seen: Arc<std::sync::Mutex<Vec<(HashMap<String, String>, Option<String>)>>> =
        Arc::default();
    let seen_h = seen.clone();
    let app = Router::new().route(
        "/listings",
        get(move |Query(q): Query<HashMap<String, String>>, headers: HeaderMap| {
            let seen = seen_h.clone();
            async move {
                let key = headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                seen.lock().unwrap().push((q, key));
                Json(json!({
                    "status": {"error_code": 0},
                    "data": [
                        {"symbol": "BTC", "name": "Bitcoin", "slug": "https://x.test/btc",
                         "quote": {"USD": {"price": 45000.5}}},
                        {"symbol": "DOGE", "name": "Dogecoin",
                         "quote": {"USD": {"price": 0.1}}}
                    ]
                }))
            }
        }),
    );
    let base = spawn_upstream(app).await;

    let src = descriptor(json!({
        "id": "cmc",
        "name": "CMC",
        "endpoint": format!("{base}/listings"),
        "headers": {"X-Api-Key": "{{CMC_API_KEY}}"},
        "api_filters": [
            {"key": "limit", "type": "number", "api_param": "limit", "default": 100},
            {"key": "convert", "type": "select", "api_param": "convert"}
        ],
        "backend_filters": [
            {"key": "price", "type": "number", "path": "quote.USD.price"}
        ],
        "mapping": {"id": "symbol", "name": "name", "url": "slug", "price": "quote.USD.price"},
        "default_url": "https://coinmarketcap.com"
    }));
    let svc = service_with_secrets(
        vec![src],
        fast_fetch(1, 10),
        Secrets::from_pairs([("CMC_API_KEY", "secret-1")]),
    );

    let items = svc
        .search(
            "cmc",
            &obj(json!({"convert": "USD"})),
            &obj(json!({"price": {"gt": 1}})),
        )
        .await
        .expect("search ok");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "BTC");
    assert_eq!(items[0].price, Some(45000.5));
    assert_eq!(items[0].url, "https://x.test/btc");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (q, key) = &seen[0];
    assert_eq!(q.get("limit").map(String::as_str), Some("100"));
    assert_eq!(q.get("convert").map(String::as_str), Some("USD"));
    assert_eq!(key.as_deref(), Some("secret-1"));
}

#[tokio::test]
async fn unknown_and_inactive_sources_never_fetch() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let app = Router::new().route(
        "/coins",
        get(move || {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Json(json!([]))
            }
        }),
    );
    let base = spawn_upstream(app).await;

    let mut inactive = btc_source(&base);
    inactive["is_active"] = json!(false);
    let svc = service(vec![descriptor(inactive)], fast_fetch(1, 10));

    let err = svc
        .search("nope", &Map::new(), &Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::SourceNotFound(ref id) if id == "nope"));

    let err = svc
        .search("coins", &Map::new(), &Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::SourceInactive(_)));

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upstream_client_error_surfaces_as_fetch_failure() {
    let app = Router::new().route(
        "/coins",
        get(|| async { (shuttle_axum::axum::http::StatusCode::FORBIDDEN, "nope") }),
    );
    let base = spawn_upstream(app).await;
    let svc = service(vec![descriptor(btc_source(&base))], fast_fetch(3, 10));

    let err = svc
        .search("coins", &Map::new(), &Map::new())
        .await
        .unwrap_err();
    match err {
        SearchError::UpstreamFetch { source_id, error } => {
            assert_eq!(source_id, "coins");
            assert!(error.to_string().contains("403"), "got {error}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
