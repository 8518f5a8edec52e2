// tests/common/mod.rs
//
// Shared helpers: an in-process upstream HTTP server and registry/service builders.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use shuttle_axum::axum::Router;
use tokio::net::TcpListener;

use source_search::config::Secrets;
use source_search::sources::{InMemoryRegistry, SourceDescriptor, SourceRegistry};
use source_search::{build_service, FetchConfig, SearchService};

/// Serve `app` on an ephemeral localhost port; returns the base URL.
pub async fn spawn_upstream(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = shuttle_axum::axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// Fast retry settings for tests.
pub fn fast_fetch(attempts: u32, backoff_ms: u64) -> FetchConfig {
    FetchConfig {
        max_attempts: attempts,
        timeout: Duration::from_secs(5),
        backoff_base: Duration::from_millis(backoff_ms),
        max_retry_after: Duration::from_secs(5),
    }
}

pub fn descriptor(v: Value) -> SourceDescriptor {
    serde_json::from_value(v).expect("valid source descriptor")
}

pub fn registry(sources: Vec<SourceDescriptor>) -> Arc<dyn SourceRegistry> {
    Arc::new(InMemoryRegistry::new(sources).expect("valid registry"))
}

pub fn service(sources: Vec<SourceDescriptor>, fetch: FetchConfig) -> SearchService {
    service_with_secrets(sources, fetch, Secrets::default())
}

pub fn service_with_secrets(
    sources: Vec<SourceDescriptor>,
    fetch: FetchConfig,
    secrets: Secrets,
) -> SearchService {
    build_service(registry(sources), fetch, Arc::new(secrets)).expect("build service")
}
