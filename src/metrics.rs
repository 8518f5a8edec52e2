use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

impl Metrics {
    /// Install the Prometheus recorder (once per process) and describe the search metrics.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())?
            .clone();
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("search_requests_total", "Search calls received.");
        describe_counter!("search_results_total", "Unified items returned by search.");
        describe_counter!("search_errors_total", "Failed searches, labelled by kind.");
        describe_counter!(
            "upstream_fetch_attempts_total",
            "HTTP attempts made against upstream sources."
        );
        describe_counter!(
            "upstream_fetch_retries_total",
            "Retries scheduled after a retryable upstream failure."
        );
        describe_counter!(
            "upstream_fetch_failures_total",
            "Fetches that ended in a structured failure."
        );
        describe_histogram!("search_duration_ms", "End-to-end search time in milliseconds.");
    });
}
