// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod fetch;
pub mod filter;
pub mod metrics;
pub mod normalize;
pub mod path;
pub mod request;
pub mod search;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::fetch::{cancel_pair, CancelHandle, CancelSignal, FetchConfig, FetchError, Fetcher};
pub use crate::normalize::UnifiedItem;
pub use crate::search::{SearchError, SearchService};

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::axum::Router;
use tracing::{info, warn};

use crate::config::{AppConfig, SecretLookup, Secrets};
use crate::sources::{FileSourceRegistry, SourceRegistry};

/// Wire registry, fetcher and secrets into a [`SearchService`].
pub fn build_service(
    registry: Arc<dyn SourceRegistry>,
    fetch: FetchConfig,
    secrets: Arc<dyn SecretLookup>,
) -> anyhow::Result<SearchService> {
    let fetcher = Fetcher::new(fetch).context("building upstream HTTP client")?;
    Ok(SearchService::new(registry, Arc::new(fetcher), secrets))
}

/// Build the full application router from the environment.
///
/// An explicitly configured sources file must load; the default path may be absent,
/// in which case the service starts with no sources until a reload finds the file.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = AppConfig::from_env();

    let registry = if cfg.sources_path.exists() || cfg.sources_path_explicit {
        FileSourceRegistry::load(&cfg.sources_path).with_context(|| {
            format!("loading sources from {}", cfg.sources_path.display())
        })?
    } else {
        warn!(path = %cfg.sources_path.display(), "no sources file found, starting empty");
        FileSourceRegistry::empty(&cfg.sources_path)
    };
    let registry: Arc<dyn SourceRegistry> = Arc::new(registry);
    let count = registry.list_sources().await?.len();
    info!(sources = count, path = %cfg.sources_path.display(), "source registry ready");

    let secrets = Secrets::from_env();
    let service = build_service(registry, cfg.fetch.clone(), Arc::new(secrets))?;
    let mut app = router(AppState::new(service));

    if cfg.metrics_enabled {
        let m = crate::metrics::Metrics::init().context("installing prometheus recorder")?;
        app = app.merge(m.router());
        info!("metrics exposed at /metrics");
    }
    Ok(app)
}
