// src/search.rs
//! Query orchestrator: resolve source, build, fetch, normalize, filter raw records,
//! then map the survivors into unified items. Filtering always runs against the raw
//! upstream shape, before field mapping.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};

use crate::config::SecretLookup;
use crate::fetch::{CancelSignal, FetchError, Fetcher};
use crate::filter::{self, FilterSet};
use crate::metrics::ensure_metrics_described;
use crate::normalize::{self, UnifiedItem};
use crate::request::build_request;
use crate::sources::SourceRegistry;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Backend filters, evaluated locally against raw records.
    #[serde(default)]
    pub default_filters: FilterSet,
    /// Forwarded upstream as query parameters.
    #[serde(default)]
    pub api_filters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<UnifiedItem>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("source not found: {0}")]
    SourceNotFound(String),
    #[error("source is inactive: {0}")]
    SourceInactive(String),
    #[error("upstream fetch failed for source {source_id}")]
    UpstreamFetch {
        source_id: String,
        #[source]
        error: FetchError,
    },
    #[error("search cancelled")]
    Cancelled,
    #[error("source registry unavailable: {0}")]
    Registry(String),
}

impl SearchError {
    fn kind(&self) -> &'static str {
        match self {
            SearchError::SourceNotFound(_) => "source_not_found",
            SearchError::SourceInactive(_) => "source_inactive",
            SearchError::UpstreamFetch { .. } => "upstream_fetch",
            SearchError::Cancelled => "cancelled",
            SearchError::Registry(_) => "registry",
        }
    }
}

#[derive(Clone)]
pub struct SearchService {
    registry: Arc<dyn SourceRegistry>,
    fetcher: Arc<Fetcher>,
    secrets: Arc<dyn SecretLookup>,
}

impl SearchService {
    pub fn new(
        registry: Arc<dyn SourceRegistry>,
        fetcher: Arc<Fetcher>,
        secrets: Arc<dyn SecretLookup>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            registry,
            fetcher,
            secrets,
        }
    }

    pub fn registry(&self) -> &Arc<dyn SourceRegistry> {
        &self.registry
    }

    pub async fn search(
        &self,
        source_id: &str,
        api_filters: &Map<String, Value>,
        backend_filters: &FilterSet,
    ) -> Result<Vec<UnifiedItem>, SearchError> {
        self.search_with_cancel(source_id, api_filters, backend_filters, &CancelSignal::never())
            .await
    }

    #[instrument(skip_all, fields(source_id = %source_id))]
    pub async fn search_with_cancel(
        &self,
        source_id: &str,
        api_filters: &Map<String, Value>,
        backend_filters: &FilterSet,
        cancel: &CancelSignal,
    ) -> Result<Vec<UnifiedItem>, SearchError> {
        let started = Instant::now();
        counter!("search_requests_total").increment(1);

        let out = self
            .run(source_id, api_filters, backend_filters, cancel)
            .await;

        histogram!("search_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        match &out {
            Ok(items) => {
                counter!("search_results_total").increment(items.len() as u64);
            }
            Err(e) => {
                counter!("search_errors_total", "kind" => e.kind()).increment(1);
            }
        }
        out
    }

    async fn run(
        &self,
        source_id: &str,
        api_filters: &Map<String, Value>,
        backend_filters: &FilterSet,
        cancel: &CancelSignal,
    ) -> Result<Vec<UnifiedItem>, SearchError> {
        // 1. resolve (fresh snapshot every query)
        let source = self
            .registry
            .get_source_by_id(source_id)
            .await
            .map_err(|e| SearchError::Registry(e.to_string()))?
            .ok_or_else(|| SearchError::SourceNotFound(source_id.to_string()))?;
        if !source.is_active {
            return Err(SearchError::SourceInactive(source_id.to_string()));
        }

        // 2. build + fetch
        let req = build_request(&source, api_filters, self.secrets.as_ref());
        debug!(url = %req.url, params = req.query.len(), "outbound request built");
        let raw = self
            .fetcher
            .fetch_with_cancel(&req, cancel)
            .await
            .map_err(|e| match e {
                FetchError::Cancelled => SearchError::Cancelled,
                other => {
                    error!(error = %other, "upstream fetch failed");
                    SearchError::UpstreamFetch {
                        source_id: source_id.to_string(),
                        error: other,
                    }
                }
            })?;

        // 3. normalize
        let records = normalize::normalize(raw.payload);
        let fetched = records.len();

        // 4. filter raw records
        let kept = filter::apply(records, &source.backend_filters, backend_filters);

        // 5. map
        let items = normalize::unify(kept, &source);
        info!(fetched, returned = items.len(), "search completed");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_defaults_everything() {
        let r: SearchRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(r, SearchRequest::default());
        let r: SearchRequest =
            serde_json::from_str(r#"{"filters":{"default_filters":{"price":{"gte":1}}}}"#)
                .unwrap();
        assert!(r.filters.api_filters.is_empty());
        assert_eq!(r.filters.default_filters.len(), 1);
    }

    #[test]
    fn error_kinds_are_stable_labels() {
        assert_eq!(SearchError::SourceNotFound("x".into()).kind(), "source_not_found");
        assert_eq!(SearchError::Cancelled.kind(), "cancelled");
    }
}
