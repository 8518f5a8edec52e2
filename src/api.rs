use std::sync::Arc;

use shuttle_axum::axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::filter::{operators_catalog, OperatorsCatalog};
use crate::search::{SearchError, SearchRequest, SearchResponse, SearchService};
use crate::sources::{SourceDescriptor, SourceRegistry};

#[derive(Clone)]
pub struct AppState {
    pub search: SearchService,
    pub registry: Arc<dyn SourceRegistry>,
}

impl AppState {
    pub fn new(search: SearchService) -> Self {
        let registry = search.registry().clone();
        Self { search, registry }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search/{source_id}", post(search))
        .route("/filters/operators-catalog", get(operators))
        .route("/sources", get(list_sources))
        .route("/sources/{source_id}", get(get_source))
        .route("/admin/reload-sources", post(admin_reload_sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Client-facing errors. Bodies are `{"detail": ...}` and never carry internals.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    NotFound(&'static str),
    Unprocessable(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(d) => (StatusCode::BAD_REQUEST, d.to_string()),
            ApiError::NotFound(d) => (StatusCode::NOT_FOUND, d.to_string()),
            ApiError::Unprocessable(d) => (StatusCode::UNPROCESSABLE_ENTITY, d),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::SourceNotFound(_) => ApiError::BadRequest("Invalid source ID"),
            SearchError::SourceInactive(_) => ApiError::BadRequest("Source is inactive"),
            other => {
                error!(error = ?other, "search failed");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn search(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
    body: Bytes,
) -> Result<Json<SearchResponse>, ApiError> {
    let req: SearchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SearchRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            warn!(source_id = %source_id, error = %e, "malformed search body");
            ApiError::Unprocessable(format!("Invalid request body: {e}"))
        })?
    };

    let results = state
        .search
        .search(
            &source_id,
            &req.filters.api_filters,
            &req.filters.default_filters,
        )
        .await?;
    Ok(Json(SearchResponse { results }))
}

async fn operators() -> Json<&'static OperatorsCatalog> {
    Json(operators_catalog())
}

async fn list_sources(
    State(state): State<AppState>,
) -> Result<Json<Vec<SourceDescriptor>>, ApiError> {
    state.registry.list_sources().await.map(Json).map_err(|e| {
        error!(error = ?e, "listing sources failed");
        ApiError::Internal
    })
}

async fn get_source(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<SourceDescriptor>, ApiError> {
    match state.registry.get_source_by_id(&source_id).await {
        Ok(Some(s)) => Ok(Json(s)),
        Ok(None) => Err(ApiError::NotFound("Source not found")),
        Err(e) => {
            error!(error = ?e, "source lookup failed");
            Err(ApiError::Internal)
        }
    }
}

async fn admin_reload_sources(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.registry.reload().await {
        Ok(count) => Ok(Json(json!({ "status": "reloaded", "count": count }))),
        Err(e) => {
            // Previous snapshot stays in place.
            error!(error = ?e, "source reload failed");
            Err(ApiError::Internal)
        }
    }
}
