use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use search_core::config::RetrievalConfig;
use search_core::{ChildFilter, RetrievalEngine, SearchIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub page_id: u32,
    pub score: f64,
    pub title: String,
    pub url: String,
}

#[derive(Deserialize)]
pub struct WordParams {
    pub prefix: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RetrievalEngine>,
}

/// Index errors become 500s with a JSON body.
pub struct ApiError(StatusCode, String);

impl From<search_core::Error> for ApiError {
    fn from(e: search_core::Error) -> Self {
        tracing::error!(error = %e, "request failed");
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

pub fn build_app(index: Arc<SearchIndex>, config: RetrievalConfig) -> Router {
    let app_state = AppState { engine: Arc::new(RetrievalEngine::new(index, config)) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/page/:page_id", get(page_handler))
        .route("/words", get(words_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let ranked = state.engine.query(&params.q)?;
    let total_hits = ranked.len();

    let index = state.engine.index();
    let mut results = Vec::new();
    for scored in ranked.into_iter().take(params.k.max(1)) {
        let (title, url) = index.meta.get(scored.page)?.map(|m| (m.title, m.url)).unwrap_or_default();
        results.push(SearchHit { page_id: scored.page, score: scored.score, title, url });
    }

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn page_handler(
    State(state): State<AppState>,
    Path(page_id): Path<u32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let index = state.engine.index();
    let Some(meta) = index.meta.get(page_id)? else {
        return Err(ApiError(StatusCode::NOT_FOUND, "not found".into()));
    };
    let keywords: Vec<_> = index
        .keyword_frequencies(page_id)?
        .into_iter()
        .take(10)
        .map(|(word, freq)| serde_json::json!({ "word": word, "freq": freq }))
        .collect();
    Ok(Json(serde_json::json!({
        "page_id": page_id,
        "title": meta.title,
        "url": meta.url,
        "last_modified": meta.last_modified,
        "size": meta.size,
        "fetch_count": meta.fetch_count,
        "rank": index.ranks.get(page_id)?,
        "keywords": keywords,
        "parents": index.parent_urls(page_id)?,
        "children": index.child_urls(page_id, ChildFilter::All)?,
    })))
}

pub async fn words_handler(State(state): State<AppState>, Query(params): Query<WordParams>) -> Json<Vec<String>> {
    let mut words = state.engine.index().vocabulary();
    if let Some(prefix) = params.prefix {
        words.retain(|w| w.starts_with(&prefix));
    }
    Json(words)
}
