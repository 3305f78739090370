use anyhow::{Context, Result};
use axum::{extract::{Path, State}, http::StatusCode, routing::get, Json, Router};
use index_core::index::Orientation;
use index_core::{DiskIndex, DocId, ForwardIndex, IndexError, InvertedIndex, TermId};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub forward: Arc<ForwardIndex>,
    pub inverted: Option<Arc<InvertedIndex>>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub num_docs: u64,
    pub unique_terms: u64,
    pub forward: IndexStats,
    pub inverted: Option<IndexStats>,
}

#[derive(Serialize)]
pub struct IndexStats {
    pub path: String,
    pub kind: String,
    pub total_postings: u64,
    pub uninverted: bool,
    pub cached_rows: usize,
}

#[derive(Serialize)]
pub struct TermWeight {
    pub term_id: TermId,
    pub term: String,
    pub weight: f64,
}

#[derive(Serialize)]
pub struct DocResponse {
    pub doc_id: DocId,
    pub size: u64,
    pub label: Option<String>,
    pub name: Option<String>,
    pub postings: Vec<TermWeight>,
}

#[derive(Serialize)]
pub struct DocWeight {
    pub doc_id: DocId,
    pub weight: f64,
}

#[derive(Serialize)]
pub struct TermResponse {
    pub term_id: TermId,
    pub term: String,
    pub postings: Vec<DocWeight>,
}

type ApiError = (StatusCode, String);

/// Opens finished indexes and wires the read-only routes. Nothing is built
/// here; run the indexer first.
pub fn build_app(
    forward_dir: impl Into<PathBuf>,
    inverted_dir: Option<PathBuf>,
    cache_capacity: usize,
) -> Result<Router> {
    let forward_dir = forward_dir.into();
    let forward = ForwardIndex::open(&forward_dir, cache_capacity)
        .with_context(|| format!("opening forward index {}", forward_dir.display()))?;
    let inverted = match inverted_dir {
        Some(dir) => Some(Arc::new(
            InvertedIndex::open(&dir, cache_capacity)
                .with_context(|| format!("opening inverted index {}", dir.display()))?,
        )),
        None => None,
    };
    tracing::info!(
        num_docs = forward.num_docs(),
        unique_terms = forward.unique_terms(),
        "indexes loaded"
    );
    let app_state = AppState { forward: Arc::new(forward), inverted };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(stats_handler))
        .route("/docs/:doc_id", get(doc_handler))
        .route("/terms/:term_id", get(term_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

fn index_stats<O: Orientation>(index: &DiskIndex<O>) -> IndexStats {
    IndexStats {
        path: index.index_dir().display().to_string(),
        kind: index.kind().to_string(),
        total_postings: index.total_postings(),
        uninverted: index.meta().uninverted,
        cached_rows: index.cached_rows(),
    }
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        num_docs: state.forward.num_docs(),
        unique_terms: state.forward.unique_terms(),
        forward: index_stats(&*state.forward),
        inverted: state.inverted.as_deref().map(index_stats),
    })
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<u64>,
) -> Result<Json<DocResponse>, ApiError> {
    let index = Arc::clone(&state.forward);
    let doc = DocId::new(doc_id);
    blocking(move || doc_response(&index, doc)).await.map(Json)
}

pub async fn term_handler(
    State(state): State<AppState>,
    Path(term_id): Path<u64>,
) -> Result<Json<TermResponse>, ApiError> {
    let Some(index) = state.inverted.clone() else {
        return Err((StatusCode::NOT_FOUND, "no inverted index loaded".into()));
    };
    let term = TermId::new(term_id);
    blocking(move || term_response(&index, term)).await.map(Json)
}

/// Row lookups may read sled and decode rows, so they run off the async workers.
async fn blocking<T, F>(lookup: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, IndexError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(lookup).await {
        Ok(result) => result.map_err(api_error),
        Err(err) => {
            tracing::error!(error = %err, "lookup task failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "lookup task failed".into()))
        }
    }
}

pub fn doc_response(index: &ForwardIndex, doc: DocId) -> Result<DocResponse, IndexError> {
    let row = index.search_primary(doc)?;
    let mut postings = Vec::with_capacity(row.len());
    for &(term_id, weight) in row.counts() {
        let term = index.term_text(term_id)?.to_string();
        postings.push(TermWeight { term_id, term, weight });
    }
    Ok(DocResponse {
        doc_id: doc,
        size: index.doc_size(doc)?,
        label: index.doc_label(doc)?.map(str::to_string),
        name: index.doc_name(doc)?.map(str::to_string),
        postings,
    })
}

pub fn term_response(index: &InvertedIndex, term: TermId) -> Result<TermResponse, IndexError> {
    let row = index.search_primary(term)?;
    let postings = row
        .counts()
        .iter()
        .map(|&(doc_id, weight)| DocWeight { doc_id, weight })
        .collect();
    Ok(TermResponse {
        term_id: term,
        term: index.term_text(term)?.to_string(),
        postings,
    })
}

fn api_error(err: IndexError) -> ApiError {
    if err.is_out_of_range() {
        (StatusCode::NOT_FOUND, err.to_string())
    } else {
        tracing::error!(error = %err, "index lookup failed");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}
