use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use search_core::corpus::load_path;
use search_core::{Bm25Params, DocId, Document, Error, IndexPaths, IndexState, SearchEngine, Tokenizer, DEFAULT_SEARCH_LIMIT};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;
const SNIPPET_CHARS: usize = 200;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { DEFAULT_SEARCH_LIMIT }

#[derive(Deserialize)]
pub struct Bm25SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    pub k1: Option<f64>,
    pub b: Option<f64>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub results: Vec<Document>,
}

#[derive(Serialize)]
pub struct Bm25Response {
    pub query: String,
    pub took_s: f64,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    pub snippet: String,
}

#[derive(Serialize)]
pub struct IndexStatus {
    pub state: IndexState,
    pub num_docs: usize,
    pub num_terms: usize,
    pub avg_doc_length: f64,
}

/// Where the live index comes from and who may replace it.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cache: PathBuf,
    pub corpus: Option<PathBuf>,
    pub admin_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub config: Arc<AppConfig>,
}

/// Core errors as HTTP responses with a `{"error": ...}` body.
pub struct ApiError(StatusCode, String);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::InvalidTermQuery(_) | Error::InvalidParams(_) => StatusCode::BAD_REQUEST,
            Error::MissingDocument(_) => StatusCode::NOT_FOUND,
            Error::CacheNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::CorpusLoad(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

/// Load the cached index, or build one from the configured corpus when no
/// usable cache exists, then assemble the router.
pub fn build_app(config: AppConfig, tokenizer: Tokenizer) -> Result<Router> {
    let engine = SearchEngine::new(tokenizer);
    let paths = IndexPaths::new(&config.cache);
    match engine.load(&paths) {
        Ok(_) => {}
        Err(Error::CacheNotFound(reason)) => {
            let Some(corpus) = &config.corpus else {
                anyhow::bail!("no index in {} ({reason}) and no --corpus to build one", config.cache.display());
            };
            tracing::warn!(%reason, corpus = %corpus.display(), "no usable index, building");
            engine.build(load_path(corpus)?)?;
            engine.save(&paths)?;
        }
        Err(e) => return Err(e.into()),
    }
    let state = AppState { engine: Arc::new(engine), config: Arc::new(config) };

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
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/index", get(status_handler))
        .route("/search", get(search_handler))
        .route("/bm25", get(bm25_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    Ok(app)
}

fn status(engine: &SearchEngine) -> Result<IndexStatus, ApiError> {
    let index = engine.snapshot()?;
    Ok(IndexStatus {
        state: engine.state(),
        num_docs: index.num_docs(),
        num_terms: index.num_terms(),
        avg_doc_length: index.avg_doc_length(),
    })
}

pub async fn status_handler(State(state): State<AppState>) -> Result<Json<IndexStatus>, ApiError> {
    Ok(Json(status(&state.engine)?))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let results = state.engine.search(&params.q, params.k.min(MAX_K))?;
    Ok(Json(SearchResponse { query: params.q, took_s: start.elapsed().as_secs_f64(), results }))
}

pub async fn bm25_handler(
    State(state): State<AppState>,
    Query(params): Query<Bm25SearchParams>,
) -> Result<Json<Bm25Response>, ApiError> {
    let start = std::time::Instant::now();
    let defaults = state.engine.params();
    let bm25 = Bm25Params { k1: params.k1.unwrap_or(defaults.k1), b: params.b.unwrap_or(defaults.b) };
    // Hits and hydration must come from the same snapshot.
    let index = state.engine.snapshot()?;
    let terms = state.engine.tokenizer().tokenize(&params.q);
    let hits = search_core::query::bm25_rank(&index, &terms, params.k.min(MAX_K), bm25)?;

    let patterns = highlight_patterns(&params.q);
    let results = hits
        .into_iter()
        .filter_map(|hit| {
            let doc = index.document(hit.doc_id)?;
            Some(SearchHit {
                doc_id: hit.doc_id,
                score: hit.score,
                title: doc.title.clone(),
                snippet: highlight(&snippet(&doc.description), &patterns),
            })
        })
        .collect();
    Ok(Json(Bm25Response { query: params.q, took_s: start.elapsed().as_secs_f64(), results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    let index = state.engine.snapshot()?;
    let doc = index.document(doc_id).ok_or(Error::MissingDocument(doc_id))?;
    Ok(Json(doc.clone()))
}

/// Rebuild from the configured corpus, persist, and swap the live snapshot.
/// Queries in flight keep scoring against the snapshot they started with.
pub async fn rebuild_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<IndexStatus>, ApiError> {
    authorize(&state, &headers)?;
    let Some(corpus) = state.config.corpus.clone() else {
        return Err(ApiError(StatusCode::CONFLICT, "server was started without --corpus".into()));
    };
    let engine = Arc::clone(&state.engine);
    let paths = IndexPaths::new(&state.config.cache);
    tokio::task::spawn_blocking(move || -> Result<IndexStatus, ApiError> {
        let docs = load_path(&corpus)?;
        engine.build(docs)?;
        engine.save(&paths)?;
        let status = status(&engine)?;
        tracing::info!(num_docs = status.num_docs, "index rebuilt");
        Ok(status)
    })
    .await
    .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map(Json)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.config.admin_token {
        Some(t) => t,
        None => return Err(ApiError(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError(StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// One case-insensitive whole-word pattern per raw query word.
fn highlight_patterns(query: &str) -> Vec<Regex> {
    query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|t| !t.is_empty())
        .filter_map(|t| {
            regex::RegexBuilder::new(&format!(r"\b{}\b", regex::escape(t)))
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect()
}

fn highlight(snippet: &str, patterns: &[Regex]) -> String {
    let mut s = snippet.to_string();
    for pat in patterns {
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}
