use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use search_core::{Document, IndexPaths, SearchEngine, Tokenizer};
use serde_json::Value;
use server::{build_app, AppConfig};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

const MOVIES: &str = r#"{"movies": [
    {"id": 1, "title": "The Matrix", "description": "a hacker discovers reality is simulated"},
    {"id": 2, "title": "The Notebook", "description": "two lovers reunite"},
    {"id": 3, "title": "Hackers", "description": "teen hackers hack the matrix"}
]}"#;

fn build_tiny_index(dir: &Path) {
    let engine = SearchEngine::new(Tokenizer::english());
    engine
        .build(vec![
            Document::new(1, "The Matrix", "a hacker discovers reality is simulated"),
            Document::new(2, "The Notebook", "two lovers reunite"),
        ])
        .unwrap();
    engine.save(&IndexPaths::new(dir)).unwrap();
}

fn config(dir: &Path, corpus: Option<&Path>, token: Option<&str>) -> AppConfig {
    AppConfig {
        cache: dir.join("cache"),
        corpus: corpus.map(Path::to_path_buf),
        admin_token: token.map(str::to_string),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn search_returns_documents_in_postings_order() {
    let dir = tempdir().unwrap();
    build_tiny_index(&dir.path().join("cache"));
    let app = build_app(config(dir.path(), None, None), Tokenizer::english()).unwrap();

    let (status, json) = get(app, "/search?q=matrix&k=5").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["id"].as_u64().unwrap(), 1);
    assert_eq!(arr[0]["title"], "The Matrix");
}

#[tokio::test]
async fn bm25_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(&dir.path().join("cache"));
    let app = build_app(config(dir.path(), None, None), Tokenizer::english()).unwrap();

    let (status, json) = get(app, "/bm25?q=lovers&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"].as_u64().unwrap(), 2);
    assert!(arr[0]["score"].as_f64().unwrap() > 0.0);
    assert_eq!(arr[0]["snippet"], "two <em>lovers</em> reunite");
    assert_eq!(arr[1]["doc_id"].as_u64().unwrap(), 1);
    assert_eq!(arr[1]["score"].as_f64().unwrap(), 0.0);
}

#[tokio::test]
async fn bad_parameters_and_unknown_documents() {
    let dir = tempdir().unwrap();
    build_tiny_index(&dir.path().join("cache"));
    let app = build_app(config(dir.path(), None, None), Tokenizer::english()).unwrap();

    let (status, json) = get(app.clone(), "/bm25?q=lovers&b=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("invalid BM25 parameters"));

    let (status, _) = get(app.clone(), "/bm25?q=lovers&k1=-1&b=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = get(app.clone(), "/doc/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("42"));

    let (status, json) = get(app, "/doc/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["description"], "two lovers reunite");
}

#[tokio::test]
async fn missing_cache_without_corpus_fails_startup() {
    let dir = tempdir().unwrap();
    assert!(build_app(config(dir.path(), None, None), Tokenizer::english()).is_err());
}

#[tokio::test]
async fn missing_cache_is_built_from_corpus() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("movies.json");
    fs::write(&corpus, MOVIES).unwrap();
    let app = build_app(config(dir.path(), Some(&corpus), None), Tokenizer::english()).unwrap();

    let (status, json) = get(app, "/index").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "persisted");
    assert_eq!(json["num_docs"].as_u64().unwrap(), 3);
    assert!(dir.path().join("cache").join("CURRENT").exists());
}

#[tokio::test]
async fn rebuild_requires_token_and_swaps_the_snapshot() {
    let dir = tempdir().unwrap();
    build_tiny_index(&dir.path().join("cache"));
    let corpus = dir.path().join("movies.json");
    fs::write(&corpus, MOVIES).unwrap();
    let app = build_app(config(dir.path(), Some(&corpus), Some("secret")), Tokenizer::english()).unwrap();

    let (status, json) = get(app.clone(), "/index").await;
    assert_eq!(json["state"], "loaded");
    assert_eq!(json["num_docs"].as_u64().unwrap(), 2);
    assert_eq!(status, StatusCode::OK);

    let unauthorized = Request::post("/index/rebuild").body(Body::empty()).unwrap();
    let (status, _) = send(app.clone(), unauthorized).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::post("/index/rebuild")
        .header("X-ADMIN-TOKEN", "secret")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["num_docs"].as_u64().unwrap(), 3);
    assert_eq!(json["state"], "persisted");

    let (_, json) = get(app, "/search?q=matrix").await;
    let ids: Vec<u64> = json["results"].as_array().unwrap().iter().map(|d| d["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 3]);
}
