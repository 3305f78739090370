use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use index_core::{
    make_forward_index, make_inverted_index, AnalyzerConfig, CorpusKind, IndexConfig,
};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_indexes(prefix: &Path) -> IndexConfig {
    let data = prefix.join("tiny");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("tiny.dat"), "rust is great rust\nlearning rust\n\n").unwrap();
    fs::write(data.join("tiny.dat.labels"), "pos\nneg\nneg\n").unwrap();
    let config = IndexConfig::new(prefix, "tiny", CorpusKind::Line)
        .with_analyzer(AnalyzerConfig::plain());
    // Handles are dropped so the server can take the store locks.
    drop(make_forward_index(&config).unwrap());
    drop(make_inverted_index(&config).unwrap());
    config
}

async fn call(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

#[tokio::test]
async fn doc_route_returns_row_with_term_texts() {
    let dir = tempdir().unwrap();
    let config = build_tiny_indexes(dir.path());
    let app = server::build_app(&config.forward_index, None, 4).unwrap();

    let (status, body) = call(app, "/docs/0").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["size"], 4);
    assert_eq!(json["label"], "pos");
    let postings = json["postings"].as_array().unwrap();
    assert_eq!(postings.len(), 3);
    let rust = postings.iter().find(|p| p["term"] == "rust").unwrap();
    assert_eq!(rust["weight"], 2.0);
}

#[tokio::test]
async fn empty_document_has_an_empty_row() {
    let dir = tempdir().unwrap();
    let config = build_tiny_indexes(dir.path());
    let app = server::build_app(&config.forward_index, None, 4).unwrap();

    let (status, body) = call(app, "/docs/2").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["size"], 0);
    assert!(json["postings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn out_of_range_ids_are_not_found() {
    let dir = tempdir().unwrap();
    let config = build_tiny_indexes(dir.path());
    let inverted = Some(config.inverted_index.clone());
    let app = server::build_app(&config.forward_index, inverted, 4).unwrap();

    let (status, _) = call(app.clone(), "/docs/3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(app, "/terms/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn term_route_lists_documents() {
    let dir = tempdir().unwrap();
    let config = build_tiny_indexes(dir.path());
    let inverted = Some(config.inverted_index.clone());
    let app = server::build_app(&config.forward_index, inverted, 4).unwrap();

    // "rust" is the first term seen.
    let (status, body) = call(app.clone(), "/terms/0").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["term"], "rust");
    let docs: Vec<u64> = json["postings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["doc_id"].as_u64().unwrap())
        .collect();
    assert_eq!(docs, vec![0, 1]);

    let (status, body) = call(app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["num_docs"], 3);
    assert_eq!(json["unique_terms"], 4);
    assert_eq!(json["inverted"]["kind"], "inverted");
    assert_eq!(json["inverted"]["cached_rows"], 1);
}

#[tokio::test]
async fn terms_need_an_inverted_index() {
    let dir = tempdir().unwrap();
    let config = build_tiny_indexes(dir.path());
    let app = server::build_app(&config.forward_index, None, 4).unwrap();

    let (status, _) = call(app.clone(), "/terms/0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = call(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_cache() {
    let dir = tempdir().unwrap();
    let config = build_tiny_indexes(dir.path());
    let inverted = Some(config.inverted_index.clone());
    let app = server::build_app(&config.forward_index, inverted, 1).unwrap();

    let mut tasks = Vec::new();
    for i in 0..24u64 {
        let app = app.clone();
        let uri = if i % 2 == 0 { format!("/docs/{}", i % 3) } else { format!("/terms/{}", i % 4) };
        tasks.push(tokio::spawn(async move { (uri.clone(), call(app, &uri).await) }));
    }
    for task in tasks {
        let (uri, (status, body)) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK, "{uri}");
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["postings"].is_array(), "{uri}");
    }

    let (_, body) = call(app, "/docs/0").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["size"], 4);
}
