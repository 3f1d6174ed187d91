//! GitHub document store over HTTP
//!
//! A local axum router stands in for the contents API so status mapping,
//! request bodies and content decoding are exercised end to end.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use survey_server::document_store::{DocumentStore, DocumentStoreError, GitHubDocumentStore};

const REPO: &str = "acme/survey";

/// Statuses to answer PUTs with, and the bodies received
#[derive(Default)]
struct FakeGitHub {
    put_statuses: Mutex<VecDeque<u16>>,
    put_bodies: Mutex<Vec<(String, Value)>>,
}

async fn put_contents(
    State(fake): State<Arc<FakeGitHub>>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    fake.put_bodies.lock().unwrap().push((path, body));
    let status = fake.put_statuses.lock().unwrap().pop_front().unwrap_or(201);
    let status = StatusCode::from_u16(status).unwrap();
    let message = if status.is_success() { "created" } else { "scripted failure" };
    (status, Json(json!({ "message": message })))
}

async fn get_contents(Path(path): Path<String>) -> (StatusCode, Json<Value>) {
    match path.as_str() {
        "responses" => (
            StatusCode::OK,
            Json(json!([
                {"name": "b.json", "path": "responses/b.json", "type": "file"},
                {"name": "archive", "path": "responses/archive", "type": "dir"},
                {"name": "a.json", "path": "responses/a.json", "type": "file"}
            ])),
        ),
        "responses/a.json" => {
            let encoded = STANDARD.encode(r#"{"bm_yes_no": "Sì"}"#);
            // The API wraps base64 content across lines
            let (head, tail) = encoded.split_at(8);
            (
                StatusCode::OK,
                Json(json!({
                    "name": "a.json",
                    "encoding": "base64",
                    "content": format!("{}\n{}\n", head, tail),
                })),
            )
        }
        "responses/forbidden.json" => (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Resource not accessible by integration" })),
        ),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))),
    }
}

/// Serve the fake API on an ephemeral port and point a store at it
async fn setup_store() -> (GitHubDocumentStore, Arc<FakeGitHub>) {
    let fake = Arc::new(FakeGitHub::default());
    let router = Router::new()
        .route(
            &format!("/repos/{}/contents/*path", REPO),
            get(get_contents).put(put_contents),
        )
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let store = GitHubDocumentStore::new(format!("http://{}", addr), REPO, "test-token").unwrap();
    (store, fake)
}

#[tokio::test]
async fn test_create_sends_base64_content() {
    let (store, fake) = setup_store().await;

    store
        .create_file("responses/x.json", "Nuova risposta survey", "{\"q\": \"Sì\"}".as_bytes())
        .await
        .unwrap();

    let bodies = fake.put_bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let (path, body) = &bodies[0];
    assert_eq!(path, "responses/x.json");
    assert_eq!(body["message"], "Nuova risposta survey");
    let decoded = STANDARD.decode(body["content"].as_str().unwrap()).unwrap();
    assert_eq!(String::from_utf8(decoded).unwrap(), "{\"q\": \"Sì\"}");
}

#[tokio::test]
async fn test_conflict_statuses_map_to_api_errors() {
    let (store, fake) = setup_store().await;
    fake.put_statuses.lock().unwrap().extend([409, 422, 401]);

    for expected in [409u16, 422] {
        let err = store
            .create_file("responses/x.json", "msg", b"{}")
            .await
            .unwrap_err();
        assert!(
            matches!(err, DocumentStoreError::Api { status, .. } if status == expected),
            "unexpected error {:?}",
            err
        );
        assert!(err.is_conflict());
    }

    let err = store
        .create_file("responses/x.json", "msg", b"{}")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!err.is_conflict());
}

#[tokio::test]
async fn test_listing_returns_files_sorted() {
    let (store, _fake) = setup_store().await;

    let entries = store.list_files("responses").await.unwrap();
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["responses/a.json", "responses/b.json"]);
}

#[tokio::test]
async fn test_missing_directory_lists_empty() {
    let (store, _fake) = setup_store().await;

    let entries = store.list_files("missing").await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_fetch_decodes_wrapped_content() {
    let (store, _fake) = setup_store().await;

    let raw = store.fetch_file("responses/a.json").await.unwrap();
    assert_eq!(String::from_utf8(raw).unwrap(), r#"{"bm_yes_no": "Sì"}"#);
}

#[tokio::test]
async fn test_fetch_missing_file_is_not_found() {
    let (store, _fake) = setup_store().await;

    let err = store.fetch_file("responses/none.json").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::NotFound(ref path) if path == "responses/none.json"));
}

#[tokio::test]
async fn test_fetch_error_carries_api_message() {
    let (store, _fake) = setup_store().await;

    let err = store.fetch_file("responses/forbidden.json").await.unwrap_err();
    match err {
        DocumentStoreError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Resource not accessible by integration");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}
