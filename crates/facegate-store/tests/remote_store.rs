//! RemoteStore against an in-process fake of the backend embedding service.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facegate_core::Embedding;
use facegate_store::{CachedStore, EmbeddingStore, RemoteConfig, RemoteStore, StoreError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Backend {
    /// user_id → JSON-encoded embedding string, as the service stores it.
    rows: Mutex<HashMap<String, String>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

type Shared = Arc<Backend>;

async fn get_embedding(State(state): State<Shared>, Path(user_id): Path<String>) -> Response {
    state.reads.fetch_add(1, Ordering::SeqCst);
    match user_id.as_str() {
        "broken" => return (StatusCode::INTERNAL_SERVER_ERROR, "db down").into_response(),
        "slow" => tokio::time::sleep(Duration::from_secs(2)).await,
        _ => {}
    }
    let rows = state.rows.lock().unwrap();
    match rows.get(&user_id) {
        Some(embedding) => Json(json!({"user_id": user_id, "embedding": embedding})).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "Embedding not found"}))).into_response(),
    }
}

async fn save_embedding(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.writes.fetch_add(1, Ordering::SeqCst);
    let (Some(user_id), Some(embedding)) = (body["user_id"].as_str(), body["embedding"].as_str())
    else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"}))).into_response();
    };
    if user_id == "readonly" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to save embedding").into_response();
    }
    state
        .rows
        .lock()
        .unwrap()
        .insert(user_id.to_string(), embedding.to_string());
    Json(json!({"message": "Embedding saved successfully", "embedding_id": user_id})).into_response()
}

async fn spawn_backend() -> (String, Shared) {
    let state: Shared = Arc::new(Backend::default());
    let app = Router::new()
        .route("/api/v1/embeddings", post(save_embedding))
        .route("/api/v1/embeddings/user/:user_id", get(get_embedding))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/v1"), state)
}

fn remote(base: &str) -> RemoteStore {
    let mut config = RemoteConfig::new(base);
    config.read_timeout = Duration::from_millis(300);
    config.write_timeout = Duration::from_millis(300);
    RemoteStore::new(config).unwrap()
}

#[tokio::test]
async fn put_then_get_roundtrip() {
    let (base, state) = spawn_backend().await;
    let store = remote(&base);

    store.put("u1", &Embedding::new(vec![0.6, 0.8])).await.unwrap();
    assert_eq!(state.rows.lock().unwrap().get("u1").unwrap(), "[0.6,0.8]");

    let record = store.get("u1").await.unwrap().unwrap();
    assert_eq!(record.user_id, "u1");
    assert_eq!(record.embedding.values, vec![0.6, 0.8]);
}

#[tokio::test]
async fn unknown_user_is_none() {
    let (base, _) = spawn_backend().await;
    assert!(remote(&base).get("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn server_error_is_not_absence() {
    let (base, _) = spawn_backend().await;
    let err = remote(&base).get("broken").await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 500, .. }), "{err}");
}

#[tokio::test]
async fn read_timeout_is_error() {
    let (base, _) = spawn_backend().await;
    let err = remote(&base).get("slow").await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

#[tokio::test]
async fn unreachable_backend_is_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = remote(&format!("http://{addr}/api/v1")).get("u1").await.unwrap_err();
    assert!(matches!(err, StoreError::Http(_)), "{err}");
}

#[tokio::test]
async fn failed_write_is_error() {
    let (base, _) = spawn_backend().await;
    let err = remote(&base)
        .put("readonly", &Embedding::new(vec![1.0]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 500, .. }), "{err}");
}

#[tokio::test]
async fn cached_remote_skips_read_after_enrollment() {
    let (base, state) = spawn_backend().await;
    let store = CachedStore::new(remote(&base));

    store.put("u1", &Embedding::new(vec![1.0, 0.0])).await.unwrap();
    let record = store.get("u1").await.unwrap().unwrap();

    assert_eq!(record.embedding.values, vec![1.0, 0.0]);
    assert_eq!(state.writes.load(Ordering::SeqCst), 1);
    assert_eq!(state.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cached_remote_failed_write_not_cached() {
    let (base, state) = spawn_backend().await;
    let store = CachedStore::new(remote(&base));

    assert!(store.put("readonly", &Embedding::new(vec![1.0])).await.is_err());
    assert!(!store.is_cached("readonly"));
    assert!(store.get("readonly").await.unwrap().is_none());
    assert_eq!(state.reads.load(Ordering::SeqCst), 1);
}
