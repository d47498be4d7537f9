//! HTTP integration tests for the Lumen chat relay.
//!
//! These tests drive the full axum router via `tower::ServiceExt::oneshot`,
//! with an in-memory store double and a wiremock-backed provider so no live
//! PostgreSQL or vendor API is required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use lumen_core::models::ChatRecord;
use lumen_core::provider::{
    CompletionBackend, MistralClient, ProviderError, PROVIDER_ERROR_SENTINEL,
};
use lumen_core::store::{ChatStore, StoreError};
use lumen_server::http::{build_router, HttpState};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ===========================================================================
// Test doubles
// ===========================================================================

struct MemoryStore {
    writes: AtomicUsize,
    fail: bool,
}

impl MemoryStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            writes: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            writes: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create(&self, prompt: &str, response: &str) -> Result<ChatRecord, StoreError> {
        if self.fail {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(ChatRecord {
            id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

struct StubBackend(String);

#[async_trait]
impl CompletionBackend for StubBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

fn make_router(store: Arc<dyn ChatStore>, provider: Arc<dyn CompletionBackend>) -> axum::Router {
    build_router(Arc::new(HttpState { store, provider }))
}

fn chat_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Real Mistral client pointed at a wiremock server.
fn mistral_backend(base_url: &str) -> Arc<dyn CompletionBackend> {
    Arc::new(
        MistralClient::with_base_url(
            "test-api-key".to_string(),
            "mistral-small".to_string(),
            base_url.to_string(),
        )
        .expect("Failed to create client"),
    )
}

// ===========================================================================
// TEST 1: POST /api/chat — full round trip through a mocked provider
// ===========================================================================
#[tokio::test]
async fn test_chat_round_trip_with_mocked_provider() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "4" } }
            ]
        })))
        .mount(&mock_server)
        .await;

    let store = MemoryStore::new();
    let app = make_router(store.clone(), mistral_backend(&mock_server.uri()));

    let resp = app
        .oneshot(chat_request(json!({ "message": "What is 2+2?" })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = response_json(resp).await;
    assert_eq!(body["prompt"], "What is 2+2?");
    assert_eq!(body["response"], "4");
    assert!(body["id"].is_string());
    assert!(body["createdAt"].is_string());
    assert_eq!(store.write_count(), 1);
}

// ===========================================================================
// TEST 2: POST /api/chat — provider 500 degrades to the sentinel, still 200
// ===========================================================================
#[tokio::test]
async fn test_chat_provider_failure_returns_sentinel() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "upstream on fire" }
        })))
        .mount(&mock_server)
        .await;

    let store = MemoryStore::new();
    let app = make_router(store.clone(), mistral_backend(&mock_server.uri()));

    let resp = app
        .oneshot(chat_request(json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(
        resp.status(),
        StatusCode::OK,
        "Provider failure must not surface as an HTTP error"
    );
    let body = response_json(resp).await;
    assert_eq!(body["response"], PROVIDER_ERROR_SENTINEL);
    assert_eq!(store.write_count(), 1, "Failed round trip is still persisted");
}

// ===========================================================================
// TEST 3: POST /api/chat — missing message is a 400 with no provider call
// ===========================================================================
#[tokio::test]
async fn test_chat_missing_message_is_400() {
    let mock_server = MockServer::start().await;
    // Expect zero provider calls
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let store = MemoryStore::new();
    let app = make_router(store.clone(), mistral_backend(&mock_server.uri()));

    let resp = app.oneshot(chat_request(json!({}))).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = response_json(resp).await;
    assert_eq!(body["error"], "Message is required");
    assert_eq!(store.write_count(), 0);
}

// ===========================================================================
// TEST 4: POST /api/chat — empty message is a 400
// ===========================================================================
#[tokio::test]
async fn test_chat_empty_message_is_400() {
    let store = MemoryStore::new();
    let app = make_router(store.clone(), Arc::new(StubBackend("unused".into())));

    let resp = app
        .oneshot(chat_request(json!({ "message": "" })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.write_count(), 0);
}

// ===========================================================================
// TEST 5: POST /api/chat — store failure is an opaque 500
// ===========================================================================
#[tokio::test]
async fn test_chat_store_failure_is_500() {
    let app = make_router(MemoryStore::failing(), Arc::new(StubBackend("4".into())));

    let resp = app
        .oneshot(chat_request(json!({ "message": "What is 2+2?" })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response_json(resp).await;
    assert_eq!(body["error"], "Server error");
    assert!(body.get("id").is_none(), "No partial record may be echoed");
}

// ===========================================================================
// TEST 6: GET /api/health — connected and disconnected states
// ===========================================================================
#[tokio::test]
async fn test_health_connected() {
    let app = make_router(MemoryStore::new(), Arc::new(StubBackend("unused".into())));

    let req = Request::builder()
        .method("GET")
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = response_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_health_disconnected() {
    let app = make_router(MemoryStore::failing(), Arc::new(StubBackend("unused".into())));

    let req = Request::builder()
        .method("GET")
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = response_json(resp).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["database"], "disconnected");
}

// ===========================================================================
// TEST 7: GET / — embedded chat page is served
// ===========================================================================
#[tokio::test]
async fn test_index_serves_chat_page() {
    let app = make_router(MemoryStore::new(), Arc::new(StubBackend("unused".into())));

    let req = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let page = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(page.contains("Lumen Chat"));
    assert!(page.contains("/api/chat"));
}

// ===========================================================================
// TEST 8: identical prompts produce two distinct records
// ===========================================================================
#[tokio::test]
async fn test_identical_prompts_are_not_deduplicated() {
    let store = MemoryStore::new();
    let provider: Arc<dyn CompletionBackend> = Arc::new(StubBackend("same".into()));

    let first = make_router(store.clone(), provider.clone())
        .oneshot(chat_request(json!({ "message": "repeat me" })))
        .await
        .unwrap();
    let second = make_router(store.clone(), provider.clone())
        .oneshot(chat_request(json!({ "message": "repeat me" })))
        .await
        .unwrap();

    let first = response_json(first).await;
    let second = response_json(second).await;

    assert_ne!(first["id"], second["id"]);
    assert_eq!(store.write_count(), 2);
}
