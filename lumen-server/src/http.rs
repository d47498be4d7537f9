//! Lumen HTTP API
//!
//! Axum-based HTTP server that exposes the chat relay over HTTP.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum dispatch
//! machinery, which improves coverage accuracy under tarpaulin.
//!
//! Endpoints:
//! - GET  /            — embedded chat page
//! - GET  /api/health  — health check with DB status
//! - POST /api/chat    — relay a prompt to the provider and persist the exchange

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use lumen_core::provider::{CompletionBackend, PROVIDER_ERROR_SENTINEL};
use lumen_core::store::ChatStore;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn ChatStore>,
    pub provider: Arc<dyn CompletionBackend>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
}

/// Start the HTTP server on the given address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    addr: &str,
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Lumen HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ChatRequest {
    pub message: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner chat relay — validates the message, asks the provider, persists the
/// exchange, and returns (status_code, json_body).
///
/// Provider failures never surface as HTTP errors: the upstream detail is
/// logged and the fixed sentinel text is stored and echoed in its place.
/// Store failures surface as an opaque 500 with no partial record.
pub async fn chat_inner(
    store: &dyn ChatStore,
    provider: &dyn CompletionBackend,
    req: ChatRequest,
) -> (StatusCode, serde_json::Value) {
    let message = match req.message {
        Some(m) if !m.is_empty() => m,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Message is required" }),
            );
        }
    };

    let response_text = match provider.complete(&message).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(backend = provider.name(), error = %e, "Provider call failed");
            PROVIDER_ERROR_SENTINEL.to_string()
        }
    };

    match store.create(&message, &response_text).await {
        Ok(record) => match serde_json::to_value(&record) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize chat record");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Server error" }),
                )
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to persist chat exchange");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Server error" }),
            )
        }
    }
}

/// Inner health check — pings the store and returns (status_code, json_body).
pub async fn health_inner(store: &dyn ChatStore) -> (StatusCode, serde_json::Value) {
    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "ok",
                "database": "connected",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "error",
                    "database": "disconnected",
                }),
            )
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(state.store.as_ref(), state.provider.as_ref(), req).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn index_handler() -> impl IntoResponse {
    Html(include_str!("../assets/index.html"))
}

// ============================================================================
// Unit Tests — call inner functions directly for reliable tarpaulin coverage
// ============================================================================
