// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Route /v1/chat/completions to the injected upstream client
// - Serve /v1/models from the resolver's alias table
// - Heartbeat endpoint
// - 404 for unknown paths
//
// Everything here is stateless mapping; the streaming transformer lives
// behind the UpstreamClient seam.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
#[cfg(test)]
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;

use crate::models::ModelResolver;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Inbound request data forwarded to the upstream client.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response handed back by the upstream client. For streaming requests the
/// body is a live SSE stream already run through the transformer.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyResponse {
    pub fn from_bytes(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::from(body),
        }
    }
}

/// Errors that can occur during upstream forwarding.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("request body is empty")]
    EmptyBody,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        // Fixed public messages; details stay in logs.
        let (status, public_message) = match &self {
            ProxyError::UpstreamFailure(_) => {
                (StatusCode::BAD_GATEWAY, "upstream request failed")
            }
            ProxyError::UpstreamTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream request timed out")
            }
            ProxyError::MalformedJson(_) => {
                (StatusCode::BAD_REQUEST, "request body is not valid JSON")
            }
            ProxyError::EmptyBody => (StatusCode::BAD_REQUEST, "request body is empty"),
        };
        let body = serde_json::json!({
            "error": { "message": public_message, "type": "gateway_error" }
        });
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the client that forwards chat completions to the
/// reasoning backend.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub resolver: Arc<ModelResolver>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// GET /v1/models — the inbound names the gateway accepts, in the OpenAI
/// list shape.
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let data: Vec<serde_json::Value> = state
        .resolver
        .listed_models()
        .into_iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "object": "model",
                "owned_by": "thinkgate",
            })
        })
        .collect();

    Json(serde_json::json!({ "object": "list", "data": data }))
}

/// POST /v1/chat/completions — validate and forward.
pub async fn chat_completions(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();

    // Read body (bounded)
    let body = match axum::body::to_bytes(request.into_body(), 10 * 1024 * 1024).await {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {e}"),
            )
                .into_response()
        }
    };

    // Only enough validation to select a backend model downstream.
    if body.is_empty() {
        return ProxyError::EmptyBody.into_response();
    }
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        return ProxyError::MalformedJson("request body is not valid JSON".into())
            .into_response();
    }

    let proxy_req = ProxyRequest {
        method,
        uri,
        headers,
        body,
    };

    match state.upstream.forward(proxy_req).await {
        Ok(resp) => {
            let mut response = Response::builder().status(resp.status);
            if let Some(h) = response.headers_mut() {
                *h = resp.headers;
            }
            match response.body(resp.body) {
                Ok(r) => r.into_response(),
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("failed to build response: {e}"),
                )
                    .into_response(),
            }
        }
        Err(e) => e.into_response(),
    }
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. The upstream client and resolver are injected —
/// no side effects, no hard-coded clients.
pub fn build_router(upstream: Arc<dyn UpstreamClient>, resolver: Arc<ModelResolver>) -> Router {
    let state = AppState { upstream, resolver };

    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}

/// The address the gateway binds to. Always localhost, never 0.0.0.0.
pub const BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9820);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
