// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Backend connector
//
// Implements the UpstreamClient seam for a real reasoning backend:
// - Rewrite the requested model name via the resolver
// - Forward with reverse-proxy header hygiene
// - Streaming responses run through the StreamTransformer
// - Non-streaming responses pass through untouched

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::{StreamExt, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::models::ModelResolver;
use crate::proxy::{ProxyError, ProxyRequest, ProxyResponse, UpstreamClient};
use crate::stream::StreamTransformer;

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout_ms: Option<u64>,
    pub stream: bool,
}

pub enum HttpBody {
    Full(Bytes),
    Stream(Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>),
}

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: HttpBody,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

/// Sends HTTP requests to the backend.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// ---------------------------------------------------------------------------
// Reqwest HTTP sender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout_ms) = request.timeout_ms {
            req = req.timeout(std::time::Duration::from_millis(timeout_ms));
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(e.to_string())
            } else {
                HttpError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();

        if request.stream {
            let stream = resp
                .bytes_stream()
                .map_err(|e| HttpError::Transport(e.to_string()));
            Ok(HttpResponse {
                status,
                headers,
                body: HttpBody::Stream(Box::pin(stream)),
            })
        } else {
            let body = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(HttpResponse {
                status,
                headers,
                body: HttpBody::Full(body),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// GatewayUpstreamClient
// ---------------------------------------------------------------------------

pub struct GatewayDeps {
    pub config: Arc<Config>,
    pub resolver: Arc<ModelResolver>,
    pub http: Arc<dyn HttpSender>,
}

/// Upstream client that translates between the client protocol and the
/// reasoning backend.
pub struct GatewayUpstreamClient {
    deps: GatewayDeps,
}

impl GatewayUpstreamClient {
    pub fn new_with(deps: GatewayDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl UpstreamClient for GatewayUpstreamClient {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let request_id = Uuid::new_v4().to_string();

        // Rewrite the model name. The proxy layer already verified the body
        // parses; a failure here is still mapped, not unwrapped.
        let mut json: serde_json::Value = serde_json::from_slice(&request.body)
            .map_err(|e| ProxyError::MalformedJson(e.to_string()))?;

        let requested_model = json
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        let backend_model = self.deps.resolver.resolve(&requested_model).to_string();
        json["model"] = serde_json::Value::String(backend_model.clone());

        let stream = json.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);

        tracing::info!(
            request_id = %request_id,
            config_hash = %self.deps.config.config_hash,
            requested_model = %requested_model,
            backend_model = %backend_model,
            stream,
            "forwarding chat completion"
        );

        let body = serde_json::to_vec(&json)
            .map_err(|e| ProxyError::MalformedJson(e.to_string()))?;

        // Reverse proxy header hygiene:
        // - Host: strip the client's Host header (points at the gateway).
        //   reqwest sets the correct Host from the backend URL.
        // - Content-Length: the body changed after the model rewrite.
        let mut fwd_headers = request.headers.clone();
        fwd_headers.remove(reqwest::header::HOST);
        fwd_headers.remove(reqwest::header::CONTENT_LENGTH);
        if let Some(key) = &self.deps.config.upstream.api_key {
            if let Ok(value) = format!("Bearer {key}").parse() {
                fwd_headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        let http_req = HttpRequest {
            method: request.method.clone(),
            url: format!(
                "{}/v1/chat/completions",
                self.deps.config.upstream.base_url
            ),
            headers: fwd_headers,
            body: Bytes::from(body),
            timeout_ms: self.deps.config.upstream.timeout_ms,
            stream,
        };

        let upstream = self.deps.http.send(http_req).await.map_err(|e| match e {
            HttpError::Timeout(msg) => ProxyError::UpstreamTimeout(msg),
            HttpError::Transport(msg) => ProxyError::UpstreamFailure(msg),
        })?;

        if stream {
            return Ok(self.handle_streaming_response(upstream, &request_id));
        }

        // Non-streaming: straight pass-through. A non-2xx backend answer is
        // surfaced as a generic error payload with a fixed status.
        if !upstream.status.is_success() {
            tracing::warn!(
                request_id = %request_id,
                status = %upstream.status,
                "backend returned non-success status"
            );
            return Err(ProxyError::UpstreamFailure(format!(
                "backend returned status {}",
                upstream.status
            )));
        }

        let body_bytes = match upstream.body {
            HttpBody::Full(b) => b,
            HttpBody::Stream(mut s) => {
                let mut collected = Vec::new();
                while let Some(chunk) = s.next().await {
                    let bytes = chunk.map_err(|e| ProxyError::UpstreamFailure(e.to_string()))?;
                    collected.extend_from_slice(&bytes);
                }
                Bytes::from(collected)
            }
        };

        Ok(ProxyResponse {
            status: upstream.status,
            headers: upstream.headers,
            body: Body::from(body_bytes),
        })
    }
}

impl GatewayUpstreamClient {
    /// Wire the stream transformer between the backend body and the client.
    ///
    /// A non-2xx status on the streaming path closes the connection with an
    /// empty body and no error payload — asymmetric with the non-streaming
    /// path above, preserved deliberately.
    fn handle_streaming_response(&self, upstream: HttpResponse, request_id: &str) -> ProxyResponse {
        if !upstream.status.is_success() {
            tracing::warn!(
                request_id = %request_id,
                status = %upstream.status,
                "backend stream refused; closing without error payload"
            );
            return ProxyResponse {
                status: upstream.status,
                headers: HeaderMap::new(),
                body: Body::empty(),
            };
        }

        let input: Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>> =
            match upstream.body {
                HttpBody::Full(bytes) => Box::pin(futures_util::stream::once(async move {
                    Ok(bytes)
                })),
                HttpBody::Stream(s) => s,
            };

        let transformer = StreamTransformer::new(self.deps.config.reasoning.display);
        let transformed = transformer.transform(input);
        let body_stream = transformed.map(Ok::<Bytes, std::io::Error>);

        // The transformed body has a different length and framing than the
        // backend's; send fresh SSE headers instead of the backend's.
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            axum::http::HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(
            "cache-control",
            axum::http::HeaderValue::from_static("no-cache"),
        );

        ProxyResponse {
            status: upstream.status,
            headers,
            body: Body::from_stream(body_stream),
        }
    }
}

// ---------------------------------------------------------------------------
// Public factory for the default client
// ---------------------------------------------------------------------------

pub fn build_gateway_client(config: Arc<Config>, resolver: Arc<ModelResolver>) -> GatewayUpstreamClient {
    let deps = GatewayDeps {
        config,
        resolver,
        http: Arc::new(ReqwestHttpSender::new(reqwest::Client::new())),
    };

    GatewayUpstreamClient::new_with(deps)
}
