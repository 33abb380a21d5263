//! # Upstream Client
//!
//! Forwards one request to an upstream and relays the answer.
//!
//! - The whole exchange up to the response headers (and the body, when it is buffered) runs
//!   under one deadline. Exceeding it is treated like a connection error. No retries.
//! - Request headers are copied minus `Host`, hop-by-hop headers and `Content-Length`;
//!   `X-Forwarded-For` and `X-Request-ID` are added.
//! - Response headers are copied minus `Server` and hop-by-hop headers.
//! - Textual bodies (json, text, xml, form) are buffered so telemetry can keep a truncated
//!   copy. Other bodies are streamed through and recorded by size only.

use super::circuit_breaker::{CircuitBreakerConfig, CircuitBreakers};
use crate::middleware::RequestStamp;
use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode};
use lib_core::telemetry::{binary_marker, truncate_body};
use lib_core::{AppError, Config, RouteEntry};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Largest request or response body the gateway buffers.
const MAX_BUFFERED_BODY: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("upstream connection failed: {0}")]
    Connect(String),
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

// region: --- Bodies

/// Request body as it will be sent upstream.
pub enum Payload {
    Buffered(Bytes),
    Streamed(Body),
}

fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime.starts_with("text/")
        || mime.ends_with("json")
        || mime.ends_with("xml")
        || mime.ends_with("javascript")
        || mime == "application/x-www-form-urlencoded"
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Telemetry text for a buffered body.
fn summarize(bytes: &[u8], limit: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => truncate_body(text, limit),
        Err(_) => binary_marker(Some(bytes.len() as u64)),
    }
}

/// Decide how to carry the request body and what telemetry keeps of it.
///
/// Textual bodies and bodies without a content type are buffered.
pub async fn capture_request(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<(Payload, String), AppError> {
    let buffered = content_type(headers).map_or(true, |ct| is_textual(&ct));

    if !buffered {
        let marker = binary_marker(content_length(headers));
        return Ok((Payload::Streamed(body), marker));
    }

    let bytes = axum::body::to_bytes(body, MAX_BUFFERED_BODY)
        .await
        .map_err(|e| AppError::InvalidInput(format!("unreadable request body: {e}")))?;
    let summary = summarize(&bytes, limit);
    Ok((Payload::Buffered(bytes), summary))
}

// endregion: --- Bodies

// region: --- Headers

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn forward_headers(inbound: &HeaderMap, stamp: &RequestStamp) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 2);
    for (name, value) in inbound {
        if name == header::HOST || name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let forwarded_for = match inbound.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(prev) => format!("{prev}, {}", stamp.client_ip),
        None => stamp.client_ip.clone(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert("x-forwarded-for", value);
    }
    if let Ok(value) = HeaderValue::from_str(&stamp.id) {
        headers.insert("x-request-id", value);
    }

    headers
}

fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if name == header::SERVER || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

// endregion: --- Headers

// region: --- Client

/// Upstream answer ready to relay, plus what telemetry keeps of its body.
pub struct Forwarded {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    pub body_summary: String,
    pub content_type: Option<String>,
}

impl Forwarded {
    pub fn into_response(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

pub struct UpstreamClient {
    client: reqwest::Client,
    timeout: Duration,
    body_limit: usize,
    breakers: CircuitBreakers,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Config(format!("http client: {e}")))?;

        let breakers = CircuitBreakers::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_failure_threshold.max(1),
            success_threshold: config.circuit_success_threshold.max(1),
            open_duration: Duration::from_secs(config.circuit_open_secs),
        });

        Ok(Self {
            client,
            timeout: Duration::from_secs(config.upstream_timeout_secs),
            body_limit: config.telemetry_body_limit,
            breakers,
        })
    }

    /// Override the deadline (tests use sub-second values).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Forward to `entry`'s upstream. The path is rewritten by stripping the route prefix.
    pub async fn forward(
        &self,
        entry: &RouteEntry,
        parts: &Parts,
        payload: Payload,
        stamp: &RequestStamp,
    ) -> Result<Forwarded, UpstreamError> {
        let breaker = self.breakers.get(&entry.upstream_base_url);
        if breaker.allow_request().is_err() {
            return Err(UpstreamError::CircuitOpen(entry.upstream_base_url.clone()));
        }

        let url = entry.upstream_url(parts.uri.path(), parts.uri.query());
        let deadline = Instant::now() + self.timeout;

        let mut request = self
            .client
            .request(parts.method.clone(), &url)
            .headers(forward_headers(&parts.headers, stamp));

        request = match payload {
            Payload::Buffered(bytes) if bytes.is_empty() => request,
            Payload::Buffered(bytes) => request.body(bytes),
            Payload::Streamed(body) => {
                request.body(reqwest::Body::wrap_stream(body.into_data_stream()))
            }
        };

        tracing::debug!(url = %url, method = %parts.method, "[PROXY] Forwarding");

        let response = match tokio::time::timeout_at(deadline, request.send()).await {
            Err(_) => {
                breaker.record_failure();
                return Err(UpstreamError::Timeout(self.timeout));
            }
            Ok(Err(e)) => {
                breaker.record_failure();
                return Err(UpstreamError::Connect(e.to_string()));
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.is_server_error() {
            breaker.record_failure();
        } else {
            breaker.record_success();
        }

        let headers = relay_headers(response.headers());
        let content_type = content_type(response.headers());

        if !content_type.as_deref().is_some_and(is_textual) {
            let marker = binary_marker(response.content_length());
            return Ok(Forwarded {
                status,
                headers,
                body: Body::from_stream(response.bytes_stream()),
                body_summary: marker,
                content_type,
            });
        }

        let bytes = match tokio::time::timeout_at(deadline, response.bytes()).await {
            Err(_) => return Err(UpstreamError::Timeout(self.timeout)),
            Ok(Err(e)) => return Err(UpstreamError::Connect(e.to_string())),
            Ok(Ok(bytes)) => bytes,
        };

        Ok(Forwarded {
            status,
            headers,
            body_summary: summarize(&bytes, self.body_limit),
            body: Body::from(bytes),
            content_type,
        })
    }
}

// endregion: --- Client
