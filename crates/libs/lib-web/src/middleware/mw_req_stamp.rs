//! # Request Stamping Middleware
//!
//! Adds request metadata (ID, timestamp, client IP) to requests for tracing and telemetry.
//!
//! An inbound `X-Request-ID` is reused so a caller's correlation id survives the hop; otherwise
//! a UUID is generated. The id is echoed in the response `X-Request-ID` header and forwarded
//! upstream by the dispatcher.
//!
//! Handlers read the stamp as an extractor:
//!
//! ```rust,ignore
//! async fn handler(stamp: RequestStamp) -> String {
//!     format!("Request ID: {} from {}", stamp.id, stamp.client_ip)
//! }
//! ```

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::SystemTime;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Request metadata for tracing and debugging.
#[derive(Clone, Debug)]
pub struct RequestStamp {
    /// Unique request identifier
    pub id: String,
    /// Request timestamp
    pub timestamp: SystemTime,
    /// First `X-Forwarded-For` hop, `X-Real-IP`, or the peer address.
    pub client_ip: String,
}

impl RequestStamp {
    fn from_request(headers: &HeaderMap, extensions: &axum::http::Extensions) -> Self {
        let id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            id,
            timestamp: SystemTime::now(),
            client_ip: client_ip(headers, extensions),
        }
    }
}

/// Best-effort caller address.
fn client_ip(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Falls back to a fresh stamp when the middleware did not run.
impl<S: Send + Sync> FromRequestParts<S> for RequestStamp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestStamp>()
            .cloned()
            .unwrap_or_else(|| RequestStamp::from_request(&parts.headers, &parts.extensions)))
    }
}

/// Request stamping middleware.
///
/// Adds the stamp to request extensions and the id to the `X-Request-ID` response header.
pub async fn stamp_req(mut req: Request, next: Next) -> Response {
    let stamp = RequestStamp::from_request(req.headers(), req.extensions());

    req.extensions_mut().insert(stamp.clone());

    let mut res = next.run(req).await;

    if let Ok(header_value) = HeaderValue::from_str(&stamp.id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    async fn echo(stamp: RequestStamp) -> String {
        format!("{}|{}", stamp.id, stamp.client_ip)
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(echo))
            .layer(axum::middleware::from_fn(stamp_req))
    }

    #[tokio::test]
    async fn test_generates_id_and_sets_header() {
        let res = app()
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = res.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap().to_string();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();

        assert!(body.starts_with(&header));
        assert!(Uuid::parse_str(&header).is_ok());
    }

    #[tokio::test]
    async fn test_reuses_inbound_id_and_forwarded_ip() {
        let res = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header("x-request-id", "abc-123")
                    .header("x-forwarded-for", "10.1.2.3, 172.16.0.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abc-123|10.1.2.3");
    }
}
