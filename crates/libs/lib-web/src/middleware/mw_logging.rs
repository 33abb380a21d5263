//! # Request/Response Logging Middleware
//!
//! Structured logging for every HTTP request and response, correlated by request id.
//!
//! This middleware logs:
//! - Request method, path, query params, client IP
//! - Request headers at debug level, with credentials and cookies redacted
//! - Response status and duration, at a level derived from the status class
//!
//! Query strings of credential endpoints are not logged.

use crate::middleware::mw_req_stamp::RequestStamp;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Headers whose values are never logged (substring match, lowercase).
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "x-refresh-token",
    "csrf",
];

/// Endpoints whose query strings are not logged.
const SENSITIVE_ENDPOINTS: &[&str] = &[
    "/api/v1/auth/login",
    "/api/v1/auth/refresh",
    "/config-file",
    "/publish",
];

/// Header list with sensitive values replaced.
pub fn redacted_headers(headers: &axum::http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            if SENSITIVE_HEADERS.iter().any(|h| name_lower.contains(h)) {
                Some((name.to_string(), "***REDACTED***".to_string()))
            } else {
                value.to_str().ok().map(|v| (name.to_string(), v.to_string()))
            }
        })
        .collect()
}

/// Request/response logging middleware.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let is_sensitive = SENSITIVE_ENDPOINTS.iter().any(|ep| path.starts_with(ep));
    let query = if is_sensitive {
        None
    } else {
        req.uri().query().map(|q| q.to_string())
    };

    let (request_id, client_ip) = req
        .extensions()
        .get::<RequestStamp>()
        .map(|s| (s.id.clone(), s.client_ip.clone()))
        .unwrap_or_else(|| ("unknown".to_string(), "unknown".to_string()));

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        query = ?query,
        client_ip = %client_ip,
        "[REQUEST] {} {}",
        method,
        path
    );

    debug!(
        request_id = %request_id,
        headers = ?redacted_headers(req.headers()),
        "[REQUEST HEADERS]"
    );

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status();

    macro_rules! log_response {
        ($level:ident, $suffix:expr) => {
            $level!(
                request_id = %request_id,
                status = status.as_u16(),
                duration_ms,
                "[RESPONSE] {} {} -> {} ({}ms){}",
                method,
                path,
                status.as_u16(),
                duration_ms,
                $suffix
            )
        };
    }

    match status.as_u16() {
        500.. => log_response!(error, " [SERVER ERROR]"),
        400..=499 => log_response!(warn, " [CLIENT ERROR]"),
        _ => log_response!(info, ""),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn test_credentials_are_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("cookie", HeaderValue::from_static("__SGSession=abc"));
        headers.insert("x-sgcsrf-token", HeaderValue::from_static("tok"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let logged = redacted_headers(&headers);
        let value = |name: &str| {
            logged
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };

        assert_eq!(value("authorization"), "***REDACTED***");
        assert_eq!(value("cookie"), "***REDACTED***");
        assert_eq!(value("x-sgcsrf-token"), "***REDACTED***");
        assert_eq!(value("accept"), "application/json");
    }
}
