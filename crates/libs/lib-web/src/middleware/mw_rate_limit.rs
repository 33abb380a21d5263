//! # Rate Limit Middleware
//!
//! Fixed-window request budget per client IP. Counters live in the shared [`KvStore`] under
//! `rate:<ip>`, so every gateway instance on the same Redis draws from one budget.
//!
//! [`KvStore`]: lib_core::KvStore

use crate::middleware::RequestStamp;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use lib_core::{AppError, SharedKv};
use std::sync::Arc;
use tracing::{debug, warn};

pub const RATE_LIMITED_MESSAGE: &str = "be slow bro...";

pub struct RateLimiter {
    kv: SharedKv,
    max_requests: u64,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(kv: SharedKv, max_requests: u64, window_secs: u64) -> Self {
        Self {
            kv,
            max_requests,
            window_secs,
        }
    }

    pub fn enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// Count one request for `client` and report whether it is within budget.
    pub async fn check(&self, client: &str) -> Result<bool, AppError> {
        let count = self
            .kv
            .incr_window(&format!("rate:{client}"), self.window_secs)
            .await?;
        debug!(client, count, max = self.max_requests, "[RATE] Window count");
        Ok(count <= self.max_requests as i64)
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    stamp: RequestStamp,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !limiter.enabled() {
        return Ok(next.run(req).await);
    }

    // Fails open when the counter store is unreachable.
    match limiter.check(&stamp.client_ip).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(client = %stamp.client_ip, path = %req.uri().path(), "[RATE] Request budget exhausted");
            return Err(AppError::TooManyRequests(RATE_LIMITED_MESSAGE.to_string()));
        }
        Err(e) => warn!(error = %e, "[RATE] Counter unavailable, letting request through"),
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{create_router, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lib_core::Config;
    use serde_json::Value;
    use tower::ServiceExt;

    fn config(max: u64) -> Config {
        Config {
            jwt_secret: "rate-test-secret-rate-test-secret-01234".to_string(),
            rate_limit_max: max,
            rate_limit_window_secs: 60,
            ..Config::default()
        }
    }

    async fn live_from(app: &axum::Router, ip: &str) -> (StatusCode, Value) {
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/live")
                    .header("x-forwarded-for", format!("{ip}, 10.0.0.1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_request_over_budget_is_rejected() {
        let app = create_router(test_state(config(3)).await);

        for _ in 0..3 {
            let (status, _) = live_from(&app, "203.0.113.7").await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = live_from(&app, "203.0.113.7").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["message"], RATE_LIMITED_MESSAGE);

        // Budgets are per client.
        let (status, _) = live_from(&app, "198.51.100.2").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_zero_budget_disables_limit() {
        let app = create_router(test_state(config(0)).await);

        for _ in 0..20 {
            let (status, _) = live_from(&app, "203.0.113.7").await;
            assert_eq!(status, StatusCode::OK);
        }
    }
}
