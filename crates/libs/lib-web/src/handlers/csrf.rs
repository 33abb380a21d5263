//! # CSRF Token Handlers
//!
//! - `GET /secure-gateway-c`, `GET /api/secure-gateway-c`: mint a token bound to the
//!   `__SGCsrfSession` cookie and return it in the configured header and the body.
//! - `GET /secure-gateway-c-cookie`: same, and also set it as the readable `__SGCsrf` cookie
//!   for clients that echo the cookie instead of a header.

use crate::cookies::{read_cookie, CookiePolicy, SetCookie};
use crate::middleware::Guards;
use axum::{
    extract::{Json, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use lib_auth::cookies::{COOKIE_CSRF, COOKIE_CSRF_SESSION};
use lib_auth::{CsrfGuard, CsrfToken};
use lib_core::dto::ApiResponse;
use lib_core::{AppError, Config};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfBody {
    pub csrf_token: String,
}

async fn mint(csrf: &CsrfGuard, headers: &HeaderMap) -> Result<CsrfToken, AppError> {
    let session_id = read_cookie(headers, COOKIE_CSRF_SESSION);
    let token = csrf.issue(session_id.as_deref()).await?;
    debug!("[CSRF] Token issued");
    Ok(token)
}

fn respond(
    guards: &Guards,
    policy: &CookiePolicy,
    ttl_secs: u64,
    token: CsrfToken,
    as_cookie: bool,
) -> Result<Response, AppError> {
    let mut headers = HeaderMap::new();
    SetCookie::new(COOKIE_CSRF_SESSION, &token.session_id)
        .policy(policy)
        .max_age(ttl_secs as i64)
        .append_to(&mut headers);

    if as_cookie {
        SetCookie::new(COOKIE_CSRF, &token.token)
            .policy(policy)
            .readable()
            .max_age(ttl_secs as i64)
            .append_to(&mut headers);
    }

    let value = HeaderValue::from_str(&token.token)
        .map_err(|e| AppError::Internal(format!("csrf header value: {e}")))?;
    headers.insert(guards.csrf_header().clone(), value);

    let body = CsrfBody {
        csrf_token: token.token,
    };
    Ok((headers, Json(ApiResponse::ok("ok", body))).into_response())
}

pub async fn issue_token(
    State(csrf): State<Arc<CsrfGuard>>,
    State(guards): State<Guards>,
    State(config): State<Config>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = mint(&csrf, &headers).await?;
    respond(&guards, &CookiePolicy::from_config(&config), csrf.ttl_secs(), token, false)
}

pub async fn issue_cookie_token(
    State(csrf): State<Arc<CsrfGuard>>,
    State(guards): State<Guards>,
    State(config): State<Config>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = mint(&csrf, &headers).await?;
    respond(&guards, &CookiePolicy::from_config(&config), csrf.ttl_secs(), token, true)
}

#[cfg(test)]
mod tests {
    use crate::server::{create_router, test_state};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use lib_core::Config;
    use tower::ServiceExt;

    fn config() -> Config {
        Config {
            jwt_secret: "csrf-test-secret-csrf-test-secret-0123".to_string(),
            ..Config::default()
        }
    }

    fn cookie(res_headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
        res_headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|c| c.starts_with(&format!("{name}=")))
            .map(str::to_string)
    }

    #[tokio::test]
    async fn test_issued_token_validates_for_its_session() {
        let state = test_state(config()).await;
        let app = create_router(state.clone());

        let res = app
            .oneshot(Request::builder().uri("/secure-gateway-c").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let token = res.headers().get("x-sgcsrf-token").unwrap().to_str().unwrap().to_string();
        let session_cookie = cookie(res.headers(), "__SGCsrfSession").unwrap();
        assert!(session_cookie.contains("HttpOnly"));
        assert!(cookie(res.headers(), "__SGCsrf").is_none());

        let sid = session_cookie
            .split(';')
            .next()
            .and_then(|kv| kv.split_once('='))
            .map(|(_, v)| v.to_string())
            .unwrap();
        assert!(state.csrf.validate(Some(&sid), Some(&token)).await.is_ok());
        assert!(state.csrf.validate(Some("other-session"), Some(&token)).await.is_err());
    }

    #[tokio::test]
    async fn test_cookie_variant_sets_readable_token() {
        let state = test_state(config()).await;
        let app = create_router(state);

        let res = app
            .oneshot(
                Request::builder()
                    .uri("/secure-gateway-c-cookie")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let csrf_cookie = cookie(res.headers(), "__SGCsrf").unwrap();
        assert!(!csrf_cookie.contains("HttpOnly"));
    }
}
