//! # Admin Authentication Middleware
//!
//! HTTP Basic authentication for the administrative API (`/config-file`, `/publish`).
//! Credentials come from `ADMIN_USERNAME`/`ADMIN_PASSWORD`; when they are unset the admin API
//! answers 404 as if it did not exist.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use lib_core::{AppError, Config};
use subtle::ConstantTimeEq;
use tracing::warn;

pub async fn require_admin(
    State(config): State<Config>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (Some(expected_user), Some(expected_pass)) =
        (config.admin_username.as_deref(), config.admin_password.as_deref())
    else {
        return Err(AppError::NotFound("Not Found".to_string()));
    };

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| lib_utils::b64_decode_to_string(v.trim()).ok());

    let Some((user, pass)) = presented.as_deref().and_then(|c| c.split_once(':')) else {
        warn!(path = %req.uri().path(), "[ADMIN] Missing basic credentials");
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    };

    let user_ok = user.as_bytes().ct_eq(expected_user.as_bytes());
    let pass_ok = pass.as_bytes().ct_eq(expected_pass.as_bytes());
    if !bool::from(user_ok & pass_ok) {
        warn!(path = %req.uri().path(), "[ADMIN] Invalid basic credentials");
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }

    Ok(next.run(req).await)
}
