//! `GET /get-captcha`: arithmetic challenge bound to the `__SGCaptcha` cookie.
//!
//! The expected answer stays server-side and is consumed by the next captcha-checked login.

use crate::cookies::{read_cookie, CookiePolicy, SetCookie};
use axum::{
    extract::{Json, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use lib_auth::cookies::COOKIE_CAPTCHA;
use lib_auth::CaptchaService;
use lib_core::dto::ApiResponse;
use lib_core::{AppError, Config};
use serde_json::json;
use std::sync::Arc;

pub async fn get_captcha(
    State(captcha): State<Arc<CaptchaService>>,
    State(config): State<Config>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session_id = read_cookie(&headers, COOKIE_CAPTCHA);
    let challenge = captcha.generate(session_id.as_deref()).await?;

    let mut out = HeaderMap::new();
    SetCookie::new(COOKIE_CAPTCHA, &challenge.session_id)
        .policy(&CookiePolicy::from_config(&config))
        .append_to(&mut out);

    let body = ApiResponse::ok("Success generate captcha", json!({ "captcha": challenge.expression }));
    Ok((out, Json(body)).into_response())
}
