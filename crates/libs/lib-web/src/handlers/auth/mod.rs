//! # Authentication Handlers
//!
//! Login, token refresh, logout and session lookup.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/auth/login?captcha&block&session&single_login&httponly&domain`
//! - `POST /api/v1/auth/refresh?httponly&domain`
//! - `GET /api/v1/auth/logout` (bearer auth)
//! - `GET /api/v1/auth/get-session` (bearer auth)
//! - `GET /api/v1/auth/session`
//!
//! ## Login flow
//!
//! ```text
//! captcha? ──▶ find account ──▶ status ──▶ password ──▶ stamp login + new authKey
//!                                             │                 │
//!                                  attempts++ / block      session? single_login?
//!                                                                │
//!                                                   tokens as JSON, or as cookies (httponly)
//! ```

use crate::cookies::{read_cookie, CookiePolicy, SetCookie};
use crate::middleware::RequestStamp;
use axum::{
    extract::{Json, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
    Extension,
};
use lib_auth::cookies::{COOKIE_CAPTCHA, COOKIE_JWT, COOKIE_REFRESH_JWT, COOKIE_SESSION};
use lib_auth::{
    verify_decoy, verify_password, AuthError, CaptchaService, SessionStore, SingleLoginRegistry,
    TokenPair, TokenService,
};
use lib_core::dto::{AccountStatus, ApiResponse, LoginInput, LoginQuery, LoginResponse, UserData};
use lib_core::model::store::UserRepository;
use lib_core::{AppError, Config, DbPool};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const AUTH_KEY_LEN: usize = 32;

/// Shared by unknown identities and wrong passwords outside block mode.
const WRONG_CREDENTIALS: &str = "wrong identity or password";

#[cfg(test)]
mod tests;

// region: --- Login

#[instrument(skip_all, fields(identity = %input.identity, ip = %stamp.client_ip))]
#[allow(clippy::too_many_arguments)]
pub async fn login(
    State(pool): State<DbPool>,
    State(config): State<Config>,
    State(tokens): State<Arc<TokenService>>,
    State(sessions): State<Arc<SessionStore>>,
    State(single_login): State<Arc<SingleLoginRegistry>>,
    State(captcha): State<Arc<CaptchaService>>,
    stamp: RequestStamp,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
    Json(input): Json<LoginInput>,
) -> Result<Response, AppError> {
    info!("[LOGIN] Login request");

    lib_utils::validate_not_empty(&input.identity, "identity").map_err(AppError::InvalidInput)?;
    lib_utils::validate_not_empty(&input.password, "password").map_err(AppError::InvalidInput)?;

    let cookie_domain = cookie_domain(&query)?;

    if query.captcha {
        let captcha_sid = read_cookie(&headers, COOKIE_CAPTCHA);
        captcha
            .verify(captcha_sid.as_deref(), input.captcha)
            .await
            .map_err(|e| {
                warn!(reason = %e, "[LOGIN] Captcha rejected");
                AppError::from(e)
            })?;
    }

    // Unknown identities get the same answer, and the same hashing cost, as a wrong password.
    let Some(account) = UserRepository::find_by_identity(&pool, &input.identity).await? else {
        verify_decoy(&input.password);
        warn!("[LOGIN] Unknown identity");
        return Err(AppError::Unauthorized(WRONG_CREDENTIALS.to_string()));
    };

    if AccountStatus::from_code(account.status_account) != AccountStatus::Active {
        warn!(account = %account.id_account, "[LOGIN] Account not active");
        return Err(AppError::Unauthorized(
            "your account is not active or blocked".to_string(),
        ));
    }

    if !verify_password(&input.password, &account.password_hash) {
        let attempts =
            UserRepository::record_failed_login(&pool, &account.id_account, &stamp.client_ip).await?;
        warn!(account = %account.id_account, attempts, "[LOGIN] Wrong password");

        if !query.block {
            return Err(AppError::Unauthorized(WRONG_CREDENTIALS.to_string()));
        }

        let max = config.max_login_attempts;
        if attempts >= max {
            UserRepository::block(&pool, &account.id_account).await?;
            warn!(account = %account.id_account, "[LOGIN] Account blocked");
            return Err(AppError::Unauthorized(format!(
                "your account has been blocked after {max} wrong passwords"
            )));
        }
        return Err(AppError::Unauthorized(format!(
            "wrong password, you have {} chances left",
            max - attempts
        )));
    }

    let auth_key = lib_utils::random_key(AUTH_KEY_LEN);
    let account = UserRepository::record_successful_login(
        &pool,
        &account.id_account,
        &stamp.client_ip,
        lib_utils::now_unix(),
        &auth_key,
    )
    .await?;
    let user = account.to_user_data(&auth_key);

    let policy = CookiePolicy::from_config(&config);
    let mut out_headers = HeaderMap::new();

    if query.session {
        let previous = read_cookie(&headers, COOKIE_SESSION);
        let sid = sessions.regenerate(previous.as_deref(), &user).await?;
        SetCookie::new(COOKIE_SESSION, &sid)
            .policy(&policy)
            .max_age(sessions.ttl_secs() as i64)
            .append_to(&mut out_headers);
        debug!(account = %user.id_account, "[LOGIN] Session saved");
    }

    if query.single_login {
        single_login.register(&user.id_account, &auth_key).await?;
        debug!(account = %user.id_account, "[LOGIN] Single login registered");
    }

    let pair = tokens.issue_pair(&user).await?;
    info!(account = %user.id_account, "[LOGIN] Success");

    Ok(token_response(
        &tokens,
        &policy,
        out_headers,
        cookie_domain.as_deref(),
        user,
        pair,
        "Success Login",
    ))
}

// endregion: --- Login

// region: --- Refresh

/// Rotate a refresh token into a new access/refresh pair.
#[instrument(skip_all)]
pub async fn refresh(
    State(config): State<Config>,
    State(tokens): State<Arc<TokenService>>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let cookie_domain = cookie_domain(&query)?;

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| read_cookie(&headers, COOKIE_REFRESH_JWT))
        .ok_or_else(|| AppError::from(AuthError::MissingCredentials))?;

    let (user, pair) = tokens.rotate(&presented).await.map_err(|e| {
        warn!(reason = %e, "[REFRESH] Rotation refused");
        AppError::from(e)
    })?;
    info!(account = %user.id_account, "[REFRESH] Refresh token rotated");

    let policy = CookiePolicy::from_config(&config);
    Ok(token_response(
        &tokens,
        &policy,
        HeaderMap::new(),
        cookie_domain.as_deref(),
        user,
        pair,
        "Refresh token rotated",
    ))
}

// endregion: --- Refresh

// region: --- Logout and Session

/// Destroy the session, revoke the refresh token and expire the auth cookies.
#[instrument(skip_all, fields(account = %principal.id_account))]
pub async fn logout(
    State(config): State<Config>,
    State(tokens): State<Arc<TokenService>>,
    State(sessions): State<Arc<SessionStore>>,
    Extension(principal): Extension<UserData>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(sid) = read_cookie(&headers, COOKIE_SESSION) {
        sessions.destroy(&sid).await?;
    }

    let refresh_token = read_cookie(&headers, COOKIE_REFRESH_JWT).or_else(|| {
        headers
            .get("x-refresh-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    match refresh_token {
        Some(token) => {
            if let Err(e) = tokens.logout(&token).await {
                debug!(reason = %e, "[LOGOUT] Presented refresh token not revocable, revoking account record");
                tokens.revoke_account(&principal.id_account).await?;
            }
        }
        None => tokens.revoke_account(&principal.id_account).await?,
    }

    let policy = CookiePolicy::from_config(&config);
    let mut out_headers = HeaderMap::new();
    for name in [COOKIE_JWT, COOKIE_REFRESH_JWT, COOKIE_SESSION] {
        SetCookie::expired(name, &policy).append_to(&mut out_headers);
    }

    info!("[LOGOUT] Success");
    Ok((out_headers, Json(ApiResponse::message("Success Logout"))).into_response())
}

/// Principal behind the presented access token.
pub async fn get_session(Extension(principal): Extension<UserData>) -> Json<ApiResponse<UserData>> {
    Json(ApiResponse::ok("Success get session", principal))
}

/// Session record bound to the `__SGSession` cookie, if any.
pub async fn session(
    State(sessions): State<Arc<SessionStore>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let record = match read_cookie(&headers, COOKIE_SESSION) {
        Some(sid) => sessions.get(&sid).await?,
        None => None,
    };

    Ok(match record {
        Some(record) => Json(ApiResponse::ok("Success get session", record)).into_response(),
        None => Json(ApiResponse::message("no session")).into_response(),
    })
}

// endregion: --- Logout and Session

// region: --- Helpers

/// `httponly` requires `domain`. Checked before anything is written.
fn cookie_domain(query: &LoginQuery) -> Result<Option<String>, AppError> {
    if !query.httponly {
        return Ok(None);
    }
    match query.domain.as_deref().map(str::trim) {
        Some(domain) if !domain.is_empty() => Ok(Some(domain.to_string())),
        _ => Err(AppError::Unprocessable("need domain params".to_string())),
    }
}

/// Tokens as a JSON body, or as cookies when a domain was requested.
fn token_response(
    tokens: &TokenService,
    policy: &CookiePolicy,
    mut headers: HeaderMap,
    domain: Option<&str>,
    user: UserData,
    pair: TokenPair,
    message: &str,
) -> Response {
    let Some(domain) = domain else {
        let body = LoginResponse {
            user_data: user,
            token: pair.access_token,
            refresh_token: pair.refresh_token,
        };
        return (headers, Json(ApiResponse::ok(message, body))).into_response();
    };

    SetCookie::strict(COOKIE_REFRESH_JWT, &pair.refresh_token)
        .max_age(tokens.refresh_ttl_secs())
        .append_to(&mut headers);
    SetCookie::new(COOKIE_JWT, &format!("Bearer {}", pair.access_token))
        .policy(policy)
        .domain(domain)
        .max_age(tokens.access_ttl_secs())
        .append_to(&mut headers);

    let message = format!("{message} for domain:{domain}");
    (headers, Json(ApiResponse::ok(message, user))).into_response()
}

// endregion: --- Helpers
