//! # Guard Middleware
//!
//! The per-route guard chain and the middleware built from it.
//!
//! For a matched route the chain runs in a fixed order, skipping guards whose flag is off:
//!
//! ```text
//! CSRF ──▶ bearer token ──▶ session + freshness ──▶ RBAC
//! ```
//!
//! CSRF runs first because its token is bound to the CSRF session cookie, not to a user.
//! It only applies to unsafe methods and is skipped entirely when CSRF is disabled.
//! RBAC always runs after identity is known.
//!
//! Every failure is logged with its internal reason and surfaces with a generic message
//! (401 for identity, 403 for CSRF and RBAC).
//!
//! Handlers behind [`require_auth`] extract the principal with `Extension<UserData>`.

use crate::cookies::read_cookie;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderName, Method},
    middleware::Next,
    response::Response,
};
use lib_auth::cookies::{COOKIE_CSRF, COOKIE_CSRF_SESSION, COOKIE_JWT, COOKIE_SESSION};
use lib_auth::{AuthError, CsrfGuard, SessionStore, SingleLoginRegistry, TokenKind, TokenService};
use lib_core::dto::{AccountStatus, UserData};
use lib_core::{AppError, RouteEntry};
use std::sync::Arc;
use tracing::{debug, warn};

// region: --- Guards

/// Shared guard dependencies. Cheap to clone.
#[derive(Clone)]
pub struct Guards {
    tokens: Arc<TokenService>,
    sessions: Arc<SessionStore>,
    single_login: Arc<SingleLoginRegistry>,
    csrf: Arc<CsrfGuard>,
    csrf_enabled: bool,
    csrf_header: HeaderName,
}

impl Guards {
    pub fn new(
        tokens: Arc<TokenService>,
        sessions: Arc<SessionStore>,
        single_login: Arc<SingleLoginRegistry>,
        csrf: Arc<CsrfGuard>,
        csrf_enabled: bool,
        csrf_header: &str,
    ) -> Result<Self, AppError> {
        let csrf_header = HeaderName::try_from(csrf_header.to_ascii_lowercase())
            .map_err(|e| AppError::Config(format!("CSRF_HEADER_NAME: {e}")))?;

        Ok(Self {
            tokens,
            sessions,
            single_login,
            csrf,
            csrf_enabled,
            csrf_header,
        })
    }

    pub fn csrf_header(&self) -> &HeaderName {
        &self.csrf_header
    }

    /// Run the chain implied by `entry`. Returns the principal when one was established.
    pub async fn check(
        &self,
        entry: &RouteEntry,
        method: &Method,
        headers: &HeaderMap,
    ) -> Result<Option<UserData>, AppError> {
        if entry.require_csrf {
            self.check_csrf(method, headers).await?;
        }

        let mut principal = None;

        if entry.require_auth {
            principal = Some(self.authenticate_bearer(headers).await?);
        }

        if entry.require_session {
            let from_session = self.authenticate_session(headers).await?;
            match &principal {
                Some(p) if p.id_account != from_session.id_account => {
                    return Err(reject("session", AuthError::SessionNotFound));
                }
                Some(_) => {}
                None => principal = Some(from_session),
            }
        }

        if entry.require_rbac {
            authorize(principal.as_ref())?;
        }

        Ok(principal)
    }

    /// Compare the presented anti-forgery token with the one bound to the CSRF session cookie.
    ///
    /// The token is read from the configured header, then from the `__SGCsrf` cookie.
    pub async fn check_csrf(&self, method: &Method, headers: &HeaderMap) -> Result<(), AppError> {
        if !self.csrf_enabled || is_safe_method(method) {
            return Ok(());
        }

        let session_id = read_cookie(headers, COOKIE_CSRF_SESSION);
        let presented = headers
            .get(&self.csrf_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| read_cookie(headers, COOKIE_CSRF));

        self.csrf
            .validate(session_id.as_deref(), presented.as_deref())
            .await
            .map_err(|e| reject("csrf", e))
    }

    /// Verify the access token from `Authorization` or the `__SGJwt` cookie.
    pub async fn authenticate_bearer(&self, headers: &HeaderMap) -> Result<UserData, AppError> {
        let token = bearer_token(headers).ok_or_else(|| reject("bearer", AuthError::MissingCredentials))?;

        let principal = self
            .tokens
            .verify(&token, TokenKind::Access)
            .await
            .map_err(|e| reject("bearer", e))?;

        debug!(account = %principal.id_account, "[AUTH] Bearer token accepted");
        Ok(principal)
    }

    /// Load the `__SGSession` session and check it was not superseded by a newer login.
    pub async fn authenticate_session(&self, headers: &HeaderMap) -> Result<UserData, AppError> {
        let sid = read_cookie(headers, COOKIE_SESSION)
            .ok_or_else(|| reject("session", AuthError::SessionNotFound))?;

        let record = self
            .sessions
            .get(&sid)
            .await
            .map_err(|e| reject("session", e))?
            .ok_or_else(|| reject("session", AuthError::SessionNotFound))?;

        self.single_login
            .ensure_fresh(&record)
            .await
            .map_err(|e| reject("session", e))?;

        Ok(record.to_principal())
    }
}

// endregion: --- Guards

// region: --- Helpers

/// Flat allow/deny on the principal's status class. Only active accounts pass.
pub fn authorize(principal: Option<&UserData>) -> Result<(), AppError> {
    let Some(principal) = principal else {
        warn!("[AUTH] RBAC without principal");
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    };

    match principal.status() {
        AccountStatus::Active => Ok(()),
        status => {
            warn!(account = %principal.id_account, ?status, "[AUTH] RBAC denied");
            Err(AppError::Forbidden("access denied".to_string()))
        }
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

/// `Bearer <jwt>` from the `Authorization` header, or from the `__SGJwt` cookie.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| read_cookie(headers, COOKIE_JWT))
        .and_then(|v| v.strip_prefix("Bearer ").map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
}

fn reject(stage: &'static str, err: AuthError) -> AppError {
    warn!(stage, reason = %err, "[AUTH] Guard rejected request");
    err.into()
}

// endregion: --- Helpers

// region: --- Middleware

/// Require a valid access token and inject the principal into request extensions.
pub async fn require_auth(
    State(guards): State<Guards>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = guards.authenticate_bearer(req.headers()).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Require a valid CSRF token on unsafe methods.
pub async fn require_csrf(
    State(guards): State<Guards>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    guards.check_csrf(req.method(), req.headers()).await?;
    Ok(next.run(req).await)
}

// endregion: --- Middleware
