use super::*;
use crate::server::{create_router, test_state, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use lib_auth::{hash_password, TokenKind};
use lib_core::model::store::models::AccountForCreate;
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "TestPassword123!";

struct TestApp {
    app: Router,
    state: AppState,
    account_id: String,
}

async fn setup(config: Config) -> TestApp {
    let state = test_state(config).await;
    let hash = hash_password(PASSWORD).expect("hash");
    let account = UserRepository::create(
        &state.db,
        AccountForCreate::new("alice".to_string(), "Alice Doe".to_string(), hash)
            .email("alice@example.com".to_string()),
    )
    .await
    .expect("seed account");

    TestApp {
        app: create_router(state.clone()),
        state,
        account_id: account.id_account,
    }
}

async fn default_app() -> TestApp {
    setup(test_config()).await
}

fn test_config() -> Config {
    Config {
        jwt_secret: "test-secret-key-must-be-at-least-32-characters-long!".to_string(),
        csrf_enabled: false,
        ..Config::default()
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn login_req(query: &str, identity: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/auth/login{query}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"identity": identity, "password": password}).to_string(),
        ))
        .unwrap()
}

/// `name=value` of every `Set-Cookie` header.
fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    set_cookies(headers).into_iter().find_map(|c| {
        let pair = c.split(';').next()?;
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

// region: --- Login

#[tokio::test]
async fn test_login_success_returns_tokens() {
    let t = default_app().await;

    let (status, _, body) = call(&t.app, login_req("", "alice", PASSWORD)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Success Login");
    assert_eq!(body["data"]["userData"]["username"], "alice");
    assert_eq!(body["data"]["userData"]["authKey"].as_str().unwrap().len(), 32);

    let token = body["data"]["token"].as_str().unwrap();
    let principal = t.state.tokens.verify(token, TokenKind::Access).await.unwrap();
    assert_eq!(principal.id_account, t.account_id);

    let refresh = body["data"]["refreshToken"].as_str().unwrap();
    assert!(t.state.tokens.verify(refresh, TokenKind::Refresh).await.is_ok());
}

#[tokio::test]
async fn test_login_by_email_is_case_insensitive() {
    let t = default_app().await;
    let (status, _, _) = call(&t.app, login_req("", "Alice@Example.com", PASSWORD)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_identity_is_401() {
    let t = default_app().await;
    let (status, _, body) = call(&t.app, login_req("", "mallory", PASSWORD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "wrong identity or password");
}

#[tokio::test]
async fn test_known_and_unknown_identities_answer_alike() {
    let t = default_app().await;

    let (known_status, _, known) = call(&t.app, login_req("", "alice", "nope-nope")).await;
    let (unknown_status, _, unknown) = call(&t.app, login_req("", "mallory", "nope-nope")).await;

    assert_eq!(known_status, unknown_status);
    assert_eq!(known, unknown);
}

#[tokio::test]
async fn test_wrong_password_counts_attempts() {
    let t = default_app().await;

    let (status, _, body) = call(&t.app, login_req("", "alice", "nope-nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "wrong identity or password");

    let account = UserRepository::find_by_id(&t.state.db, &t.account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.login_attempts, 1);

    let (status, _, _) = call(&t.app, login_req("", "alice", PASSWORD)).await;
    assert_eq!(status, StatusCode::OK);
    let account = UserRepository::find_by_id(&t.state.db, &t.account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.login_attempts, 0);
}

#[tokio::test]
async fn test_block_after_max_attempts() {
    let t = default_app().await;

    let (_, _, body) = call(&t.app, login_req("?block=true", "alice", "bad-1-bad")).await;
    assert_eq!(body["message"], "wrong password, you have 2 chances left");
    let (_, _, body) = call(&t.app, login_req("?block=true", "alice", "bad-2-bad")).await;
    assert_eq!(body["message"], "wrong password, you have 1 chances left");
    let (status, _, body) = call(&t.app, login_req("?block=true", "alice", "bad-3-bad")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "your account has been blocked after 3 wrong passwords");

    let (status, _, body) = call(&t.app, login_req("", "alice", PASSWORD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "your account is not active or blocked");
}

#[tokio::test]
async fn test_httponly_requires_domain() {
    let t = default_app().await;
    let (status, _, body) = call(&t.app, login_req("?httponly=true", "alice", PASSWORD)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "need domain params");

    let account = UserRepository::find_by_id(&t.state.db, &t.account_id)
        .await
        .unwrap()
        .unwrap();
    assert!(account.auth_key.is_none());
}

#[tokio::test]
async fn test_httponly_sets_token_cookies() {
    let t = default_app().await;
    let (status, headers, body) = call(
        &t.app,
        login_req("?httponly=true&domain=example.com", "alice", PASSWORD),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Success Login for domain:example.com");
    assert!(body["data"].get("token").is_none());

    let cookies = set_cookies(&headers);
    let refresh = cookies.iter().find(|c| c.starts_with("__SGRefreshJwt=")).unwrap();
    assert!(refresh.contains("HttpOnly"));
    assert!(refresh.contains("Secure"));
    assert!(refresh.contains("SameSite=Strict"));

    let jwt = cookies.iter().find(|c| c.starts_with("__SGJwt=Bearer ")).unwrap();
    assert!(jwt.contains("Domain=example.com"));
}

#[tokio::test]
async fn test_login_behind_csrf_guard() {
    let config = Config {
        csrf_enabled: true,
        ..test_config()
    };
    let t = setup(config).await;

    let (status, _, _) = call(&t.app, login_req("", "alice", PASSWORD)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let csrf = t.state.csrf.issue(None).await.unwrap();
    let mut req = login_req("", "alice", PASSWORD);
    req.headers_mut().insert(
        header::COOKIE,
        format!("__SGCsrfSession={}", csrf.session_id).parse().unwrap(),
    );
    req.headers_mut()
        .insert("x-sgcsrf-token", csrf.token.parse().unwrap());
    let (status, _, _) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_captcha_flag_requires_answer() {
    let t = default_app().await;
    let challenge = t.state.captcha.generate(None).await.unwrap();

    let mut req = login_req("?captcha=true", "alice", PASSWORD);
    req.headers_mut().insert(
        header::COOKIE,
        format!("__SGCaptcha={}", challenge.session_id).parse().unwrap(),
    );
    let (status, _, body) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid captcha");
}

fn solve(expression: &str) -> i64 {
    let parts: Vec<&str> = expression.split(' ').collect();
    let (a, b): (i64, i64) = (parts[0].parse().unwrap(), parts[2].parse().unwrap());
    match parts[1] {
        "+" => a + b,
        "-" => a - b,
        _ => a * b,
    }
}

#[tokio::test]
async fn test_captcha_round_trip() {
    let t = default_app().await;

    let req = Request::builder().uri("/get-captcha").body(Body::empty()).unwrap();
    let (status, headers, body) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    let sid = cookie_value(&headers, "__SGCaptcha").unwrap();
    let answer = solve(body["data"]["captcha"].as_str().unwrap());

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login?captcha=true")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("__SGCaptcha={sid}"))
        .body(Body::from(
            json!({"identity": "alice", "password": PASSWORD, "captcha": answer}).to_string(),
        ))
        .unwrap();
    let (status, _, _) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
}

// endregion: --- Login

// region: --- Sessions

#[tokio::test]
async fn test_single_login_supersedes_earlier_session() {
    let t = default_app().await;
    let query = "?session=true&single_login=true";

    let (_, headers_a, _) = call(&t.app, login_req(query, "alice", PASSWORD)).await;
    let sid_a = cookie_value(&headers_a, "__SGSession").unwrap();
    let (_, headers_b, _) = call(&t.app, login_req(query, "alice", PASSWORD)).await;
    let sid_b = cookie_value(&headers_b, "__SGSession").unwrap();
    assert_ne!(sid_a, sid_b);

    let with_session = |sid: &str| {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, format!("__SGSession={sid}").parse().unwrap());
        h
    };

    let err = t
        .state
        .guards
        .authenticate_session(&with_session(&sid_a))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "you are logged in on another device");

    let principal = t
        .state
        .guards
        .authenticate_session(&with_session(&sid_b))
        .await
        .unwrap();
    assert_eq!(principal.id_account, t.account_id);

    let req = Request::builder()
        .uri("/api/v1/auth/session")
        .header(header::COOKIE, format!("__SGSession={sid_b}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["idAccount"], t.account_id.as_str());
}

#[tokio::test]
async fn test_session_without_cookie() {
    let t = default_app().await;
    let req = Request::builder()
        .uri("/api/v1/auth/session")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "no session");
}

#[tokio::test]
async fn test_get_session_requires_bearer() {
    let t = default_app().await;
    let (_, _, login) = call(&t.app, login_req("", "alice", PASSWORD)).await;
    let token = login["data"]["token"].as_str().unwrap();

    let anonymous = Request::builder()
        .uri("/api/v1/auth/get-session")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = call(&t.app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authed = Request::builder()
        .uri("/api/v1/auth/get-session")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = call(&t.app, authed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["idAccount"], t.account_id.as_str());
}

// endregion: --- Sessions

// region: --- Refresh and Logout

fn refresh_req(token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/auth/refresh")
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_refresh_rotates_and_old_token_dies() {
    let t = default_app().await;
    let (_, _, login) = call(&t.app, login_req("", "alice", PASSWORD)).await;
    let first = login["data"]["refreshToken"].as_str().unwrap().to_string();

    // Accepted with or without the Bearer prefix.
    let (status, _, body) = call(&t.app, refresh_req(&first)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Refresh token rotated");
    let second = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    let (status, _, _) = call(&t.app, refresh_req(&first)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = call(&t.app, refresh_req(&format!("Bearer {second}"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_token_is_401() {
    let t = default_app().await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/refresh")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_and_expires_cookies() {
    let t = default_app().await;
    let (_, _, login) = call(&t.app, login_req("", "alice", PASSWORD)).await;
    let access = login["data"]["token"].as_str().unwrap();
    let refresh = login["data"]["refreshToken"].as_str().unwrap();

    let req = Request::builder()
        .uri("/api/v1/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .header("x-refresh-token", refresh)
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Success Logout");
    for name in ["__SGJwt", "__SGRefreshJwt", "__SGSession"] {
        let cookie = set_cookies(&headers)
            .into_iter()
            .find(|c| c.starts_with(&format!("{name}=")))
            .unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    let (status, _, _) = call(&t.app, refresh_req(refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// endregion: --- Refresh and Logout
