//! # Admin Handlers
//!
//! Mounted behind [`crate::middleware::require_admin`] (HTTP Basic).
//!
//! - `GET /config-file`: the active route table.
//! - `POST /config-file`: validate a route document, write it atomically and reload.
//!   An invalid document is answered with 400 and never reaches disk.
//! - `POST /publish`: publish a [`SendingEmail`] on the notification bus.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use lib_core::bus::NotificationBus;
use lib_core::dto::{ApiResponse, SendingEmail, TOPIC_SEND_MAIL};
use lib_core::routes::save_document;
use lib_core::{AppError, Config, RouteEntry, RouteTableHandle};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct RouteConfig {
    pub version: u64,
    pub services: Vec<RouteEntry>,
}

pub async fn get_config_file(
    State(routes): State<Arc<RouteTableHandle>>,
) -> Json<ApiResponse<RouteConfig>> {
    let table = routes.current();
    let config = RouteConfig {
        version: table.version(),
        services: table.entries().to_vec(),
    };
    Json(ApiResponse::ok("Success get config", config).with_total(table.len() as i64))
}

pub async fn update_config_file(
    State(config): State<Config>,
    State(routes): State<Arc<RouteTableHandle>>,
    body: String,
) -> Result<Json<ApiResponse<RouteConfig>>, AppError> {
    let entries = save_document(&config.route_config_path, &body)
        .await
        .map_err(|e| {
            warn!(error = %e, "[ADMIN] Route document rejected");
            AppError::InvalidInput(e.to_string())
        })?;

    // The watcher sees the same write; an identical reload keeps the version.
    let version = routes.reload_from_file(&config.route_config_path)?;
    info!(version, routes = entries.len(), "[ADMIN] Route document updated");

    let total = entries.len() as i64;
    let body = RouteConfig {
        version,
        services: entries,
    };
    Ok(Json(ApiResponse::ok("Success update config", body).with_total(total)))
}

pub async fn publish(
    State(bus): State<Arc<NotificationBus>>,
    Json(input): Json<SendingEmail>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), AppError> {
    input.validate().map_err(AppError::InvalidInput)?;

    if !bus.publish(TOPIC_SEND_MAIL, &input).await {
        return Err(AppError::Internal("publish failed".to_string()));
    }
    Ok((StatusCode::OK, Json(ApiResponse::message("on publish"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{create_router, test_state};
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::Router;
    use lib_core::bus::BusHandler;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    // "admin:s3cret"
    const BASIC: &str = "Basic YWRtaW46czNjcmV0";

    fn admin_config(route_path: &str) -> Config {
        Config {
            jwt_secret: "admin-test-secret-admin-test-secret-0123".to_string(),
            admin_username: Some("admin".to_string()),
            admin_password: Some("s3cret".to_string()),
            route_config_path: route_path.to_string(),
            csrf_enabled: false,
            ..Config::default()
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_config(auth: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/config-file")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_admin_api_hidden_when_unconfigured() {
        let config = Config {
            jwt_secret: "admin-test-secret-admin-test-secret-0123".to_string(),
            ..Config::default()
        };
        let app = create_router(test_state(config).await);
        let req = Request::builder()
            .uri("/config-file")
            .header(header::AUTHORIZATION, BASIC)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_requires_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let app = create_router(test_state(admin_config(path.to_str().unwrap())).await);

        let doc = json!([{"path": "/svc", "url": "http://127.0.0.1:9001"}]).to_string();
        let (status, _) = send(&app, post_config(None, doc.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, post_config(Some("Basic YWRtaW46d3Jvbmc="), doc)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_valid_document_is_written_and_served() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let state = test_state(admin_config(path.to_str().unwrap())).await;
        let app = create_router(state.clone());

        let doc = json!({"services": [
            {"path": "/svc", "url": "http://127.0.0.1:9001", "auth_protection": true}
        ]})
        .to_string();
        let (status, body) = send(&app, post_config(Some(BASIC), doc)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        assert!(path.exists());
        let entry = state.routes.match_path("/svc/items").unwrap();
        assert!(entry.require_auth);

        let req = Request::builder()
            .uri("/config-file")
            .header(header::AUTHORIZATION, BASIC)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["services"][0]["path"], "/svc");
    }

    #[tokio::test]
    async fn test_invalid_document_keeps_live_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let state = test_state(admin_config(path.to_str().unwrap())).await;
        let app = create_router(state.clone());
        let before = state.routes.version();

        let dup = json!([
            {"path": "/svc", "url": "http://127.0.0.1:9001"},
            {"path": "/svc/", "url": "http://127.0.0.1:9002"}
        ])
        .to_string();
        let (status, body) = send(&app, post_config(Some(BASIC), dup)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("duplicate"));

        let (status, _) = send(&app, post_config(Some(BASIC), "not json".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(!path.exists());
        assert_eq!(state.routes.version(), before);
    }

    struct Forward(tokio::sync::mpsc::Sender<SendingEmail>);

    #[async_trait::async_trait]
    impl BusHandler<SendingEmail> for Forward {
        async fn handle(&self, message: SendingEmail) -> Result<(), String> {
            self.0.send(message).await.map_err(|e| e.to_string())
        }
    }

    #[tokio::test]
    async fn test_publish_delivers_to_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let state = test_state(admin_config(path.to_str().unwrap())).await;
        let app = create_router(state.clone());

        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        state
            .bus
            .subscribe(TOPIC_SEND_MAIL, Arc::new(Forward(tx)))
            .await
            .unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/publish")
            .header(header::AUTHORIZATION, BASIC)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"sender": "noreply@example.com", "subject": "Hi", "emails": []}).to_string(),
            ))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "emails cannot be empty");

        let req = Request::builder()
            .method("POST")
            .uri("/publish")
            .header(header::AUTHORIZATION, BASIC)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "sender": "noreply@example.com",
                    "subject": "Hi",
                    "emails": [{"name": "Alice", "email_addr": "alice@example.com"}]
                })
                .to_string(),
            ))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "on publish");

        let delivered = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.emails[0].email_addr, "alice@example.com");
    }
}
