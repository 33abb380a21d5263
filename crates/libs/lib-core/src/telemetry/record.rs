use crate::model::store::models::LogProxyForCreate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }

    /// `error` for 5xx, `warn` for 4xx, `info` otherwise.
    pub fn for_status(status: u16) -> Self {
        match status {
            500..=u16::MAX => Level::Error,
            400..=499 => Level::Warn,
            _ => Level::Info,
        }
    }
}

/// One completed or rejected proxied call.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub level: Level,
    /// Upstream base URL, or empty when the request never matched a route.
    pub service: String,
    pub method: String,
    pub path: String,
    /// Account id of the authenticated principal, if any.
    pub principal: Option<String>,
    pub status: u16,
    pub duration: Duration,
    pub request_body: String,
    pub response_body: String,
    pub content_type: Option<String>,
    pub request_id: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            level: Level::Info,
            service: String::new(),
            method: method.to_string(),
            path: path.to_string(),
            principal: None,
            status: 0,
            duration: Duration::ZERO,
            request_body: String::new(),
            response_body: String::new(),
            content_type: None,
            request_id: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the status and derive the level from it.
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self.level = Level::for_status(status);
        self
    }

    /// Persistence shape: flat columns plus a JSON `fields` object.
    pub fn into_row(self) -> LogProxyForCreate {
        let fields = json!({
            "request_body": self.request_body,
            "response_body": self.response_body,
            "content_type": self.content_type,
            "request_id": self.request_id,
            "error": self.error,
        });

        LogProxyForCreate {
            level: self.level.as_str().to_string(),
            service: self.service,
            method: self.method,
            path: self.path,
            user_auth: self.principal.unwrap_or_default(),
            status: i64::from(self.status),
            duration_ms: i64::try_from(self.duration.as_millis()).unwrap_or(i64::MAX),
            fields: fields.to_string(),
            timestamp: self.timestamp,
        }
    }
}

/// Keep at most `limit` characters of a textual body.
pub fn truncate_body(body: &str, limit: usize) -> String {
    match body.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...[truncated {} bytes]", &body[..cut], body.len() - cut),
        None => body.to_string(),
    }
}

/// Size-only stand-in for bodies that are not copied into telemetry.
pub fn binary_marker(len: Option<u64>) -> String {
    match len {
        Some(n) => format!("[binary body: {n} bytes]"),
        None => "[binary body: unknown size]".to_string(),
    }
}
