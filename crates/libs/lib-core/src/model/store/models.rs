use crate::dto::UserData;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Account row as stored in the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id_account: String,
    pub identity_number: Option<String>,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub status_account: i64,
    pub auth_key: Option<String>,
    pub password_hash: String,
    pub login_ip: Option<String>,
    pub login_attempts: i64,
    pub login_time: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Client-safe principal for this account, carrying the given per-login `auth_key`.
    pub fn to_user_data(&self, auth_key: &str) -> UserData {
        UserData {
            id_account: self.id_account.clone(),
            identity_number: self.identity_number.clone().unwrap_or_default(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone().unwrap_or_default(),
            phone_number: self.phone_number.clone().unwrap_or_default(),
            status_account: self.status_account,
            auth_key: auth_key.to_string(),
            login_ip: self.login_ip.clone().unwrap_or_default(),
            login_attempts: self.login_attempts,
            login_time: self.login_time,
            jti: None,
        }
    }
}

/// Data structure for creating a new account. Password must already be hashed.
#[derive(Debug, Clone)]
pub struct AccountForCreate {
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub identity_number: Option<String>,
    pub password_hash: String,
    pub status_account: i64,
}

impl AccountForCreate {
    /// Create an active account with only the required fields.
    pub fn new(username: String, full_name: String, password_hash: String) -> Self {
        Self {
            username,
            full_name,
            email: None,
            phone_number: None,
            identity_number: None,
            password_hash,
            status_account: crate::dto::AccountStatus::ACTIVE,
        }
    }

    pub fn email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn phone_number(mut self, phone_number: String) -> Self {
        self.phone_number = Some(phone_number);
        self
    }

    pub fn status(mut self, status_account: i64) -> Self {
        self.status_account = status_account;
        self
    }
}

/// Telemetry row in the `log_proxies` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LogProxyRow {
    pub id: i64,
    pub level: String,
    pub service: String,
    pub method: String,
    pub path: String,
    pub user_auth: String,
    pub status: i64,
    pub duration_ms: i64,
    /// JSON object with bodies, content types, request id and error detail.
    pub fields: String,
    pub timestamp: DateTime<Utc>,
}

/// Telemetry row ready for insertion (no id yet).
#[derive(Debug, Clone)]
pub struct LogProxyForCreate {
    pub level: String,
    pub service: String,
    pub method: String,
    pub path: String,
    pub user_auth: String,
    pub status: i64,
    pub duration_ms: i64,
    pub fields: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate returned by `/log-stats-proxy`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LogProxyStat {
    pub service: String,
    pub method: String,
    pub path: String,
    pub status: i64,
    pub avg_duration_ms: f64,
    pub count: i64,
}
