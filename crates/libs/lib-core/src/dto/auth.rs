//! # Authentication Data Transfer Objects
//!
//! Defines the principal carried through the pipeline and the request/response structures of
//! the login endpoints.
//!
//! ## Endpoints Using These DTOs
//!
//! - `POST /api/v1/auth/login?captcha&session&single_login&block&httponly&domain`
//!   - [`LoginInput`] + [`LoginQuery`] -> [`LoginResponse`]
//! - `POST /api/v1/auth/refresh` -> [`LoginResponse`]
//! - `GET /api/v1/auth/get-session` -> [`UserData`]
//!
//! ## Wire Format
//!
//! Principal fields are **camelCase** in JSON (`idAccount`, `fullName`, ...), request bodies and
//! query flags are snake_case.

use serde::{Deserialize, Serialize};

// region: --- Account Status

/// Account status class, used for the flat allow/deny RBAC decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Deleted or blocked after too many failed logins.
    Blocked,
    Inactive,
    Active,
}

impl AccountStatus {
    pub const BLOCKED: i64 = 0;
    pub const INACTIVE: i64 = 9;
    pub const ACTIVE: i64 = 10;

    /// Map a stored status code to its class. Unknown codes are treated as blocked.
    pub fn from_code(code: i64) -> Self {
        match code {
            Self::ACTIVE => AccountStatus::Active,
            Self::INACTIVE => AccountStatus::Inactive,
            _ => AccountStatus::Blocked,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            AccountStatus::Blocked => Self::BLOCKED,
            AccountStatus::Inactive => Self::INACTIVE,
            AccountStatus::Active => Self::ACTIVE,
        }
    }
}

// endregion: --- Account Status

// region: --- Principal

/// The authenticated identity carried through the pipeline.
///
/// Built from the account row at login, and from verified token claims afterwards. Fields
/// absent from a token (e.g. contact fields in an access token) are empty/zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub id_account: String,
    #[serde(default)]
    pub identity_number: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub status_account: i64,
    /// Random value minted per login, proving which login a token/session came from.
    #[serde(default)]
    pub auth_key: String,
    #[serde(default)]
    pub login_ip: String,
    #[serde(default)]
    pub login_attempts: i64,
    #[serde(default)]
    pub login_time: i64,
    /// Refresh token id, present only on principals decoded from a refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl UserData {
    pub fn status(&self) -> AccountStatus {
        AccountStatus::from_code(self.status_account)
    }
}

// endregion: --- Principal

// region: --- Login

/// Request body for `POST /api/v1/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    /// Username, email, phone number or identity number.
    pub identity: String,
    pub password: String,
    /// Captcha answer, checked when the `captcha` flag is on.
    #[serde(default)]
    pub captcha: Option<i64>,
}

/// Query flags for `POST /api/v1/auth/login`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub captcha: bool,
    #[serde(default)]
    pub block: bool,
    #[serde(default)]
    pub session: bool,
    #[serde(default)]
    pub single_login: bool,
    #[serde(default)]
    pub httponly: bool,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Tokens plus principal returned from login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_data: UserData,
    pub token: String,
    pub refresh_token: String,
}

// endregion: --- Login
