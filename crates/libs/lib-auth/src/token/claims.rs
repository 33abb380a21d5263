//! Typed claims with total decoding.
//!
//! Token schemas evolve, so every optional claim decodes leniently: a missing, null or
//! wrong-typed value becomes the zero value instead of failing verification.

use lib_core::dto::UserData;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Token kind discriminator, carried in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_account: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub full_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub status_account: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub typ: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub iat: i64,
    pub exp: i64,

    // Refresh-only claims.
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub identity_number: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub phone_number: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub auth_key: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub login_ip: String,
    #[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "is_zero")]
    pub login_attempts: i64,
    #[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "is_zero")]
    pub login_time: i64,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    /// Identity subset only, for access tokens.
    pub fn access(user: &UserData, iat: i64, exp: i64) -> Self {
        Self {
            id_account: user.id_account.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            status_account: user.status_account,
            typ: TokenKind::Access.as_str().to_string(),
            iat,
            exp,
            ..Default::default()
        }
    }

    /// Full identity plus a fresh `jti`, for refresh tokens.
    pub fn refresh(user: &UserData, iat: i64, exp: i64, jti: String) -> Self {
        Self {
            typ: TokenKind::Refresh.as_str().to_string(),
            identity_number: user.identity_number.clone(),
            phone_number: user.phone_number.clone(),
            auth_key: user.auth_key.clone(),
            login_ip: user.login_ip.clone(),
            login_attempts: user.login_attempts,
            login_time: user.login_time,
            jti: Some(jti),
            ..Self::access(user, iat, exp)
        }
    }

    pub fn is_kind(&self, kind: TokenKind) -> bool {
        self.typ == kind.as_str()
    }

    pub fn into_principal(self) -> UserData {
        UserData {
            id_account: self.id_account,
            identity_number: self.identity_number,
            username: self.username,
            full_name: self.full_name,
            email: self.email,
            phone_number: self.phone_number,
            status_account: self.status_account,
            auth_key: self.auth_key,
            login_ip: self.login_ip,
            login_attempts: self.login_attempts,
            login_time: self.login_time,
            jti: self.jti,
        }
    }
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

// region: --- Lenient decoders

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn value_to_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let s = value_to_string(Value::deserialize(deserializer)?);
    Ok((!s.is_empty()).then_some(s))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(value_to_i64(&Value::deserialize(deserializer)?))
}

// endregion: --- Lenient decoders
