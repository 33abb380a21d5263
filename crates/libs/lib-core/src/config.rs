//! # Application Configuration
//!
//! Gateway configuration loaded from environment variables (after `dotenvy` has read `.env`).
//! All configuration is validated on startup to fail fast if misconfigured.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lib_core::config::Config;
//!
//! let config = Config::from_env().and_then(|c| c.validate().map(|_| c))?;
//! println!("listening on {}", config.bind_address);
//! # Ok::<(), String>(())
//! ```
//!
//! The config is handed to the server state explicitly; nothing reads it from a global.

use lib_utils::envs::{get_env, get_env_bool_or, get_env_or, get_env_parse_or};

/// Gateway configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Socket address the HTTP server binds to.
    pub bind_address: String,

    /// SQLite database connection URL
    pub database_url: String,

    /// Secret key for JWT token signing and verification
    ///
    /// **Must be at least 32 characters long** for security.
    pub jwt_secret: String,

    /// Access token lifetime in seconds.
    pub access_token_ttl_secs: i64,

    /// Refresh token lifetime in seconds.
    pub refresh_token_ttl_secs: i64,

    /// Global CSRF switch. When off, `csrf_protection` flags are ignored.
    pub csrf_enabled: bool,

    /// Request header that carries the anti-forgery token.
    pub csrf_header_name: String,

    pub csrf_ttl_secs: u64,
    pub session_ttl_secs: u64,

    /// `Secure` attribute for non-refresh cookies (dev vs. prod).
    pub secure_cookies: bool,

    /// `SameSite` attribute for non-refresh cookies (`Strict`, `Lax` or `None`).
    pub cookie_same_site: String,

    /// Redis URL. `None` selects the in-process key-value store.
    pub redis_url: Option<String>,

    /// Path of the route document watched for changes.
    pub route_config_path: String,

    /// Deadline for every upstream call.
    pub upstream_timeout_secs: u64,

    /// Bounded telemetry queue size.
    pub telemetry_queue_capacity: usize,

    /// Max characters of a textual body kept in a telemetry record.
    pub telemetry_body_limit: usize,

    /// Basic-auth credentials for the admin API. Admin API is disabled when unset.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    /// CORS origins. Empty means permissive.
    pub allowed_origins: Vec<String>,

    /// Base URL of the email service the `send_mail` relay posts to.
    pub email_service_url: Option<String>,

    /// Upstream health probe period. `0` disables the probe.
    pub health_probe_interval_secs: u64,

    pub circuit_failure_threshold: u32,
    pub circuit_success_threshold: u32,
    pub circuit_open_secs: u64,

    /// Wrong-password attempts before an account is blocked (when `block=true`).
    pub max_login_attempts: i64,

    /// Requests allowed per client IP in one window. `0` disables rate limiting.
    pub rate_limit_max: u64,
    pub rate_limit_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8060".to_string(),
            database_url: "sqlite:data/gateway.db".to_string(),
            jwt_secret: String::new(),
            access_token_ttl_secs: 86_400,
            refresh_token_ttl_secs: 604_800,
            csrf_enabled: true,
            csrf_header_name: "X-SGCsrf-Token".to_string(),
            csrf_ttl_secs: 3_600,
            session_ttl_secs: 86_400,
            secure_cookies: false,
            cookie_same_site: "Lax".to_string(),
            redis_url: None,
            route_config_path: "./config/config.json".to_string(),
            upstream_timeout_secs: 30,
            telemetry_queue_capacity: 1_000,
            telemetry_body_limit: 1_024,
            admin_username: None,
            admin_password: None,
            allowed_origins: Vec::new(),
            email_service_url: None,
            health_probe_interval_secs: 0,
            circuit_failure_threshold: 3,
            circuit_success_threshold: 2,
            circuit_open_secs: 5,
            max_login_attempts: 3,
            rate_limit_max: 1_000,
            rate_limit_window_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, String> {
        let d = Config::default();

        let jwt_secret =
            get_env("JWT_SECRET").map_err(|_| "JWT_SECRET must be set in environment")?;

        let optional = |name: &'static str| {
            let val = get_env_or(name, "");
            (!val.is_empty()).then_some(val)
        };

        let allowed_origins = get_env_or("ALLOWED_ORIGINS", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_address: get_env_or("BIND_ADDRESS", &d.bind_address),
            database_url: get_env_or("DATABASE_URL", &d.database_url),
            jwt_secret,
            access_token_ttl_secs: get_env_parse_or("ACCESS_TOKEN_TTL_SECS", d.access_token_ttl_secs)
                .map_err(|e| e.to_string())?,
            refresh_token_ttl_secs: get_env_parse_or(
                "REFRESH_TOKEN_TTL_SECS",
                d.refresh_token_ttl_secs,
            )
            .map_err(|e| e.to_string())?,
            csrf_enabled: get_env_bool_or("CSRF_ENABLED", d.csrf_enabled)
                .map_err(|e| e.to_string())?,
            csrf_header_name: get_env_or("CSRF_HEADER_NAME", &d.csrf_header_name),
            csrf_ttl_secs: get_env_parse_or("CSRF_TTL_SECS", d.csrf_ttl_secs)
                .map_err(|e| e.to_string())?,
            session_ttl_secs: get_env_parse_or("SESSION_TTL_SECS", d.session_ttl_secs)
                .map_err(|e| e.to_string())?,
            secure_cookies: get_env_bool_or("SECURE_COOKIES", d.secure_cookies)
                .map_err(|e| e.to_string())?,
            cookie_same_site: get_env_or("COOKIE_SAME_SITE", &d.cookie_same_site),
            redis_url: optional("REDIS_URL"),
            route_config_path: get_env_or("ROUTE_CONFIG_PATH", &d.route_config_path),
            upstream_timeout_secs: get_env_parse_or("UPSTREAM_TIMEOUT_SECS", d.upstream_timeout_secs)
                .map_err(|e| e.to_string())?,
            telemetry_queue_capacity: get_env_parse_or(
                "TELEMETRY_QUEUE_CAPACITY",
                d.telemetry_queue_capacity,
            )
            .map_err(|e| e.to_string())?,
            telemetry_body_limit: get_env_parse_or("TELEMETRY_BODY_LIMIT", d.telemetry_body_limit)
                .map_err(|e| e.to_string())?,
            admin_username: optional("ADMIN_USERNAME"),
            admin_password: optional("ADMIN_PASSWORD"),
            allowed_origins,
            email_service_url: optional("EMAIL_SERVICE_URL"),
            health_probe_interval_secs: get_env_parse_or(
                "HEALTH_PROBE_INTERVAL_SECS",
                d.health_probe_interval_secs,
            )
            .map_err(|e| e.to_string())?,
            circuit_failure_threshold: get_env_parse_or(
                "CIRCUIT_FAILURE_THRESHOLD",
                d.circuit_failure_threshold,
            )
            .map_err(|e| e.to_string())?,
            circuit_success_threshold: get_env_parse_or(
                "CIRCUIT_SUCCESS_THRESHOLD",
                d.circuit_success_threshold,
            )
            .map_err(|e| e.to_string())?,
            circuit_open_secs: get_env_parse_or("CIRCUIT_OPEN_SECS", d.circuit_open_secs)
                .map_err(|e| e.to_string())?,
            max_login_attempts: get_env_parse_or("MAX_LOGIN_ATTEMPTS", d.max_login_attempts)
                .map_err(|e| e.to_string())?,
            rate_limit_max: get_env_parse_or("RATE_LIMIT_MAX", d.rate_limit_max)
                .map_err(|e| e.to_string())?,
            rate_limit_window_secs: get_env_parse_or(
                "RATE_LIMIT_WINDOW_SECS",
                d.rate_limit_window_secs,
            )
            .map_err(|e| e.to_string())?,
        })
    }

    /// Validate configuration values against security and operational rules.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters long".to_string());
        }

        if self.access_token_ttl_secs < 60 {
            return Err("ACCESS_TOKEN_TTL_SECS must be at least 60".to_string());
        }

        if self.refresh_token_ttl_secs <= self.access_token_ttl_secs {
            return Err(
                "REFRESH_TOKEN_TTL_SECS must be greater than ACCESS_TOKEN_TTL_SECS".to_string(),
            );
        }

        if self.upstream_timeout_secs == 0 {
            return Err("UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string());
        }

        if self.telemetry_queue_capacity == 0 {
            return Err("TELEMETRY_QUEUE_CAPACITY must be greater than 0".to_string());
        }

        if self.csrf_header_name.trim().is_empty() {
            return Err("CSRF_HEADER_NAME cannot be empty".to_string());
        }

        if !matches!(self.cookie_same_site.as_str(), "Strict" | "Lax" | "None") {
            return Err("COOKIE_SAME_SITE must be one of Strict, Lax, None".to_string());
        }

        if self.rate_limit_max > 0 && self.rate_limit_window_secs == 0 {
            return Err("RATE_LIMIT_WINDOW_SECS must be greater than 0".to_string());
        }

        if self.admin_username.is_some() != self.admin_password.is_some() {
            return Err("ADMIN_USERNAME and ADMIN_PASSWORD must be set together".to_string());
        }

        Ok(())
    }

    /// Whether the admin API (`/config-file`, `/publish`) is enabled.
    pub fn admin_enabled(&self) -> bool {
        self.admin_username.is_some() && self.admin_password.is_some()
    }
}
