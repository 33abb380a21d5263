//! # Server Setup
//!
//! Application state, router assembly and the process lifecycle.
//!
//! ## Startup order
//!
//! ```text
//! tracing ──▶ Config ──▶ SQLite + migrations ──▶ KV store ──▶ route table (fatal if invalid)
//!    ──▶ watcher / health probe ──▶ telemetry worker ──▶ bus + email relay ──▶ serve
//! ```
//!
//! On Ctrl+C the listener stops accepting, in-flight requests finish, the telemetry worker
//! drains its queue and the file watcher is stopped.

use crate::handlers::{admin, auth, captcha, csrf, ops};
use crate::middleware::{
    log_requests, rate_limit, require_admin, require_auth, require_csrf, stamp_req, Guards,
    RateLimiter,
};
use crate::proxy::{self, Dispatcher, UpstreamClient};
use axum::{
    extract::FromRef,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use lib_auth::{CaptchaService, CsrfGuard, SessionStore, SingleLoginRegistry, TokenService};
use lib_core::bus::{EmailRelay, NotificationBus};
use lib_core::dto::{SendingEmail, TOPIC_SEND_MAIL};
use lib_core::model::kv;
use lib_core::routes::{HealthProbe, RouteWatcher};
use lib_core::telemetry::{SqliteTelemetryStore, TelemetryWorker};
use lib_core::{AppError, Config, DbPool, RouteTableHandle, SharedKv, TelemetrySink};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};

const CAPTCHA_TTL_SECS: u64 = 300;

// region: --- AppState

/// Shared state handed to every handler. Each handler extracts only the pieces it needs
/// through the [`FromRef`] impls below.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub kv: SharedKv,
    pub routes: Arc<RouteTableHandle>,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionStore>,
    pub single_login: Arc<SingleLoginRegistry>,
    pub csrf: Arc<CsrfGuard>,
    pub captcha: Arc<CaptchaService>,
    pub telemetry: TelemetrySink,
    pub bus: Arc<NotificationBus>,
    pub guards: Guards,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        kv: SharedKv,
        routes: Arc<RouteTableHandle>,
        telemetry: TelemetrySink,
        bus: Arc<NotificationBus>,
    ) -> Result<Self, AppError> {
        let tokens = Arc::new(TokenService::from_config(&config, kv.clone()));
        let sessions = Arc::new(SessionStore::new(kv.clone(), config.session_ttl_secs));
        let single_login = Arc::new(SingleLoginRegistry::new(
            kv.clone(),
            config.refresh_token_ttl_secs.max(0) as u64,
        ));
        let csrf = Arc::new(CsrfGuard::new(kv.clone(), config.csrf_ttl_secs));
        let captcha = Arc::new(CaptchaService::new(kv.clone(), CAPTCHA_TTL_SECS));

        let guards = Guards::new(
            tokens.clone(),
            sessions.clone(),
            single_login.clone(),
            csrf.clone(),
            config.csrf_enabled,
            &config.csrf_header_name,
        )?;

        let upstream = UpstreamClient::new(&config)?;
        let dispatcher = Arc::new(Dispatcher::new(
            routes.clone(),
            guards.clone(),
            upstream,
            telemetry.clone(),
        ));

        Ok(Self {
            db,
            config,
            kv,
            routes,
            tokens,
            sessions,
            single_login,
            csrf,
            captcha,
            telemetry,
            bus,
            guards,
            dispatcher,
        })
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<RouteTableHandle> {
    fn from_ref(state: &AppState) -> Self {
        state.routes.clone()
    }
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl FromRef<AppState> for Arc<SessionStore> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Arc<SingleLoginRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.single_login.clone()
    }
}

impl FromRef<AppState> for Arc<CsrfGuard> {
    fn from_ref(state: &AppState) -> Self {
        state.csrf.clone()
    }
}

impl FromRef<AppState> for Arc<CaptchaService> {
    fn from_ref(state: &AppState) -> Self {
        state.captcha.clone()
    }
}

impl FromRef<AppState> for TelemetrySink {
    fn from_ref(state: &AppState) -> Self {
        state.telemetry.clone()
    }
}

impl FromRef<AppState> for Arc<NotificationBus> {
    fn from_ref(state: &AppState) -> Self {
        state.bus.clone()
    }
}

impl FromRef<AppState> for Guards {
    fn from_ref(state: &AppState) -> Self {
        state.guards.clone()
    }
}

impl FromRef<AppState> for Arc<Dispatcher> {
    fn from_ref(state: &AppState) -> Self {
        state.dispatcher.clone()
    }
}

/// In-memory database and KV store, empty route table, local bus and a live telemetry worker.
#[cfg(test)]
pub(crate) async fn test_state(config: Config) -> AppState {
    use lib_core::model::store::create_memory_pool;
    use lib_core::{MemoryStore, RouteTable};

    let db = create_memory_pool().await.unwrap();
    let kv: SharedKv = Arc::new(MemoryStore::new());
    let routes = Arc::new(RouteTableHandle::new(RouteTable::empty()));

    let (telemetry, receiver) = TelemetrySink::channel(config.telemetry_queue_capacity);
    let store = Arc::new(SqliteTelemetryStore::new(db.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        TelemetryWorker::new(receiver, store).run(shutdown_rx).await;
        drop(shutdown_tx);
    });

    AppState::new(config, db, kv, routes, telemetry, Arc::new(NotificationBus::local())).unwrap()
}

// endregion: --- AppState

// region: --- Server

/// Server-level settings not carried by [`Config`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub migrations_path: &'static str,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            migrations_path: "./migrations",
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    // LOG_LEVEL accepts a bare level ("debug") or full filter directives ("info,lib_web=debug").
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_new(&log_level).unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default().add_directive(Level::INFO.into())
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_file(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))
}

/// Start the gateway and block until Ctrl+C.
pub async fn start_server(server_config: ServerConfig) -> anyhow::Result<()> {
    init_tracing()?;

    info!("[SERVER] Starting gateway");

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Config error: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Config validation error: {e}"))?;

    // region:    --- Stores

    if let Some(db_path) = config.database_url.strip_prefix("sqlite:") {
        let db_path = db_path.trim_start_matches("//");
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    info!(url = %config.database_url, "[SERVER] Connecting to database");
    let db = lib_core::create_pool(&config.database_url).await?;
    lib_core::run_migrations(&db, server_config.migrations_path).await?;
    info!("[SERVER] Migrations applied");

    let kv = kv::connect(config.redis_url.as_deref()).await?;

    // endregion: --- Stores

    // region:    --- Routes

    let routes = Arc::new(
        RouteTableHandle::load_file(&config.route_config_path)
            .map_err(|e| anyhow::anyhow!("Route config {}: {e}", config.route_config_path))?,
    );
    info!(
        path = %config.route_config_path,
        services = routes.current().len(),
        "[SERVER] Route table loaded"
    );

    let watcher = match RouteWatcher::spawn(routes.clone(), &config.route_config_path) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!(error = %e, "[SERVER] Route file watcher unavailable, reload via /config-file only");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let probe = (config.health_probe_interval_secs > 0).then(|| {
        HealthProbe::new(routes.clone(), reqwest::Client::new()).spawn(
            Duration::from_secs(config.health_probe_interval_secs),
            shutdown_rx.clone(),
        )
    });

    // endregion: --- Routes

    // region:    --- Telemetry and Bus

    let (telemetry, receiver) = TelemetrySink::channel(config.telemetry_queue_capacity);
    let worker = tokio::spawn(
        TelemetryWorker::new(receiver, Arc::new(SqliteTelemetryStore::new(db.clone())))
            .run(shutdown_rx.clone()),
    );

    let bus = Arc::new(NotificationBus::connect(config.redis_url.as_deref()).await?);
    let relay = Arc::new(EmailRelay::new(
        reqwest::Client::new(),
        config.email_service_url.clone(),
    ));
    if let Err(e) = bus.subscribe::<SendingEmail>(TOPIC_SEND_MAIL, relay).await {
        warn!(error = %e, "[SERVER] Email relay not subscribed");
    }

    // endregion: --- Telemetry and Bus

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, db, kv, routes, telemetry, bus)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("[SERVER] Listening on http://{}", bind_address);
    log_server_info();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("[SERVER] Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        error!(error = %e, "[SERVER] Telemetry worker panicked");
    }
    if let Some(probe) = probe {
        let _ = probe.await;
    }
    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    info!("[SERVER] Stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "[SERVER] Failed to listen for Ctrl+C");
    }
}

// endregion: --- Server

// region: --- Router

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        warn!("[SERVER] ALLOWED_ORIGINS not set, CORS allows any origin");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "[SERVER] Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let mut headers = vec![
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static("x-request-id"),
        HeaderName::from_static("x-refresh-token"),
    ];
    if let Ok(csrf) = HeaderName::try_from(config.csrf_header_name.to_ascii_lowercase()) {
        headers.push(csrf);
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(headers.clone())
        .expose_headers(headers)
        .allow_credentials(true)
}

/// Gateway endpoints, admin API, and the proxy fallback for everything else.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let limiter = Arc::new(RateLimiter::new(
        state.kv.clone(),
        state.config.rate_limit_max,
        state.config.rate_limit_window_secs,
    ));

    let authed = Router::new()
        .route("/api/v1/auth/logout", get(auth::logout))
        .route("/api/v1/auth/get-session", get(auth::get_session))
        .route_layer(from_fn_with_state(state.guards.clone(), require_auth));

    let admin_api = Router::new()
        .route(
            "/config-file",
            get(admin::get_config_file).post(admin::update_config_file),
        )
        .route("/publish", post(admin::publish))
        .route_layer(from_fn_with_state(state.config.clone(), require_admin));

    Router::new()
        // Auth
        .route(
            "/api/v1/auth/login",
            post(auth::login).layer(from_fn_with_state(state.guards.clone(), require_csrf)),
        )
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/session", get(auth::session))
        .merge(authed)
        // CSRF and captcha
        .route("/secure-gateway-c", get(csrf::issue_token))
        .route("/api/secure-gateway-c", get(csrf::issue_token))
        .route("/secure-gateway-c-cookie", get(csrf::issue_cookie_token))
        .route("/get-captcha", get(captcha::get_captcha))
        // Operations
        .route("/live", get(ops::live))
        .route("/metrics", get(ops::metrics))
        .route("/health/circuit", get(ops::circuit_health))
        .route("/metrics/circuit", get(ops::circuit_metrics))
        .route("/info", get(ops::info))
        .route("/log-stats-proxy", get(ops::log_stats))
        .merge(admin_api)
        // Everything else is proxied
        .fallback(proxy::dispatch)
        .with_state(state)
        .layer(from_fn_with_state(limiter, rate_limit))
        .layer(from_fn(log_requests))
        .layer(from_fn(stamp_req))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                })
                .on_failure(
                    |error: tower_http::classify::ServerErrorsFailureClass,
                     latency: Duration,
                     _span: &tracing::Span| {
                        error!(
                            error = %error,
                            latency_ms = latency.as_millis(),
                            "[TRACE] Request failed"
                        );
                    },
                ),
        )
        .layer(cors)
}

fn log_server_info() {
    info!("[SERVER] Available endpoints:");
    info!("  Auth:");
    info!("    POST /api/v1/auth/login");
    info!("    POST /api/v1/auth/refresh");
    info!("    GET  /api/v1/auth/logout");
    info!("    GET  /api/v1/auth/get-session");
    info!("    GET  /api/v1/auth/session");
    info!("  CSRF / captcha:");
    info!("    GET  /secure-gateway-c, /api/secure-gateway-c, /secure-gateway-c-cookie");
    info!("    GET  /get-captcha");
    info!("  Operations:");
    info!("    GET  /live, /metrics, /info, /log-stats-proxy");
    info!("    GET  /health/circuit, /metrics/circuit");
    info!("  Admin (HTTP Basic):");
    info!("    GET|POST /config-file");
    info!("    POST /publish");
    info!("  Anything else: proxied per the route table");
}

// endregion: --- Router
