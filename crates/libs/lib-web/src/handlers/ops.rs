//! # Operational Handlers
//!
//! Liveness, counters, circuit state, the active route table and telemetry aggregates.

use crate::proxy::{CircuitSnapshot, CircuitState, Dispatcher};
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use lib_core::dto::ApiResponse;
use lib_core::model::store::models::LogProxyStat;
use lib_core::model::store::TelemetryRepository;
use lib_core::{AppError, DbPool, RouteEntry, RouteTableHandle, TelemetrySink};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn live() -> &'static str {
    "OK"
}

pub async fn metrics(
    State(dispatcher): State<Arc<Dispatcher>>,
    State(telemetry): State<TelemetrySink>,
    State(routes): State<Arc<RouteTableHandle>>,
) -> Json<Value> {
    Json(json!({
        "dispatcher": dispatcher.counters(),
        "telemetry": telemetry.stats(),
        "routes": routes.stats(),
    }))
}

// region: --- Circuits

#[derive(Debug, Default, Serialize)]
pub struct CircuitStats {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub circuits: Vec<CircuitSnapshot>,
}

impl CircuitStats {
    fn from_snapshots(circuits: Vec<CircuitSnapshot>) -> Self {
        let count = |state| circuits.iter().filter(|c| c.state == state).count();
        Self {
            closed: count(CircuitState::Closed),
            open: count(CircuitState::Open),
            half_open: count(CircuitState::HalfOpen),
            circuits,
        }
    }
}

pub async fn circuit_health(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    let stats = CircuitStats::from_snapshots(dispatcher.circuits());
    if stats.open > 0 {
        let open: Vec<&str> = stats
            .circuits
            .iter()
            .filter(|c| c.state == CircuitState::Open)
            .map(|c| c.upstream.as_str())
            .collect();
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "open": open})),
        )
            .into_response();
    }
    Json(json!({"status": "healthy"})).into_response()
}

pub async fn circuit_metrics(State(dispatcher): State<Arc<Dispatcher>>) -> Json<CircuitStats> {
    Json(CircuitStats::from_snapshots(dispatcher.circuits()))
}

// endregion: --- Circuits

#[derive(Debug, Serialize)]
pub struct RouteInfo {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub services: Vec<RouteEntry>,
}

pub async fn info(State(routes): State<Arc<RouteTableHandle>>) -> Json<ApiResponse<RouteInfo>> {
    let table = routes.current();
    let total = table.len() as i64;
    let info = RouteInfo {
        version: table.version(),
        loaded_at: table.loaded_at(),
        services: table.entries().to_vec(),
    };
    Json(ApiResponse::ok("Success get info", info).with_total(total))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsWindow {
    pub from: Option<String>,
    pub to: Option<String>,
}

fn parse_bound(value: Option<&str>, name: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => lib_utils::parse_utc(v)
            .map(Some)
            .map_err(|_| AppError::InvalidInput(format!("{name} must be an RFC3339 timestamp"))),
    }
}

/// Average duration and count per `(service, method, path, status)`.
pub async fn log_stats(
    State(pool): State<DbPool>,
    Query(window): Query<StatsWindow>,
) -> Result<Json<ApiResponse<Vec<LogProxyStat>>>, AppError> {
    let from = parse_bound(window.from.as_deref(), "from")?;
    let to = parse_bound(window.to.as_deref(), "to")?;

    let stats = TelemetryRepository::stats(&pool, from, to).await?;
    let total = stats.len() as i64;
    Ok(Json(ApiResponse::ok("Success get stats", stats).with_total(total)))
}
