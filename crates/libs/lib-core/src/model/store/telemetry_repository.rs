//! # Telemetry Repository
//!
//! Inserts `log_proxies` rows and aggregates them for `/log-stats-proxy`.

use super::models::{LogProxyForCreate, LogProxyRow, LogProxyStat};
use super::DbPool;
use chrono::{DateTime, Utc};
use sqlx::query_as;

pub struct TelemetryRepository;

impl TelemetryRepository {
    pub async fn insert(pool: &DbPool, row: &LogProxyForCreate) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO log_proxies
                (level, service, method, path, user_auth, status, duration_ms, fields, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.level)
        .bind(&row.service)
        .bind(&row.method)
        .bind(&row.path)
        .bind(&row.user_auth)
        .bind(row.status)
        .bind(row.duration_ms)
        .bind(&row.fields)
        .bind(row.timestamp)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Rows in insertion order. Used by tests and diagnostics.
    pub async fn list(pool: &DbPool, limit: i64) -> Result<Vec<LogProxyRow>, sqlx::Error> {
        query_as::<_, LogProxyRow>("SELECT * FROM log_proxies ORDER BY id ASC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Average duration and count grouped by `(service, method, path, status)` within an
    /// optional time window.
    pub async fn stats(
        pool: &DbPool,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogProxyStat>, sqlx::Error> {
        query_as::<_, LogProxyStat>(
            "SELECT service, method, path, status,
                    CAST(AVG(duration_ms) AS REAL) AS avg_duration_ms,
                    COUNT(*) AS count
             FROM log_proxies
             WHERE (?1 IS NULL OR timestamp >= ?1) AND (?2 IS NULL OR timestamp <= ?2)
             GROUP BY service, method, path, status
             ORDER BY count DESC, service ASC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }
}
