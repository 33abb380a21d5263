//! # Core Library
//!
//! Core models, configuration, stores, route table, telemetry and notification bus for the gateway.

pub mod bus;
pub mod config;
pub mod dto;
pub mod error;
pub mod model;
pub mod routes;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use model::kv::{KvStore, MemoryStore, RedisStore, SharedKv, StoreError};
pub use model::store::{create_pool, run_migrations, DbPool};
pub use routes::{ConfigError, RouteEntry, RouteTable, RouteTableHandle};
pub use telemetry::{TelemetryRecord, TelemetrySink};
