//! # Database Store
//!
//! SQLite connection pool, migrations and repository implementations.

// region: --- Modules
pub mod models;
pub mod telemetry_repository;
pub mod user_repository;

// endregion: --- Modules

// region: --- Re-exports
pub use telemetry_repository::TelemetryRepository;
pub use user_repository::UserRepository;
// endregion: --- Re-exports

// region: --- Types and Functions
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;

/// Type alias for SQLite connection pool.
pub type DbPool = SqlitePool;

/// Migrations shipped at the workspace root.
pub const WORKSPACE_MIGRATIONS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../../migrations");

/// Create a new SQLite connection pool, creating the database file if needed.
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let options = database_url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    Ok(pool)
}

/// Run the SQL migrations found in `migrations_path` (resolved at runtime).
pub async fn run_migrations(pool: &DbPool, migrations_path: &str) -> anyhow::Result<()> {
    let migrator = sqlx::migrate::Migrator::new(Path::new(migrations_path)).await?;
    migrator.run(pool).await?;
    Ok(())
}
/// Single-connection in-memory database with the workspace schema applied.
///
/// One connection, since every `sqlite::memory:` connection is a separate database.
pub async fn create_memory_pool() -> anyhow::Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool, WORKSPACE_MIGRATIONS).await?;
    Ok(pool)
}
// endregion: --- Types and Functions
