//! # User Repository
//!
//! Database access for the account operations the login flow needs: lookup by any identity,
//! failed-attempt bookkeeping, blocking, and stamping a successful login.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use lib_core::model::store::{create_pool, UserRepository};
//! # async fn example() -> anyhow::Result<()> {
//! let pool = create_pool("sqlite::memory:").await?;
//! let account = UserRepository::find_by_identity(&pool, "alice@example.com").await?;
//! # Ok(())
//! # }
//! ```

use super::models::{Account, AccountForCreate};
use super::DbPool;
use crate::dto::AccountStatus;
use sqlx::query_as;

/// Account repository. Stateless; every method takes the pool.
pub struct UserRepository;

impl UserRepository {
    /// Find an account whose username or email (case-insensitive), phone number or identity
    /// number equals `identity`.
    pub async fn find_by_identity(
        pool: &DbPool,
        identity: &str,
    ) -> Result<Option<Account>, sqlx::Error> {
        query_as::<_, Account>(
            "SELECT * FROM users
             WHERE LOWER(username) = LOWER(?1) OR LOWER(email) = LOWER(?1)
                OR phone_number = ?1 OR identity_number = ?1
             LIMIT 1",
        )
        .bind(identity)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &DbPool, id_account: &str) -> Result<Option<Account>, sqlx::Error> {
        query_as::<_, Account>("SELECT * FROM users WHERE id_account = ?")
            .bind(id_account)
            .fetch_optional(pool)
            .await
    }

    /// Create a new account with a fresh UUID id.
    pub async fn create(pool: &DbPool, data: AccountForCreate) -> Result<Account, sqlx::Error> {
        let id_account = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO users
                (id_account, identity_number, username, full_name, email, phone_number,
                 status_account, password_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id_account)
        .bind(&data.identity_number)
        .bind(&data.username)
        .bind(&data.full_name)
        .bind(&data.email)
        .bind(&data.phone_number)
        .bind(data.status_account)
        .bind(&data.password_hash)
        .execute(pool)
        .await?;

        query_as::<_, Account>("SELECT * FROM users WHERE id_account = ?")
            .bind(&id_account)
            .fetch_one(pool)
            .await
    }

    /// Record a wrong password: increment attempts and remember the caller IP.
    ///
    /// Returns the attempt count after the increment.
    pub async fn record_failed_login(
        pool: &DbPool,
        id_account: &str,
        login_ip: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE users
             SET login_attempts = login_attempts + 1, login_ip = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id_account = ?
             RETURNING login_attempts",
        )
        .bind(login_ip)
        .bind(id_account)
        .fetch_one(pool)
        .await
    }

    /// Block an account after too many failed attempts.
    pub async fn block(pool: &DbPool, id_account: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET status_account = ?, updated_at = CURRENT_TIMESTAMP WHERE id_account = ?",
        )
        .bind(AccountStatus::BLOCKED)
        .bind(id_account)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Stamp a successful login: reset attempts, store IP, time and the new per-login auth key.
    pub async fn record_successful_login(
        pool: &DbPool,
        id_account: &str,
        login_ip: &str,
        login_time: i64,
        auth_key: &str,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query(
            "UPDATE users
             SET login_attempts = 0, login_ip = ?, login_time = ?, auth_key = ?,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id_account = ?",
        )
        .bind(login_ip)
        .bind(login_time)
        .bind(auth_key)
        .bind(id_account)
        .execute(pool)
        .await?;

        query_as::<_, Account>("SELECT * FROM users WHERE id_account = ?")
            .bind(id_account)
            .fetch_one(pool)
            .await
    }
}
