//! Database module for persistent storage of ledger entries, pool-price
//! samples, token/pool/position metadata, and the durable cache table.
//!
//! # Architecture
//!
//! - `models`: data structures that map to database tables
//! - `repository`: CRUD operations and business logic
//! - Connection pooling with SQLite WAL mode for concurrency
//! - Migration system for schema versioning

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::LedgerError;

pub mod models;
pub mod repository;

const EXPECTED_TABLES: &[&str] = &[
    "tokens",
    "pools",
    "positions",
    "pool_price_samples",
    "ledger_entries",
    "cache_entries",
];

/// Creates a SQLite connection pool with optimized settings.
///
/// - **WAL mode**: enables concurrent readers during writes.
/// - **Busy timeout**: 30 seconds to handle lock contention.
/// - **Max connections**: 5.
///
/// # Errors
///
/// Returns [`LedgerError::DatabaseError`] if the URL is malformed, the
/// connection cannot be established, or migrations fail.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, LedgerError> {
    info!(database_url, "connecting to database");

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            LedgerError::database(
                format!("failed to parse database URL: {database_url}"),
                Some(Box::new(e)),
            )
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| {
            LedgerError::database(
                format!("failed to connect to database at {database_url}"),
                Some(Box::new(e)),
            )
        })?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .map_err(|e| LedgerError::database("failed to enable foreign keys", Some(Box::new(e))))?;

    info!("running database migrations");
    run_migrations(&pool).await?;
    verify_database(&pool).await?;
    info!("database migrations complete");

    Ok(pool)
}

/// Applies all pending migrations from `./migrations`. Idempotent.
///
/// # Errors
///
/// Returns [`LedgerError::DatabaseError`] if a migration fails to apply.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), LedgerError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| LedgerError::database("failed to run database migrations", Some(Box::new(e))))?;

    Ok(())
}

/// Verify that every table this crate depends on exists after migration.
///
/// # Errors
///
/// Returns [`LedgerError::DatabaseError`] if the schema is incomplete.
pub async fn verify_database(pool: &SqlitePool) -> Result<(), LedgerError> {
    let rows = sqlx::query_as::<_, (String,)>(
        "SELECT name FROM sqlite_master WHERE type='table' AND name IN \
         ('tokens', 'pools', 'positions', 'pool_price_samples', 'ledger_entries', 'cache_entries')",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| LedgerError::database("failed to verify database schema", Some(Box::new(e))))?;

    if rows.len() < EXPECTED_TABLES.len() {
        return Err(LedgerError::database(
            format!(
                "database schema incomplete: expected {} tables, found {}",
                EXPECTED_TABLES.len(),
                rows.len()
            ),
            None,
        ));
    }

    Ok(())
}
