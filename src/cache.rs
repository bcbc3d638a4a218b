//! Durable, TTL-keyed key-value cache used to single-flight-coalesce
//! expensive external lookups (contract deployment blocks, token catalogue,
//! market data).
//!
//! Backed by a dedicated SQLite table sharing the ledger's connection pool,
//! rather than an external KV store — there is no redis/memcached dependency
//! anywhere upstream of this crate, so persistence rides on the same `sqlx`
//! idiom used for every other durable write.
//!
//! Single-flight coalescing is the caller's responsibility: this façade only
//! stores and expires entries. Callers read-before-call, write-after-call.

use crate::error::LedgerResult;
use sqlx::SqlitePool;
use std::time::Duration;

/// Cache key for a contract's deployment block, permanently cached.
#[must_use]
pub fn key_contract_creation(chain_id: u64, address_lower: &str) -> String {
    format!("explorer:contract-creation:{chain_id}:{address_lower}")
}

/// Cache key for the full token catalogue.
#[must_use]
pub fn key_tokens_all() -> String {
    "catalog:tokens:all".to_string()
}

/// Cache key for one detailed coin/token record.
#[must_use]
pub fn key_coin(coin_id: &str) -> String {
    format!("catalog:coin:{coin_id}")
}

/// Cache key for a batch market-data lookup over a set of coin IDs. The
/// caller is responsible for presenting `coin_ids` already sorted so the key
/// is stable regardless of request order.
#[must_use]
pub fn key_markets(sorted_coin_ids: &[String]) -> String {
    format!("catalog:markets:{}", sorted_coin_ids.join(","))
}

/// A durable cache façade over a shared `sqlx` SQLite pool.
#[derive(Clone)]
pub struct Cache {
    pool: SqlitePool,
}

impl Cache {
    /// Wrap an existing connection pool. The `cache_entries` table is
    /// expected to already exist (created by the crate's migrations).
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read a cache entry, returning `None` on a miss or on an expired entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LedgerError::DatabaseError`] on a query failure.
    pub async fn get(&self, key: &str) -> LedgerResult<Option<String>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, expires_at FROM cache_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp();
        if expires_at <= now {
            // Expired; lazily reclaim the row. Best-effort: a failed delete
            // here does not change the answer (still a miss).
            let _ = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await;
            return Ok(None);
        }

        Ok(Some(value))
    }

    /// Insert or overwrite a cache entry with the given time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LedgerError::DatabaseError`] on a query failure.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> LedgerResult<()> {
        let now = chrono::Utc::now().timestamp();
        let expires_at = now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        sqlx::query(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a single cache entry, if present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LedgerError::DatabaseError`] on a query failure.
    pub async fn delete(&self, key: &str) -> LedgerResult<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every cache entry whose key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LedgerError::DatabaseError`] on a query failure.
    pub async fn clear(&self, prefix: &str) -> LedgerResult<()> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        sqlx::query("DELETE FROM cache_entries WHERE key LIKE ? ESCAPE '\\'")
            .bind(pattern)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
