//! Repository: CRUD and query operations for the ledger schema.

use super::models::{LedgerEntryRow, PoolPriceSampleRow, PoolRow, PositionRow, TokenRow};
use crate::error::{LedgerError, LedgerResult};
use alloy::primitives::U256;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

/// Thin wrapper over a [`SqlitePool`] exposing ledger-domain queries.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Wrap an existing connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (shared with [`crate::cache::Cache`], which
    /// reads and writes the same database's `cache_entries` table).
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- tokens -----------------------------------------------------------

    /// Find a token by `(chain_id, address)`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    #[instrument(skip(self))]
    pub async fn upsert_token(
        &self,
        chain_id: u64,
        address: &str,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> LedgerResult<TokenRow> {
        let chain_id = i64::try_from(chain_id)
            .map_err(|e| LedgerError::invariant(format!("chain_id out of range: {e}")))?;

        if let Some(existing) = self.find_token(chain_id, address).await? {
            return Ok(existing);
        }

        sqlx::query(
            "INSERT INTO tokens (chain_id, address, name, symbol, decimals) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (chain_id, address) DO NOTHING",
        )
        .bind(chain_id)
        .bind(address)
        .bind(name)
        .bind(symbol)
        .bind(i64::from(decimals))
        .execute(&self.pool)
        .await?;

        self.find_token(chain_id, address)
            .await?
            .ok_or_else(|| LedgerError::database("token insert did not round-trip", None))
    }

    /// Look up a token by `(chain_id, address)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn find_token(&self, chain_id: i64, address: &str) -> LedgerResult<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT * FROM tokens WHERE chain_id = ? AND address = ?",
        )
        .bind(chain_id)
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Load a token by its row ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the token does not exist.
    pub async fn get_token(&self, token_id: i64) -> LedgerResult<TokenRow> {
        sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE id = ?")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("token {token_id} not found")))
    }

    // ---- pools --------------------------------------------------------------

    /// Find a pool by `(chain_id, address)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn find_pool(&self, chain_id: u64, address: &str) -> LedgerResult<Option<PoolRow>> {
        let chain_id = i64::try_from(chain_id)
            .map_err(|e| LedgerError::invariant(format!("chain_id out of range: {e}")))?;
        let row = sqlx::query_as::<_, PoolRow>("SELECT * FROM pools WHERE chain_id = ? AND address = ?")
            .bind(chain_id)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Load a pool by its row ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the pool does not exist.
    pub async fn get_pool(&self, pool_id: i64) -> LedgerResult<PoolRow> {
        sqlx::query_as::<_, PoolRow>("SELECT * FROM pools WHERE id = ?")
            .bind(pool_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("pool {pool_id} not found")))
    }

    /// Insert a pool row if absent, returning the existing or newly created row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn upsert_pool(
        &self,
        chain_id: u64,
        address: &str,
        token0_id: i64,
        token1_id: i64,
        fee_bps: u32,
        tick_spacing: i32,
    ) -> LedgerResult<PoolRow> {
        if let Some(existing) = self.find_pool(chain_id, address).await? {
            return Ok(existing);
        }

        let chain_id_i64 = i64::try_from(chain_id)
            .map_err(|e| LedgerError::invariant(format!("chain_id out of range: {e}")))?;

        sqlx::query(
            "INSERT INTO pools (chain_id, address, token0_id, token1_id, fee_bps, tick_spacing)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (chain_id, address) DO NOTHING",
        )
        .bind(chain_id_i64)
        .bind(address)
        .bind(token0_id)
        .bind(token1_id)
        .bind(i64::from(fee_bps))
        .bind(i64::from(tick_spacing))
        .execute(&self.pool)
        .await?;

        self.find_pool(chain_id, address)
            .await?
            .ok_or_else(|| LedgerError::database("pool insert did not round-trip", None))
    }

    /// Refresh a pool's on-chain state fields.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn update_pool_state(
        &self,
        pool_id: i64,
        sqrt_price_x96: U256,
        current_tick: i32,
        liquidity: U256,
    ) -> LedgerResult<()> {
        sqlx::query("UPDATE pools SET sqrt_price_x96 = ?, current_tick = ?, liquidity = ? WHERE id = ?")
            .bind(sqrt_price_x96.to_string())
            .bind(i64::from(current_tick))
            .bind(liquidity.to_string())
            .bind(pool_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- positions ------------------------------------------------------------

    /// Load a position by `(chain_id, nft_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if no such position is recorded.
    pub async fn get_position_by_nft_id(&self, chain_id: u64, nft_id: U256) -> LedgerResult<PositionRow> {
        let chain_id = i64::try_from(chain_id)
            .map_err(|e| LedgerError::invariant(format!("chain_id out of range: {e}")))?;
        sqlx::query_as::<_, PositionRow>("SELECT * FROM positions WHERE chain_id = ? AND nft_id = ?")
            .bind(chain_id)
            .bind(nft_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("position {nft_id} on chain {chain_id} not found")))
    }

    /// Load a position by its row ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if no such position is recorded.
    pub async fn get_position(&self, position_id: i64) -> LedgerResult<PositionRow> {
        sqlx::query_as::<_, PositionRow>("SELECT * FROM positions WHERE id = ?")
            .bind(position_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("position {position_id} not found")))
    }

    /// Insert a new position row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure (including a
    /// unique-constraint violation on `(chain_id, nft_id)`).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_position(
        &self,
        chain_id: u64,
        nft_id: U256,
        pool_id: i64,
        owner_address: &str,
        tick_lower: i32,
        tick_upper: i32,
        is_token0_quote: bool,
    ) -> LedgerResult<PositionRow> {
        let chain_id = i64::try_from(chain_id)
            .map_err(|e| LedgerError::invariant(format!("chain_id out of range: {e}")))?;
        let id: (i64,) = sqlx::query_as(
            "INSERT INTO positions
                (chain_id, nft_id, pool_id, owner_address, tick_lower, tick_upper, is_token0_quote)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(chain_id)
        .bind(nft_id.to_string())
        .bind(pool_id)
        .bind(owner_address)
        .bind(tick_lower)
        .bind(tick_upper)
        .bind(is_token0_quote)
        .fetch_one(&self.pool)
        .await?;

        self.get_position(id.0).await
    }

    // ---- pool price samples -----------------------------------------------------

    /// Look up a historic price sample by `(pool_id, block_number)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn find_pool_price_sample(
        &self,
        pool_id: i64,
        block_number: u64,
    ) -> LedgerResult<Option<PoolPriceSampleRow>> {
        let block_number = i64::try_from(block_number)
            .map_err(|e| LedgerError::invariant(format!("block_number out of range: {e}")))?;
        let row = sqlx::query_as::<_, PoolPriceSampleRow>(
            "SELECT * FROM pool_price_samples WHERE pool_id = ? AND block_number = ?",
        )
        .bind(pool_id)
        .bind(block_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Persist a new price sample. On a `(pool_id, block_number)` race, read
    /// back the winning row rather than erroring.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a non-conflict query failure.
    pub async fn insert_pool_price_sample(
        &self,
        pool_id: i64,
        block_number: u64,
        sqrt_price_x96: U256,
        timestamp: i64,
    ) -> LedgerResult<PoolPriceSampleRow> {
        let block_number_i64 = i64::try_from(block_number)
            .map_err(|e| LedgerError::invariant(format!("block_number out of range: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO pool_price_samples (pool_id, block_number, sqrt_price_x96, timestamp)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (pool_id, block_number) DO NOTHING",
        )
        .bind(pool_id)
        .bind(block_number_i64)
        .bind(sqrt_price_x96.to_string())
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(pool_id, block_number, "price sample race lost, reading back winner");
        }

        self.find_pool_price_sample(pool_id, block_number)
            .await?
            .ok_or_else(|| LedgerError::database("price sample insert did not round-trip", None))
    }

    // ---- ledger entries ---------------------------------------------------------

    /// All ledger entries for a position, ascending in chain order
    /// (`timestamp`, then insertion order) — the order the state machine
    /// folds over while rebuilding.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn ledger_entries_ascending(&self, position_id: i64) -> LedgerResult<Vec<LedgerEntryRow>> {
        let rows = sqlx::query_as::<_, LedgerEntryRow>(
            "SELECT * FROM ledger_entries WHERE position_id = ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All ledger entries for a position, descending by timestamp (newest
    /// first) — the read convention callers see.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn ledger_entries_descending(&self, position_id: i64) -> LedgerResult<Vec<LedgerEntryRow>> {
        let rows = sqlx::query_as::<_, LedgerEntryRow>(
            "SELECT * FROM ledger_entries WHERE position_id = ? ORDER BY timestamp DESC, id DESC",
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The most recent entry for a position (chain order), or `None` if the
    /// ledger is empty.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn last_ledger_entry(&self, position_id: i64) -> LedgerResult<Option<LedgerEntryRow>> {
        let row = sqlx::query_as::<_, LedgerEntryRow>(
            "SELECT * FROM ledger_entries WHERE position_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(position_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Delete every ledger entry for a position (the first step of a full
    /// rebuild).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] on a query failure.
    pub async fn delete_ledger_entries(&self, position_id: i64) -> LedgerResult<()> {
        sqlx::query("DELETE FROM ledger_entries WHERE position_id = ?")
            .bind(position_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert one ledger entry, linking it to `previous_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvariantViolated`] on a duplicate `input_hash`,
    /// or [`LedgerError::DatabaseError`] on any other query failure.
    pub async fn insert_ledger_entry(&self, entry: &NewLedgerEntry<'_>) -> LedgerResult<LedgerEntryRow> {
        let id: (i64,) = sqlx::query_as(
            "INSERT INTO ledger_entries
                (position_id, protocol, previous_id, timestamp, event_type, input_hash,
                 pool_price, token0_amount, token1_amount, token_value, rewards,
                 delta_cost_basis, cost_basis_after, delta_pnl, pnl_after, config, state)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(entry.position_id)
        .bind(entry.protocol)
        .bind(entry.previous_id)
        .bind(entry.timestamp)
        .bind(entry.event_type)
        .bind(entry.input_hash)
        .bind(entry.pool_price)
        .bind(entry.token0_amount)
        .bind(entry.token1_amount)
        .bind(entry.token_value)
        .bind(entry.rewards)
        .bind(entry.delta_cost_basis)
        .bind(entry.cost_basis_after)
        .bind(entry.delta_pnl)
        .bind(entry.pnl_after)
        .bind(entry.config)
        .bind(entry.state)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                LedgerError::invariant(format!("duplicate inputHash {}", entry.input_hash))
            }
            _ => LedgerError::from(e),
        })?;

        sqlx::query_as::<_, LedgerEntryRow>("SELECT * FROM ledger_entries WHERE id = ?")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(LedgerError::from)
    }

    /// Lightweight connectivity check.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the connection is unusable.
    pub async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Fields required to insert one ledger entry. Every numeric field arrives
/// pre-formatted as a decimal string by the caller (the state machine),
/// keeping this struct a pure persistence boundary.
pub struct NewLedgerEntry<'a> {
    /// The owning position's row ID.
    pub position_id: i64,
    /// Protocol tag.
    pub protocol: &'a str,
    /// Prior entry's row ID, `None` iff first in the chain.
    pub previous_id: Option<i64>,
    /// Block timestamp.
    pub timestamp: i64,
    /// `INCREASE_POSITION` | `DECREASE_POSITION` | `COLLECT`.
    pub event_type: &'a str,
    /// Deduplication key.
    pub input_hash: &'a str,
    /// Historic pool price, decimal string.
    pub pool_price: &'a str,
    /// token0 amount, decimal string.
    pub token0_amount: &'a str,
    /// token1 amount, decimal string.
    pub token1_amount: &'a str,
    /// Total quote-denominated value, decimal string.
    pub token_value: &'a str,
    /// JSON-encoded rewards array.
    pub rewards: &'a str,
    /// Signed cost-basis delta, decimal string.
    pub delta_cost_basis: &'a str,
    /// Cost basis after, decimal string.
    pub cost_basis_after: &'a str,
    /// Signed PnL delta, decimal string.
    pub delta_pnl: &'a str,
    /// PnL after, decimal string.
    pub pnl_after: &'a str,
    /// JSON-encoded config sub-document.
    pub config: &'a str,
    /// JSON-encoded state sub-document.
    pub state: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    async fn repo() -> Repository {
        Repository::new(create_pool("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn upsert_token_is_idempotent() {
        let repo = repo().await;
        let a = repo.upsert_token(1, "0xabc", "Wrapped Ether", "WETH", 18).await.unwrap();
        let b = repo.upsert_token(1, "0xabc", "Wrapped Ether", "WETH", 18).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn position_not_found_is_not_found_error() {
        let repo = repo().await;
        let err = repo.get_position(999).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn insert_and_fetch_position() {
        let repo = repo().await;
        let t0 = repo.upsert_token(1, "0xaaa", "Token A", "AAA", 18).await.unwrap();
        let t1 = repo.upsert_token(1, "0xbbb", "Token B", "BBB", 6).await.unwrap();
        let pool = repo.upsert_pool(1, "0xpool", t0.id, t1.id, 3000, 60).await.unwrap();
        let position = repo
            .insert_position(1, U256::from(123_456u64), pool.id, "0xowner", -100, 100, false)
            .await
            .unwrap();
        let fetched = repo.get_position_by_nft_id(1, U256::from(123_456u64)).await.unwrap();
        assert_eq!(position.id, fetched.id);
        assert!(!fetched.is_token0_quote);
    }

    #[tokio::test]
    async fn price_sample_race_reads_back_winner() {
        let repo = repo().await;
        let t0 = repo.upsert_token(1, "0xaaa", "A", "A", 18).await.unwrap();
        let t1 = repo.upsert_token(1, "0xbbb", "B", "B", 18).await.unwrap();
        let pool = repo.upsert_pool(1, "0xpool", t0.id, t1.id, 3000, 60).await.unwrap();

        let first = repo
            .insert_pool_price_sample(pool.id, 100, U256::from(12345u64), 1_700_000_000)
            .await
            .unwrap();
        let second = repo
            .insert_pool_price_sample(pool.id, 100, U256::from(99999u64), 1_700_000_100)
            .await
            .unwrap();
        assert_eq!(first.sqrt_price_x96, second.sqrt_price_x96);
    }

    #[tokio::test]
    async fn ledger_entries_ordering_and_deletion() {
        let repo = repo().await;
        let t0 = repo.upsert_token(1, "0xaaa", "A", "A", 18).await.unwrap();
        let t1 = repo.upsert_token(1, "0xbbb", "B", "B", 6).await.unwrap();
        let pool = repo.upsert_pool(1, "0xpool", t0.id, t1.id, 3000, 60).await.unwrap();
        let position = repo
            .insert_position(1, U256::from(1u64), pool.id, "0xowner", -100, 100, false)
            .await
            .unwrap();

        let first = repo
            .insert_ledger_entry(&NewLedgerEntry {
                position_id: position.id,
                protocol: "uniswapv3",
                previous_id: None,
                timestamp: 1000,
                event_type: "INCREASE_POSITION",
                input_hash: "hash1",
                pool_price: "2000000000",
                token0_amount: "500000000000000000",
                token1_amount: "1000000000",
                token_value: "2000000000",
                rewards: "[]",
                delta_cost_basis: "2000000000",
                cost_basis_after: "2000000000",
                delta_pnl: "0",
                pnl_after: "0",
                config: "{}",
                state: "{}",
            })
            .await
            .unwrap();

        repo.insert_ledger_entry(&NewLedgerEntry {
            position_id: position.id,
            protocol: "uniswapv3",
            previous_id: Some(first.id),
            timestamp: 2000,
            event_type: "COLLECT",
            input_hash: "hash2",
            pool_price: "2200000000",
            token0_amount: "0",
            token1_amount: "10000000",
            token_value: "10000000",
            rewards: "[]",
            delta_cost_basis: "0",
            cost_basis_after: "2000000000",
            delta_pnl: "0",
            pnl_after: "0",
            config: "{}",
            state: "{}",
        })
        .await
        .unwrap();

        let descending = repo.ledger_entries_descending(position.id).await.unwrap();
        assert_eq!(descending.len(), 2);
        assert_eq!(descending[0].event_type, "COLLECT");

        repo.delete_ledger_entries(position.id).await.unwrap();
        let after_delete = repo.ledger_entries_descending(position.id).await.unwrap();
        assert!(after_delete.is_empty());
    }

    #[tokio::test]
    async fn duplicate_input_hash_is_invariant_violation() {
        let repo = repo().await;
        let t0 = repo.upsert_token(1, "0xaaa", "A", "A", 18).await.unwrap();
        let t1 = repo.upsert_token(1, "0xbbb", "B", "B", 6).await.unwrap();
        let pool = repo.upsert_pool(1, "0xpool", t0.id, t1.id, 3000, 60).await.unwrap();
        let position = repo
            .insert_position(1, U256::from(1u64), pool.id, "0xowner", -100, 100, false)
            .await
            .unwrap();

        let new_entry = NewLedgerEntry {
            position_id: position.id,
            protocol: "uniswapv3",
            previous_id: None,
            timestamp: 1000,
            event_type: "INCREASE_POSITION",
            input_hash: "dup",
            pool_price: "1",
            token0_amount: "1",
            token1_amount: "1",
            token_value: "1",
            rewards: "[]",
            delta_cost_basis: "1",
            cost_basis_after: "1",
            delta_pnl: "0",
            pnl_after: "0",
            config: "{}",
            state: "{}",
        };
        repo.insert_ledger_entry(&new_entry).await.unwrap();
        let err = repo.insert_ledger_entry(&new_entry).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolated { .. }));
    }
}
