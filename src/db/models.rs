//! Database models mapping to the ledger schema's SQL tables.
//!
//! Every financial integer persists as a decimal string (`TEXT` column); this
//! module owns the conversion between those strings and [`U256`]/`i128`.

use crate::error::{LedgerError, LedgerResult};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Parse a decimal-string column into a [`U256`].
///
/// # Errors
///
/// Returns [`LedgerError::DecodeError`] if `s` is not a valid base-10 integer.
pub fn parse_u256(field: &str, s: &str) -> LedgerResult<U256> {
    s.parse()
        .map_err(|e| LedgerError::decode(format!("malformed decimal-string {field}: '{s}' ({e})")))
}

/// A token row: identity, display metadata, and decimals.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TokenRow {
    /// Database-assigned identifier.
    pub id: i64,
    /// Chain the token lives on.
    pub chain_id: i64,
    /// Checksum-normalized contract address.
    pub address: String,
    /// Display name.
    pub name: String,
    /// Display symbol.
    pub symbol: String,
    /// Token decimals, `0..=255`.
    pub decimals: i64,
    /// Optional logo URL enrichment.
    pub logo_url: Option<String>,
    /// Optional market-cap enrichment, decimal string.
    pub market_cap: Option<String>,
    /// Row creation timestamp, ISO-8601.
    pub created_at: String,
}

/// A pool row: config plus refreshable state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PoolRow {
    /// Database-assigned identifier.
    pub id: i64,
    /// Protocol tag, always `"uniswapv3"` today.
    pub protocol: String,
    /// Chain the pool lives on.
    pub chain_id: i64,
    /// Pool contract address.
    pub address: String,
    /// Foreign key to the `token0` row (`token0.address < token1.address`).
    pub token0_id: i64,
    /// Foreign key to the `token1` row.
    pub token1_id: i64,
    /// Fee tier, in basis points.
    pub fee_bps: i64,
    /// Tick spacing.
    pub tick_spacing: i64,
    /// Current `sqrtPriceX96`, decimal string.
    pub sqrt_price_x96: String,
    /// Current tick.
    pub current_tick: i64,
    /// Current total liquidity, decimal string.
    pub liquidity: String,
    /// Global fee growth for token0, decimal string.
    pub fee_growth_global0: String,
    /// Global fee growth for token1, decimal string.
    pub fee_growth_global1: String,
    /// Row creation timestamp, ISO-8601.
    pub created_at: String,
}

impl PoolRow {
    /// Parse `sqrt_price_x96` into a [`U256`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DecodeError`] on a malformed column value.
    pub fn sqrt_price_x96_u256(&self) -> LedgerResult<U256> {
        parse_u256("sqrt_price_x96", &self.sqrt_price_x96)
    }
}

/// A position row: immutable config plus refreshable state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PositionRow {
    /// Database-assigned identifier.
    pub id: i64,
    /// Chain the position lives on.
    pub chain_id: i64,
    /// NFT token ID, decimal string (may exceed `i64`).
    pub nft_id: String,
    /// Foreign key to the owning pool.
    pub pool_id: i64,
    /// Current owner address.
    pub owner_address: String,
    /// Lower tick bound of the position's range.
    pub tick_lower: i64,
    /// Upper tick bound of the position's range.
    pub tick_upper: i64,
    /// Whether token0 (`true`) or token1 (`false`) is the quote token.
    pub is_token0_quote: bool,
    /// Current liquidity, decimal string.
    pub liquidity: String,
    /// Fee growth inside the range, last observed, token0.
    pub fee_growth_inside0_last_x128: String,
    /// Fee growth inside the range, last observed, token1.
    pub fee_growth_inside1_last_x128: String,
    /// Tokens owed (uncollected), token0.
    pub tokens_owed0: String,
    /// Tokens owed (uncollected), token1.
    pub tokens_owed1: String,
    /// Row creation timestamp, ISO-8601.
    pub created_at: String,
}

impl PositionRow {
    /// Parse `nft_id` into a [`U256`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DecodeError`] on a malformed column value.
    pub fn nft_id_u256(&self) -> LedgerResult<U256> {
        parse_u256("nft_id", &self.nft_id)
    }
}

/// A historic pool-price observation row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PoolPriceSampleRow {
    /// Database-assigned identifier.
    pub id: i64,
    /// The pool this sample belongs to.
    pub pool_id: i64,
    /// The block number the sample was observed at.
    pub block_number: i64,
    /// The pool's `sqrtPriceX96` at that block, decimal string.
    pub sqrt_price_x96: String,
    /// The block's Unix timestamp.
    pub timestamp: i64,
}

impl PoolPriceSampleRow {
    /// Convert into the runtime [`crate::pricing::PoolPriceSample`] value.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DecodeError`] on a malformed `sqrt_price_x96` column.
    pub fn into_sample(self) -> LedgerResult<crate::pricing::PoolPriceSample> {
        Ok(crate::pricing::PoolPriceSample {
            pool_id: self.pool_id,
            block_number: u64::try_from(self.block_number)
                .map_err(|e| LedgerError::decode(format!("negative block_number: {e}")))?,
            sqrt_price_x96: self.sqrt_price_x96_u256()?,
            timestamp: self.timestamp,
        })
    }

    fn sqrt_price_x96_u256(&self) -> LedgerResult<U256> {
        parse_u256("sqrt_price_x96", &self.sqrt_price_x96)
    }
}

/// One row of the ledger chain.
///
/// `config`, `state`, and `rewards` persist as JSON text; callers deserialize
/// them into the typed structures in [`crate::ledger::entry`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerEntryRow {
    /// Database-assigned identifier.
    pub id: i64,
    /// The position this entry belongs to.
    pub position_id: i64,
    /// Protocol tag, always `"uniswapv3"` today.
    pub protocol: String,
    /// Self-reference to the prior entry in the chain, null iff first.
    pub previous_id: Option<i64>,
    /// Block timestamp this event occurred at.
    pub timestamp: i64,
    /// One of `INCREASE_POSITION`, `DECREASE_POSITION`, `COLLECT`.
    pub event_type: String,
    /// Global deduplication key.
    pub input_hash: String,
    /// Historic pool price at this event's block, decimal string.
    pub pool_price: String,
    /// token0 amount involved in this event, decimal string.
    pub token0_amount: String,
    /// token1 amount involved in this event, decimal string.
    pub token1_amount: String,
    /// Total quote-denominated value of this event, decimal string.
    pub token_value: String,
    /// JSON array of `{tokenId, tokenAmount, tokenValue}` fee-accrual rewards.
    pub rewards: String,
    /// Signed change in cost basis, decimal string.
    pub delta_cost_basis: String,
    /// Cost basis after this event, decimal string.
    pub cost_basis_after: String,
    /// Signed change in realized PnL, decimal string.
    pub delta_pnl: String,
    /// Realized PnL after this event, decimal string.
    pub pnl_after: String,
    /// Protocol-specific config JSON sub-document.
    pub config: String,
    /// Protocol-specific state JSON sub-document (discriminated union).
    pub state: String,
    /// Row creation timestamp, ISO-8601.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u256_round_trips() {
        let v = parse_u256("x", "123456789012345678901234567890").unwrap();
        assert_eq!(v.to_string(), "123456789012345678901234567890");
    }

    #[test]
    fn parse_u256_rejects_garbage() {
        assert!(parse_u256("x", "not-a-number").is_err());
    }

}
