//! Historic pool-price resolution.
//!
//! Looks up a persisted [`PoolPriceSample`] for `(pool_id, block_number)`
//! first; on a miss, falls back to an archive RPC read of the pool's
//! `slot0()` and the block's timestamp, then persists the sample so later
//! callers never repeat the RPC round trip.

use crate::db::repository::Repository;
use crate::error::LedgerResult;
use crate::pricing::PoolPriceSample;
use crate::rpc::{self, Provider};
use alloy::primitives::{Address, U256};
use tracing::debug;

/// Resolve a pool's `sqrtPriceX96` and timestamp at a specific block,
/// durably caching the result.
///
/// # Errors
///
/// Propagates persistence errors from `repo`, or
/// [`crate::error::LedgerError::TransientProviderError`] if the RPC fallback
/// fails.
pub async fn resolve(
    repo: &Repository,
    provider: &Provider,
    pool_id: i64,
    pool_address: Address,
    block_number: u64,
) -> LedgerResult<PoolPriceSample> {
    if let Some(existing) = repo.find_pool_price_sample(pool_id, block_number).await? {
        return existing.into_sample();
    }

    debug!(pool_id, block_number, "no cached price sample, reading slot0 via RPC");
    let slot0 = rpc::read_slot0_at_block(provider, pool_address, block_number).await?;
    let timestamp = rpc::get_block_timestamp(provider, block_number).await?;
    let sqrt_price_x96 = U256::from(slot0.sqrtPriceX96);

    let row = repo
        .insert_pool_price_sample(pool_id, block_number, sqrt_price_x96, timestamp)
        .await?;
    row.into_sample()
}
