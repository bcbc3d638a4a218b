//! RPC provider management and the one on-chain read this crate performs
//! directly against a node: a pool's `slot0()`.
//!
//! Every other external read goes through the block-explorer client
//! ([`crate::explorer`]); `slot0()` is the exception because the unified
//! explorer endpoint does not expose current contract storage, only logs and
//! block metadata.
//!
//! ## Example
//!
//! ```no_run
//! use clp_ledger::rpc::{create_provider, read_slot0};
//! use clp_ledger::error::LedgerResult;
//! use alloy::primitives::address;
//!
//! # async fn example() -> LedgerResult<()> {
//! let provider = create_provider("https://eth-mainnet.g.alchemy.com/v2/API_KEY").await?;
//! let pool = address!("0000000000000000000000000000000000000000");
//! let slot0 = read_slot0(&provider, pool).await?;
//! println!("sqrtPriceX96 = {}", slot0.sqrtPriceX96);
//! # Ok(())
//! # }
//! ```

use crate::error::{LedgerError, LedgerResult};
use alloy::eips::BlockId;
use alloy::primitives::Address;
use alloy::providers::{Provider as AlloyProvider, ProviderBuilder, RootProvider};
use alloy::sol;
use alloy::transports::http::{Client, Http};
use tracing::{debug, info, instrument};

/// Type alias for the HTTP provider used for on-chain reads.
pub type Provider = RootProvider<Http<Client>>;

sol! {
    #[sol(rpc)]
    interface IUniswapV3PoolState {
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            uint8 feeProtocol,
            bool unlocked
        );
    }
}

pub use IUniswapV3PoolState::slot0Return as Slot0;

/// Create a new RPC provider connected via HTTP.
///
/// # Errors
///
/// Returns [`LedgerError::ConfigurationError`] if `rpc_url` does not parse as
/// a URL.
#[allow(clippy::unused_async)]
#[instrument(skip(rpc_url), fields(rpc_host = tracing::field::Empty))]
pub async fn create_provider(rpc_url: &str) -> LedgerResult<Provider> {
    info!("initializing RPC provider");

    let host = rpc_url.split("/v2/").next().unwrap_or("unknown");
    tracing::Span::current().record("rpc_host", host);

    let url = rpc_url.parse().map_err(|e| {
        LedgerError::config(format!("invalid RPC URL: '{rpc_url}'"), Some(Box::new(e)))
    })?;

    let provider = ProviderBuilder::new().on_http(url);
    debug!("RPC provider initialized");
    Ok(provider)
}

/// Read a Uniswap-V3-family pool's `slot0()` — its current `sqrtPriceX96`
/// and tick. Used by the historic-price resolver only as a last resort when
/// no cheaper path (a logged `Swap`/cached sample) can establish the price
/// at a given block; callers pass the provider already pinned to that block
/// via their own block-tag handling.
///
/// # Errors
///
/// Returns [`LedgerError::TransientProviderError`] if the `eth_call` fails.
pub async fn read_slot0(provider: &Provider, pool_address: Address) -> LedgerResult<Slot0> {
    let pool = IUniswapV3PoolState::new(pool_address, provider);
    pool.slot0()
        .call()
        .await
        .map_err(|e| LedgerError::transient("slot0() call failed", Some(Box::new(e))))
}

/// Read `slot0()` as observed at a specific historic block, via an
/// archive-capable RPC endpoint. Used by [`crate::pricing`]'s historic-price
/// resolver when no persisted [`crate::pricing::PoolPriceSample`] exists yet
/// for `(pool, block_number)`.
///
/// # Errors
///
/// Returns [`LedgerError::TransientProviderError`] if the `eth_call` fails
/// (including when the node is not archive-capable and has pruned the
/// requested block's state).
pub async fn read_slot0_at_block(
    provider: &Provider,
    pool_address: Address,
    block_number: u64,
) -> LedgerResult<Slot0> {
    let pool = IUniswapV3PoolState::new(pool_address, provider);
    pool.slot0()
        .block(BlockId::number(block_number))
        .call()
        .await
        .map_err(|e| LedgerError::transient("slot0() call at historic block failed", Some(Box::new(e))))
}

/// Get the latest block number known to the node.
///
/// # Errors
///
/// Returns [`LedgerError::TransientProviderError`] if the RPC request fails.
pub async fn get_latest_block(provider: &Provider) -> LedgerResult<u64> {
    provider
        .get_block_number()
        .await
        .map_err(|e| LedgerError::transient("failed to fetch latest block number", Some(Box::new(e))))
}

/// Get a block's Unix timestamp.
///
/// # Errors
///
/// Returns [`LedgerError::TransientProviderError`] if the RPC request fails,
/// or [`LedgerError::NotFound`] if the node has no record of that block.
pub async fn get_block_timestamp(provider: &Provider, block_number: u64) -> LedgerResult<i64> {
    let block = provider
        .get_block_by_number(block_number.into(), alloy::rpc::types::BlockTransactionsKind::Hashes)
        .await
        .map_err(|e| LedgerError::transient("failed to fetch block by number", Some(Box::new(e))))?
        .ok_or_else(|| LedgerError::not_found(format!("block {block_number} not found")))?;

    i64::try_from(block.header.timestamp)
        .map_err(|e| LedgerError::decode(format!("block timestamp out of range: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_provider_rejects_malformed_url() {
        let result = create_provider("not a url").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_provider_accepts_well_formed_url() {
        let result = create_provider("https://eth-mainnet.g.alchemy.com/v2/test_key").await;
        assert!(result.is_ok());
    }
}
