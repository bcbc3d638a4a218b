//! The closed registry of chains supported by the ledger engine.
//!
//! Each supported chain carries a fixed, known-up-front position-manager
//! address for the concentrated-liquidity protocol, a pool-factory address,
//! and the provider ID the block explorer uses to disambiguate chains behind
//! its unified endpoint.

use crate::error::{LedgerError, LedgerResult};

/// A supported EVM chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainInfo {
    /// Numeric chain ID (e.g. 1 for Ethereum mainnet).
    pub chain_id: u64,
    /// Nonfungible position-manager contract address, lowercase hex with `0x` prefix.
    pub position_manager: &'static str,
    /// Pool-factory contract address, lowercase hex with `0x` prefix.
    pub pool_factory: &'static str,
    /// `chainid` query-string value the unified block explorer expects.
    pub explorer_chain_id: u64,
}

/// The canonical set of supported chains: Ethereum, Arbitrum, Base, Optimism, Polygon.
///
/// Position-manager addresses are Uniswap V3's canonical `NonfungiblePositionManager`
/// deployment, identical across these chains.
const SUPPORTED_CHAINS: &[ChainInfo] = &[
    ChainInfo {
        chain_id: 1,
        position_manager: "0xc36442b4a4522e871399cd717abdd847ab11fe88",
        pool_factory: "0x1f98431c8ad98523631ae4a59f267346ea31f984",
        explorer_chain_id: 1,
    },
    ChainInfo {
        chain_id: 42161,
        position_manager: "0xc36442b4a4522e871399cd717abdd847ab11fe88",
        pool_factory: "0x1f98431c8ad98523631ae4a59f267346ea31f984",
        explorer_chain_id: 42161,
    },
    ChainInfo {
        chain_id: 8453,
        position_manager: "0x03a520b32c04bf3beef7beb72e919cf822ed34f1",
        pool_factory: "0x33128a8fc17869897dce68ed026d694621f6fdfd",
        explorer_chain_id: 8453,
    },
    ChainInfo {
        chain_id: 10,
        position_manager: "0xc36442b4a4522e871399cd717abdd847ab11fe88",
        pool_factory: "0x1f98431c8ad98523631ae4a59f267346ea31f984",
        explorer_chain_id: 10,
    },
    ChainInfo {
        chain_id: 137,
        position_manager: "0xc36442b4a4522e871399cd717abdd847ab11fe88",
        pool_factory: "0x1f98431c8ad98523631ae4a59f267346ea31f984",
        explorer_chain_id: 137,
    },
];

/// Look up a chain's fixed configuration by its numeric chain ID.
///
/// # Errors
///
/// Returns [`LedgerError::ConfigurationError`] if the chain ID is not in the
/// closed, canonical set `{1, 42161, 8453, 10, 137}`.
pub fn lookup(chain_id: u64) -> LedgerResult<ChainInfo> {
    SUPPORTED_CHAINS
        .iter()
        .copied()
        .find(|c| c.chain_id == chain_id)
        .ok_or_else(|| {
            LedgerError::config(format!("chain {chain_id} is not supported"), None)
        })
}

/// All supported chain IDs, in the canonical order.
#[must_use]
pub fn supported_chain_ids() -> Vec<u64> {
    SUPPORTED_CHAINS.iter().map(|c| c.chain_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_chain() {
        let info = lookup(1).expect("mainnet is supported");
        assert_eq!(info.chain_id, 1);
        assert_eq!(info.position_manager, "0xc36442b4a4522e871399cd717abdd847ab11fe88");
    }

    #[test]
    fn lookup_unknown_chain_fails() {
        let err = lookup(999).unwrap_err();
        assert!(matches!(err, LedgerError::ConfigurationError { .. }));
    }

    #[test]
    fn canonical_chain_set_is_stable() {
        let mut ids = supported_chain_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 10, 137, 8453, 42161]);
    }
}
