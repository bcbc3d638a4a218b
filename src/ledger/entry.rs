//! The ledger entry's runtime representation: typed mirror of
//! [`crate::db::models::LedgerEntryRow`], with `config`/`state` deserialized
//! out of their JSON sub-documents.

use crate::db::models::{parse_u256, LedgerEntryRow};
use crate::error::{LedgerError, LedgerResult};
use alloy::primitives::{I256, U256};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The concentrated-liquidity protocol family a pool/position belongs to.
///
/// Only one variant exists today; the enum exists so `LedgerEngine`'s
/// dispatch reads as protocol-polymorphic rather than hardcoding a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Uniswap V3 and its NFT-position-manager-compatible forks.
    UniswapV3,
}

impl Protocol {
    /// The column value this protocol persists as.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UniswapV3 => "uniswapv3",
        }
    }

    /// Parse a persisted `protocol` column value.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConfigurationError`] on an unrecognized value.
    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "uniswapv3" => Ok(Self::UniswapV3),
            other => Err(LedgerError::config(format!("unsupported protocol '{other}'"), None)),
        }
    }
}

/// One of the three event kinds a ledger entry can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// `INCREASE_LIQUIDITY` folded into the ledger.
    IncreasePosition,
    /// `DECREASE_LIQUIDITY` folded into the ledger.
    DecreasePosition,
    /// `COLLECT` folded into the ledger.
    Collect,
}

impl EventType {
    /// The column value this event type persists as.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IncreasePosition => "INCREASE_POSITION",
            Self::DecreasePosition => "DECREASE_POSITION",
            Self::Collect => "COLLECT",
        }
    }

    /// Parse a persisted `event_type` column value.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DecodeError`] on an unrecognized value.
    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "INCREASE_POSITION" => Ok(Self::IncreasePosition),
            "DECREASE_POSITION" => Ok(Self::DecreasePosition),
            "COLLECT" => Ok(Self::Collect),
            other => Err(LedgerError::decode(format!("unknown event_type '{other}'"))),
        }
    }
}

/// One fee-accrual reward line emitted by a `COLLECT` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    /// `0` for token0, `1` for token1.
    pub token_index: u8,
    /// The collected fee amount, in that token's smallest units.
    pub token_amount: String,
    /// That amount's value, denominated in the position's quote token.
    pub token_value: String,
}

/// Protocol-specific, chain-event-derived config sub-document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Chain the position lives on.
    pub chain_id: u64,
    /// NFT token ID, decimal string.
    pub nft_id: String,
    /// Block the underlying log was emitted in.
    pub block_number: u64,
    /// Transaction index within the block.
    pub tx_index: u64,
    /// Log index within the block.
    pub log_index: u64,
    /// Originating transaction hash.
    pub tx_hash: String,
    /// Signed liquidity delta (positive for increase, negative for decrease).
    pub delta_l: String,
    /// Total position liquidity after this event.
    pub liquidity_after: String,
    /// Fees realized by this event, token0 (only nonzero for `COLLECT`).
    pub fees_collected0: String,
    /// Fees realized by this event, token1.
    pub fees_collected1: String,
    /// Uncollected principal after this event, token0.
    pub uncollected_principal0_after: String,
    /// Uncollected principal after this event, token1.
    pub uncollected_principal1_after: String,
    /// The pool's `sqrtPriceX96` at this event's block.
    pub sqrt_price_x96: String,
}

/// Protocol-specific state sub-document: a discriminated union over the
/// three underlying on-chain event signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryState {
    /// Raw `IncreaseLiquidity(tokenId, liquidity, amount0, amount1)`.
    IncreaseLiquidity {
        /// Liquidity units added.
        liquidity: String,
        /// token0 deposited.
        amount0: String,
        /// token1 deposited.
        amount1: String,
    },
    /// Raw `DecreaseLiquidity(tokenId, liquidity, amount0, amount1)`.
    DecreaseLiquidity {
        /// Liquidity units removed.
        liquidity: String,
        /// token0 returned to uncollected principal.
        amount0: String,
        /// token1 returned to uncollected principal.
        amount1: String,
    },
    /// Raw `Collect(tokenId, recipient, amount0, amount1)`.
    Collect {
        /// Collect recipient, checksum-cased, when present in the log.
        recipient: Option<String>,
        /// Total token0 withdrawn (principal + fees).
        amount0: String,
        /// Total token1 withdrawn (principal + fees).
        amount1: String,
    },
}

/// The runtime ledger entry, decoded out of its database row.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// Database-assigned identifier.
    pub id: i64,
    /// The position this entry belongs to.
    pub position_id: i64,
    /// Protocol tag.
    pub protocol: String,
    /// Prior entry's row ID, `None` iff first in the chain.
    pub previous_id: Option<i64>,
    /// Block timestamp this event occurred at.
    pub timestamp: i64,
    /// Which underlying event this entry folds.
    pub event_type: EventType,
    /// Global deduplication key.
    pub input_hash: InputHash,
    /// Historic pool price at this event's block.
    pub pool_price: U256,
    /// token0 amount involved in this event.
    pub token0_amount: U256,
    /// token1 amount involved in this event.
    pub token1_amount: U256,
    /// Total quote-denominated value of this event.
    pub token_value: U256,
    /// Fee-accrual rewards realized by this event (nonempty only for `COLLECT`).
    pub rewards: Vec<Reward>,
    /// Signed change in cost basis.
    pub delta_cost_basis: I256,
    /// Cost basis after this event.
    pub cost_basis_after: I256,
    /// Signed change in realized PnL.
    pub delta_pnl: I256,
    /// Realized PnL after this event.
    pub pnl_after: I256,
    /// Protocol-specific config sub-document.
    pub config: EntryConfig,
    /// Protocol-specific state sub-document.
    pub state: EntryState,
}

impl LedgerEntry {
    /// Decode a database row into its runtime representation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DecodeError`] if any decimal-string or JSON
    /// sub-document column is malformed.
    pub fn from_row(row: LedgerEntryRow) -> LedgerResult<Self> {
        let rewards: Vec<Reward> = serde_json::from_str(&row.rewards)
            .map_err(|e| LedgerError::decode(format!("malformed rewards JSON: {e}")))?;
        let config: EntryConfig = serde_json::from_str(&row.config)
            .map_err(|e| LedgerError::decode(format!("malformed config JSON: {e}")))?;
        let state: EntryState = serde_json::from_str(&row.state)
            .map_err(|e| LedgerError::decode(format!("malformed state JSON: {e}")))?;

        Ok(Self {
            id: row.id,
            position_id: row.position_id,
            protocol: row.protocol,
            previous_id: row.previous_id,
            timestamp: row.timestamp,
            event_type: EventType::parse(&row.event_type)?,
            input_hash: row.input_hash.parse()?,
            pool_price: parse_u256("pool_price", &row.pool_price)?,
            token0_amount: parse_u256("token0_amount", &row.token0_amount)?,
            token1_amount: parse_u256("token1_amount", &row.token1_amount)?,
            token_value: parse_u256("token_value", &row.token_value)?,
            rewards,
            delta_cost_basis: parse_i256("delta_cost_basis", &row.delta_cost_basis)?,
            cost_basis_after: parse_i256("cost_basis_after", &row.cost_basis_after)?,
            delta_pnl: parse_i256("delta_pnl", &row.delta_pnl)?,
            pnl_after: parse_i256("pnl_after", &row.pnl_after)?,
            config,
            state,
        })
    }
}

pub(crate) fn parse_i256(field: &str, s: &str) -> LedgerResult<I256> {
    s.parse()
        .map_err(|e| LedgerError::decode(format!("malformed signed decimal-string {field}: '{s}' ({e})")))
}

/// Deterministic, globally-unique deduplication key for one decoded log:
/// lowercase hex MD5 of `"${blockNumber}-${txIndex}-${logIndex}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputHash([u8; 16]);

impl InputHash {
    /// Derive the hash identifying one `(block, tx index, log index)` triple.
    #[must_use]
    pub fn compute(block_number: u64, tx_index: u64, log_index: u64) -> Self {
        let input = format!("{block_number}-{tx_index}-{log_index}");
        let mut hasher = Md5::new();
        hasher.update(input.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for InputHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for InputHash {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| LedgerError::decode(format!("malformed input_hash '{s}': {e}")))?;
        let array: [u8; 16] = bytes
            .try_into()
            .map_err(|_| LedgerError::decode(format!("input_hash '{s}' is not 16 bytes")))?;
        Ok(Self(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_hash_is_deterministic() {
        let a = InputHash::compute(100, 2, 5);
        let b = InputHash::compute(100, 2, 5);
        assert_eq!(a, b);
        assert_eq!(a.to_string().len(), 32);
    }

    #[test]
    fn input_hash_differs_by_component() {
        assert_ne!(InputHash::compute(100, 2, 5), InputHash::compute(100, 2, 6));
        assert_ne!(InputHash::compute(100, 2, 5), InputHash::compute(101, 2, 5));
    }

    #[test]
    fn input_hash_round_trips_through_display_and_parse() {
        let original = InputHash::compute(9, 1, 3);
        let parsed: InputHash = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn input_hash_rejects_malformed_string() {
        assert!("not-hex".parse::<InputHash>().is_err());
        assert!("abcd".parse::<InputHash>().is_err());
    }

    #[test]
    fn event_type_round_trips() {
        for et in [EventType::IncreasePosition, EventType::DecreasePosition, EventType::Collect] {
            assert_eq!(EventType::parse(et.as_str()).unwrap(), et);
        }
    }

    #[test]
    fn event_type_rejects_unknown() {
        assert!(EventType::parse("BOGUS").is_err());
    }
}
