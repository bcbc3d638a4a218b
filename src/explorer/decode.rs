//! Manual decoding of raw position-event logs returned by the block explorer.
//!
//! The explorer hands back opaque hex blobs, not ABI-typed values, so every
//! field here is extracted by hand: split the data payload into 32-byte
//! big-endian chunks, pull the tokenId from `topics[1]`, and interpret the
//! first chunk differently depending on event kind.

use crate::error::{LedgerError, LedgerResult};
use crate::explorer::types::RawLogRow;
use alloy::primitives::{Address, U256};

/// `INCREASE_LIQUIDITY` event signature (topic0).
pub const INCREASE_LIQUIDITY_TOPIC0: &str =
    "0x3067048beee31b25b2f1681f88dac838c8bba36af25bfb2b7cf7473a5847e35f";
/// `DECREASE_LIQUIDITY` event signature (topic0).
pub const DECREASE_LIQUIDITY_TOPIC0: &str =
    "0x26f6a048ee9138f2c0ce266f322cb99228e8d619ae2bff30c67f8dcf9d2377b4";
/// `COLLECT` event signature (topic0).
pub const COLLECT_TOPIC0: &str = "0x40d0efd1a53d60ecbf40971b9daf7dc90178c3aadc7aab1765632738fa8b8f01";

/// Which of the three logged event kinds a raw row decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// `INCREASE_LIQUIDITY(tokenId, liquidity, amount0, amount1)`
    IncreaseLiquidity,
    /// `DECREASE_LIQUIDITY(tokenId, liquidity, amount0, amount1)`
    DecreaseLiquidity,
    /// `COLLECT(tokenId, recipient, amount0, amount1)`
    Collect,
}

impl RawEventKind {
    /// The topic0 signature for this event kind.
    #[must_use]
    pub const fn topic0(self) -> &'static str {
        match self {
            Self::IncreaseLiquidity => INCREASE_LIQUIDITY_TOPIC0,
            Self::DecreaseLiquidity => DECREASE_LIQUIDITY_TOPIC0,
            Self::Collect => COLLECT_TOPIC0,
        }
    }
}

/// A fully decoded, still-raw position event: on-chain ordering metadata plus
/// the event-specific payload, before any ledger semantics are applied.
#[derive(Debug, Clone)]
pub struct RawPositionEvent {
    /// Which event this is.
    pub kind: RawEventKind,
    /// The NFT position's token ID, from `topics[1]`.
    pub token_id: U256,
    /// Block number the event was emitted in.
    pub block_number: u64,
    /// Transaction index within the block.
    pub transaction_index: u64,
    /// Log index within the block.
    pub log_index: u64,
    /// Originating transaction hash, lowercase hex with `0x` prefix.
    pub transaction_hash: String,
    /// Block Unix timestamp.
    pub timestamp: i64,
    /// `liquidity` delta — present for Increase/Decrease, absent for Collect.
    pub liquidity: Option<u128>,
    /// `amount0` from the log payload.
    pub amount0: U256,
    /// `amount1` from the log payload.
    pub amount1: U256,
    /// Collect recipient address — present only for Collect events.
    pub recipient: Option<Address>,
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

fn parse_hex_u64(field: &str, s: &str) -> LedgerResult<u64> {
    u64::from_str_radix(strip_0x(s), 16)
        .map_err(|e| LedgerError::decode(format!("malformed hex {field}: '{s}' ({e})")))
}

fn parse_decimal_or_hex_i64(field: &str, s: &str) -> LedgerResult<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    i64::from_str_radix(strip_0x(s), 16)
        .map_err(|e| LedgerError::decode(format!("malformed {field}: '{s}' ({e})")))
}

/// Split a `0x`-prefixed hex blob into 32-byte (64 hex char) big-endian chunks.
fn chunk_data(data: &str) -> LedgerResult<Vec<[u8; 32]>> {
    let hex = strip_0x(data);
    if hex.len() % 64 != 0 {
        return Err(LedgerError::decode(format!(
            "log data length {} is not a multiple of 64 hex chars",
            hex.len()
        )));
    }
    hex.as_bytes()
        .chunks(64)
        .map(|chunk| {
            let chunk_str = std::str::from_utf8(chunk)
                .map_err(|_| LedgerError::decode("log data chunk is not valid UTF-8"))?;
            let mut bytes = [0u8; 32];
            hex::decode_to_slice(chunk_str, &mut bytes)
                .map_err(|e| LedgerError::decode(format!("malformed log data chunk: {e}")))?;
            Ok(bytes)
        })
        .collect()
}

fn chunk_to_u256(chunk: &[u8; 32]) -> U256 {
    U256::from_be_bytes(*chunk)
}

/// The low 16 bytes of a 32-byte slot, as a `u128` (big-endian).
fn chunk_low_u128(chunk: &[u8; 32]) -> u128 {
    let mut low = [0u8; 16];
    low.copy_from_slice(&chunk[16..32]);
    u128::from_be_bytes(low)
}

/// The low 20 bytes of a 32-byte slot, as an [`Address`].
fn chunk_low_address(chunk: &[u8; 32]) -> Address {
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&chunk[12..32]);
    Address::from(addr)
}

/// Decode one raw log row into a [`RawPositionEvent`] of the given kind.
///
/// # Errors
///
/// Returns [`LedgerError::DecodeError`] if the data payload has fewer than
/// three 32-byte chunks, or `topics[1]` (the tokenId) is absent.
pub fn decode_log(row: &RawLogRow, kind: RawEventKind) -> LedgerResult<RawPositionEvent> {
    let chunks = chunk_data(&row.data)?;
    if chunks.len() < 3 {
        return Err(LedgerError::decode(format!(
            "expected at least 3 data chunks, found {}",
            chunks.len()
        )));
    }

    let token_id_topic = row
        .topics
        .get(1)
        .ok_or_else(|| LedgerError::decode("missing topics[1] (tokenId)"))?;
    let token_id = U256::from_be_bytes(
        {
            let mut bytes = [0u8; 32];
            hex::decode_to_slice(strip_0x(token_id_topic), &mut bytes)
                .map_err(|e| LedgerError::decode(format!("malformed topics[1]: {e}")))?;
            bytes
        },
    );

    let block_number = parse_hex_u64("blockNumber", &row.block_number)?;
    let transaction_index = parse_hex_u64("transactionIndex", &row.transaction_index)?;
    let log_index = parse_hex_u64("logIndex", &row.log_index)?;
    let timestamp = parse_decimal_or_hex_i64("timeStamp", &row.time_stamp)?;

    let (liquidity, amount0, amount1, recipient) = match kind {
        RawEventKind::IncreaseLiquidity | RawEventKind::DecreaseLiquidity => (
            Some(chunk_low_u128(&chunks[0])),
            chunk_to_u256(&chunks[1]),
            chunk_to_u256(&chunks[2]),
            None,
        ),
        RawEventKind::Collect => (
            None,
            chunk_to_u256(&chunks[1]),
            chunk_to_u256(&chunks[2]),
            Some(chunk_low_address(&chunks[0])),
        ),
    };

    Ok(RawPositionEvent {
        kind,
        token_id,
        block_number,
        transaction_index,
        log_index,
        transaction_hash: row.transaction_hash.clone(),
        timestamp,
        liquidity,
        amount0,
        amount1,
        recipient,
    })
}
