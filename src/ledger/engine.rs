//! The ledger state machine.
//!
//! Folds raw, decoded position events into the canonical, append-only
//! ledger chain, tracking liquidity, cost basis, realized PnL, and
//! uncollected principal across the position's lifetime.

use super::entry::{
    parse_i256, EntryConfig, EntryState, EventType, InputHash, LedgerEntry, Protocol, Reward,
};
use super::price_resolver;
use crate::db::models::{parse_u256, LedgerEntryRow};
use crate::db::repository::{NewLedgerEntry, Repository};
use crate::error::{LedgerError, LedgerResult};
use crate::explorer::decode::{RawEventKind, RawPositionEvent};
use crate::explorer::ExplorerClient;
use crate::math::parse_address;
use crate::pricing::{self, PoolPriceSample};
use crate::rpc::Provider;
use alloy::primitives::{I256, U256};
use tracing::{info, instrument};

/// Running financial state folded across a position's ledger chain.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FoldState {
    liquidity: U256,
    cost_basis: I256,
    pnl: I256,
    uncollected_principal0: U256,
    uncollected_principal1: U256,
}

impl Default for FoldState {
    fn default() -> Self {
        Self {
            liquidity: U256::ZERO,
            cost_basis: I256::ZERO,
            pnl: I256::ZERO,
            uncollected_principal0: U256::ZERO,
            uncollected_principal1: U256::ZERO,
        }
    }
}

impl FoldState {
    /// Reconstruct the folded state following a previously persisted entry,
    /// for incremental (`discoverEvent`) appends.
    fn from_last_row(row: &LedgerEntryRow) -> LedgerResult<Self> {
        let config: EntryConfig = serde_json::from_str(&row.config)
            .map_err(|e| LedgerError::decode(format!("malformed config JSON: {e}")))?;
        Ok(Self {
            liquidity: parse_u256("liquidity_after", &config.liquidity_after)?,
            cost_basis: parse_i256("cost_basis_after", &row.cost_basis_after)?,
            pnl: parse_i256("pnl_after", &row.pnl_after)?,
            uncollected_principal0: parse_u256(
                "uncollected_principal0_after",
                &config.uncollected_principal0_after,
            )?,
            uncollected_principal1: parse_u256(
                "uncollected_principal1_after",
                &config.uncollected_principal1_after,
            )?,
        })
    }
}

/// One event, folded into its ledger-entry fields plus the resulting state.
struct FoldedEvent {
    event_type: EventType,
    pool_price: U256,
    token0_amount: U256,
    token1_amount: U256,
    token_value: U256,
    rewards: Vec<Reward>,
    delta_cost_basis: I256,
    cost_basis_after: I256,
    delta_pnl: I256,
    pnl_after: I256,
    config: EntryConfig,
    state: EntryState,
    next_state: FoldState,
}

fn i256_from_u256(value: U256) -> LedgerResult<I256> {
    I256::try_from(value).map_err(|_| LedgerError::invariant("unsigned value exceeds I256's positive range"))
}

#[allow(clippy::too_many_arguments)]
fn fold_event(
    prev: &FoldState,
    raw: &RawPositionEvent,
    sample: &PoolPriceSample,
    chain_id: u64,
    dec0: u8,
    dec1: u8,
    is_token0_quote: bool,
) -> LedgerResult<FoldedEvent> {
    let price = pricing::sqrt_price_to_quote_price(sample.sqrt_price_x96, dec0, dec1, is_token0_quote)?;

    let base_config = |delta_l: String,
                        liquidity_after: U256,
                        fees0: U256,
                        fees1: U256,
                        principal0_after: U256,
                        principal1_after: U256| EntryConfig {
        chain_id,
        nft_id: raw.token_id.to_string(),
        block_number: raw.block_number,
        tx_index: raw.transaction_index,
        log_index: raw.log_index,
        tx_hash: raw.transaction_hash.clone(),
        delta_l,
        liquidity_after: liquidity_after.to_string(),
        fees_collected0: fees0.to_string(),
        fees_collected1: fees1.to_string(),
        uncollected_principal0_after: principal0_after.to_string(),
        uncollected_principal1_after: principal1_after.to_string(),
        sqrt_price_x96: sample.sqrt_price_x96.to_string(),
    };

    match raw.kind {
        RawEventKind::IncreaseLiquidity => {
            let delta_l = U256::from(
                raw.liquidity
                    .ok_or_else(|| LedgerError::decode("INCREASE_LIQUIDITY log missing liquidity field"))?,
            );
            let liquidity_after = prev.liquidity + delta_l;
            let token_value = pricing::value_in_quote(raw.amount0, raw.amount1, price, dec0, dec1, is_token0_quote)?;
            let delta_cost_basis = i256_from_u256(token_value)?;
            let cost_basis_after = prev.cost_basis + delta_cost_basis;

            Ok(FoldedEvent {
                event_type: EventType::IncreasePosition,
                pool_price: price,
                token0_amount: raw.amount0,
                token1_amount: raw.amount1,
                token_value,
                rewards: Vec::new(),
                delta_cost_basis,
                cost_basis_after,
                delta_pnl: I256::ZERO,
                pnl_after: prev.pnl,
                config: base_config(
                    delta_l.to_string(),
                    liquidity_after,
                    U256::ZERO,
                    U256::ZERO,
                    prev.uncollected_principal0,
                    prev.uncollected_principal1,
                ),
                state: EntryState::IncreaseLiquidity {
                    liquidity: delta_l.to_string(),
                    amount0: raw.amount0.to_string(),
                    amount1: raw.amount1.to_string(),
                },
                next_state: FoldState {
                    liquidity: liquidity_after,
                    cost_basis: cost_basis_after,
                    pnl: prev.pnl,
                    uncollected_principal0: prev.uncollected_principal0,
                    uncollected_principal1: prev.uncollected_principal1,
                },
            })
        }
        RawEventKind::DecreaseLiquidity => {
            let delta_l = U256::from(
                raw.liquidity
                    .ok_or_else(|| LedgerError::decode("DECREASE_LIQUIDITY log missing liquidity field"))?,
            );
            if prev.liquidity.is_zero() {
                return Err(LedgerError::invariant(
                    "DECREASE_LIQUIDITY folded with no prior liquidity in the position",
                ));
            }
            let liquidity_after = prev.liquidity.checked_sub(delta_l).ok_or_else(|| {
                LedgerError::invariant("DECREASE_LIQUIDITY removes more liquidity than the position holds")
            })?;

            let delta_l_signed = i256_from_u256(delta_l)?;
            let prev_liquidity_signed = i256_from_u256(prev.liquidity)?;
            let proportional_cost = prev
                .cost_basis
                .checked_mul(delta_l_signed)
                .ok_or_else(|| LedgerError::invariant("costBasis * deltaL overflowed during proportional removal"))?
                .checked_div(prev_liquidity_signed)
                .ok_or_else(|| LedgerError::invariant("division by zero prior liquidity"))?;

            let delta_cost_basis = -proportional_cost;
            let cost_basis_after = prev.cost_basis + delta_cost_basis;

            let token_value = pricing::value_in_quote(raw.amount0, raw.amount1, price, dec0, dec1, is_token0_quote)?;
            let delta_pnl = i256_from_u256(token_value)? - proportional_cost;
            let pnl_after = prev.pnl + delta_pnl;

            let uncollected_principal0_after = prev.uncollected_principal0 + raw.amount0;
            let uncollected_principal1_after = prev.uncollected_principal1 + raw.amount1;

            Ok(FoldedEvent {
                event_type: EventType::DecreasePosition,
                pool_price: price,
                token0_amount: raw.amount0,
                token1_amount: raw.amount1,
                token_value,
                rewards: Vec::new(),
                delta_cost_basis,
                cost_basis_after,
                delta_pnl,
                pnl_after,
                config: base_config(
                    format!("-{delta_l}"),
                    liquidity_after,
                    U256::ZERO,
                    U256::ZERO,
                    uncollected_principal0_after,
                    uncollected_principal1_after,
                ),
                state: EntryState::DecreaseLiquidity {
                    liquidity: delta_l.to_string(),
                    amount0: raw.amount0.to_string(),
                    amount1: raw.amount1.to_string(),
                },
                next_state: FoldState {
                    liquidity: liquidity_after,
                    cost_basis: cost_basis_after,
                    pnl: pnl_after,
                    uncollected_principal0: uncollected_principal0_after,
                    uncollected_principal1: uncollected_principal1_after,
                },
            })
        }
        RawEventKind::Collect => {
            let principal_consumed0 = raw.amount0.min(prev.uncollected_principal0);
            let fee0 = raw.amount0 - principal_consumed0;
            let principal_consumed1 = raw.amount1.min(prev.uncollected_principal1);
            let fee1 = raw.amount1 - principal_consumed1;

            let uncollected_principal0_after = prev.uncollected_principal0 - principal_consumed0;
            let uncollected_principal1_after = prev.uncollected_principal1 - principal_consumed1;

            let token_value = pricing::value_in_quote(raw.amount0, raw.amount1, price, dec0, dec1, is_token0_quote)?;

            let mut rewards = Vec::new();
            if !fee0.is_zero() {
                let value0 = pricing::value_in_quote(fee0, U256::ZERO, price, dec0, dec1, is_token0_quote)?;
                rewards.push(Reward {
                    token_index: 0,
                    token_amount: fee0.to_string(),
                    token_value: value0.to_string(),
                });
            }
            if !fee1.is_zero() {
                let value1 = pricing::value_in_quote(U256::ZERO, fee1, price, dec0, dec1, is_token0_quote)?;
                rewards.push(Reward {
                    token_index: 1,
                    token_amount: fee1.to_string(),
                    token_value: value1.to_string(),
                });
            }

            let recipient = raw
                .recipient
                .map(|a| crate::math::checksum_address(&a.to_string()).unwrap_or_else(|| a.to_string()));

            Ok(FoldedEvent {
                event_type: EventType::Collect,
                pool_price: price,
                token0_amount: raw.amount0,
                token1_amount: raw.amount1,
                token_value,
                rewards,
                delta_cost_basis: I256::ZERO,
                cost_basis_after: prev.cost_basis,
                delta_pnl: I256::ZERO,
                pnl_after: prev.pnl,
                config: base_config(
                    "0".to_string(),
                    prev.liquidity,
                    fee0,
                    fee1,
                    uncollected_principal0_after,
                    uncollected_principal1_after,
                ),
                state: EntryState::Collect {
                    recipient,
                    amount0: raw.amount0.to_string(),
                    amount1: raw.amount1.to_string(),
                },
                next_state: FoldState {
                    liquidity: prev.liquidity,
                    cost_basis: prev.cost_basis,
                    pnl: prev.pnl,
                    uncollected_principal0: uncollected_principal0_after,
                    uncollected_principal1: uncollected_principal1_after,
                },
            })
        }
    }
}

/// Maintains the canonical ledger for concentrated-liquidity positions.
pub struct LedgerEngine {
    repo: Repository,
    explorer: ExplorerClient,
    provider: Provider,
}

impl LedgerEngine {
    /// Construct an engine over its collaborators.
    #[must_use]
    pub fn new(repo: Repository, explorer: ExplorerClient, provider: Provider) -> Self {
        Self { repo, explorer, provider }
    }

    async fn pool_and_tokens(
        &self,
        pool_id: i64,
    ) -> LedgerResult<(crate::db::models::PoolRow, u8, u8)> {
        let pool = self.repo.get_pool(pool_id).await?;
        Protocol::parse(&pool.protocol)?;
        let token0 = self.repo.get_token(pool.token0_id).await?;
        let token1 = self.repo.get_token(pool.token1_id).await?;
        let dec0 = u8::try_from(token0.decimals)
            .map_err(|e| LedgerError::decode(format!("token0 decimals out of range: {e}")))?;
        let dec1 = u8::try_from(token1.decimals)
            .map_err(|e| LedgerError::decode(format!("token1 decimals out of range: {e}")))?;
        Ok((pool, dec0, dec1))
    }

    async fn persist_fold(
        &self,
        position_id: i64,
        previous_id: Option<i64>,
        raw: &RawPositionEvent,
        folded: &FoldedEvent,
    ) -> LedgerResult<LedgerEntryRow> {
        let input_hash = InputHash::compute(raw.block_number, raw.transaction_index, raw.log_index).to_string();
        let rewards_json = serde_json::to_string(&folded.rewards)
            .map_err(|e| LedgerError::decode(format!("failed to serialize rewards: {e}")))?;
        let config_json = serde_json::to_string(&folded.config)
            .map_err(|e| LedgerError::decode(format!("failed to serialize config: {e}")))?;
        let state_json = serde_json::to_string(&folded.state)
            .map_err(|e| LedgerError::decode(format!("failed to serialize state: {e}")))?;

        self.repo
            .insert_ledger_entry(&NewLedgerEntry {
                position_id,
                protocol: Protocol::UniswapV3.as_str(),
                previous_id,
                timestamp: raw.timestamp,
                event_type: folded.event_type.as_str(),
                input_hash: &input_hash,
                pool_price: &folded.pool_price.to_string(),
                token0_amount: &folded.token0_amount.to_string(),
                token1_amount: &folded.token1_amount.to_string(),
                token_value: &folded.token_value.to_string(),
                rewards: &rewards_json,
                delta_cost_basis: &folded.delta_cost_basis.to_string(),
                cost_basis_after: &folded.cost_basis_after.to_string(),
                delta_pnl: &folded.delta_pnl.to_string(),
                pnl_after: &folded.pnl_after.to_string(),
                config: &config_json,
                state: &state_json,
            })
            .await
    }

    /// Authoritative rebuild: deletes any existing ledger entries for the
    /// position, refetches its entire on-chain history, and recomputes from
    /// empty state. Idempotent with respect to the chain's history.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the position is unknown, or any
    /// explorer/RPC/persistence error encountered while rebuilding.
    #[instrument(skip(self))]
    pub async fn discover_all_events(&self, position_id: i64) -> LedgerResult<Vec<LedgerEntry>> {
        let position = self.repo.get_position(position_id).await?;
        let (pool, dec0, dec1) = self.pool_and_tokens(position.pool_id).await?;
        let pool_address = parse_address(&pool.address)
            .ok_or_else(|| LedgerError::decode(format!("malformed pool address '{}'", pool.address)))?;
        let chain_id = u64::try_from(position.chain_id)
            .map_err(|e| LedgerError::invariant(format!("chain_id out of range: {e}")))?;
        let nft_id = position.nft_id_u256()?;

        self.repo.delete_ledger_entries(position_id).await?;

        let mut raw_events = self.explorer.fetch_position_events(chain_id, nft_id, None, None).await?;
        if raw_events.is_empty() {
            info!(position_id, "no on-chain events found, ledger is empty");
            return Ok(Vec::new());
        }
        raw_events.sort_by_key(|e| (e.block_number, e.transaction_index, e.log_index));

        let mut state = FoldState::default();
        let mut previous_id: Option<i64> = None;
        for raw in &raw_events {
            let sample = price_resolver::resolve(&self.repo, &self.provider, pool.id, pool_address, raw.block_number)
                .await?;
            let folded = fold_event(&state, raw, &sample, chain_id, dec0, dec1, position.is_token0_quote)?;
            let row = self.persist_fold(position_id, previous_id, raw, &folded).await?;
            previous_id = Some(row.id);
            state = folded.next_state;
        }

        info!(position_id, events = raw_events.len(), "rebuilt ledger");
        self.repo
            .ledger_entries_descending(position_id)
            .await?
            .into_iter()
            .map(LedgerEntry::from_row)
            .collect()
    }

    /// Incremental append: validates monotonic timestamp and matching NFT
    /// identity, folds one event onto the current chain tip, and returns the
    /// full resulting chain.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvariantViolated`] if `raw.token_id` does not
    /// match the position, or if `raw.timestamp` does not strictly exceed
    /// the last entry's timestamp.
    #[instrument(skip(self, raw))]
    pub async fn discover_event(&self, position_id: i64, raw: RawPositionEvent) -> LedgerResult<Vec<LedgerEntry>> {
        let position = self.repo.get_position(position_id).await?;
        let nft_id = position.nft_id_u256()?;
        if raw.token_id != nft_id {
            return Err(LedgerError::invariant(format!(
                "event tokenId {} does not match position nftId {nft_id}",
                raw.token_id
            )));
        }

        let last_row = self.repo.last_ledger_entry(position_id).await?;
        if let Some(last) = &last_row {
            if raw.timestamp <= last.timestamp {
                return Err(LedgerError::invariant(
                    "appended event's timestamp must be strictly greater than the last entry's",
                ));
            }
        }

        let (pool, dec0, dec1) = self.pool_and_tokens(position.pool_id).await?;
        let pool_address = parse_address(&pool.address)
            .ok_or_else(|| LedgerError::decode(format!("malformed pool address '{}'", pool.address)))?;
        let chain_id = u64::try_from(position.chain_id)
            .map_err(|e| LedgerError::invariant(format!("chain_id out of range: {e}")))?;

        let state = match &last_row {
            Some(row) => FoldState::from_last_row(row)?,
            None => FoldState::default(),
        };

        let sample =
            price_resolver::resolve(&self.repo, &self.provider, pool.id, pool_address, raw.block_number).await?;
        let folded = fold_event(&state, &raw, &sample, chain_id, dec0, dec1, position.is_token0_quote)?;
        let previous_id = last_row.map(|r| r.id);
        self.persist_fold(position_id, previous_id, &raw, &folded).await?;

        self.repo
            .ledger_entries_descending(position_id)
            .await?
            .into_iter()
            .map(LedgerEntry::from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    fn one_to_one_sqrt_price() -> U256 {
        U256::from(1u8) << 96
    }

    fn sample(block_number: u64) -> PoolPriceSample {
        PoolPriceSample {
            pool_id: 1,
            block_number,
            sqrt_price_x96: one_to_one_sqrt_price(),
            timestamp: 1_700_000_000 + i64::try_from(block_number).unwrap(),
        }
    }

    fn increase(amount0: u64, amount1: u64, liquidity: u128, block_number: u64) -> RawPositionEvent {
        RawPositionEvent {
            kind: RawEventKind::IncreaseLiquidity,
            token_id: U256::from(1u64),
            block_number,
            transaction_index: 0,
            log_index: 0,
            transaction_hash: format!("0x{block_number:064x}"),
            timestamp: 1_700_000_000 + i64::try_from(block_number).unwrap(),
            liquidity: Some(liquidity),
            amount0: U256::from(amount0),
            amount1: U256::from(amount1),
            recipient: None,
        }
    }

    fn decrease(amount0: u64, amount1: u64, liquidity: u128, block_number: u64) -> RawPositionEvent {
        RawPositionEvent {
            kind: RawEventKind::DecreaseLiquidity,
            liquidity: Some(liquidity),
            ..increase(amount0, amount1, 0, block_number)
        }
    }

    fn collect(amount0: u64, amount1: u64, block_number: u64) -> RawPositionEvent {
        RawPositionEvent {
            kind: RawEventKind::Collect,
            liquidity: None,
            recipient: Some(Address::ZERO),
            ..increase(amount0, amount1, 0, block_number)
        }
    }

    // dec0 = 18, dec1 = 6, is_token0_quote = false, one-to-one sqrtPrice ->
    // derived price collapses to 10^dec0, making valueInQuote(a0, a1) = a0 + a1.
    const DEC0: u8 = 18;
    const DEC1: u8 = 6;

    #[test]
    fn full_lifecycle_matches_hand_derivation() {
        let mut state = FoldState::default();

        let raw1 = increase(500, 1000, 1000, 100);
        let f1 = fold_event(&state, &raw1, &sample(100), 1, DEC0, DEC1, false).unwrap();
        assert_eq!(f1.token_value, U256::from(1500u64));
        assert_eq!(f1.cost_basis_after, I256::try_from(1500).unwrap());
        assert_eq!(f1.pnl_after, I256::ZERO);
        state = f1.next_state.clone();
        assert_eq!(state.liquidity, U256::from(1000u64));

        let raw2 = decrease(200, 400, 400, 200);
        let f2 = fold_event(&state, &raw2, &sample(200), 1, DEC0, DEC1, false).unwrap();
        // proportionalCost = 1500 * 400 / 1000 = 600
        assert_eq!(f2.delta_cost_basis, I256::try_from(-600).unwrap());
        assert_eq!(f2.cost_basis_after, I256::try_from(900).unwrap());
        assert_eq!(f2.token_value, U256::from(600u64));
        assert_eq!(f2.delta_pnl, I256::ZERO);
        state = f2.next_state.clone();
        assert_eq!(state.liquidity, U256::from(600u64));
        assert_eq!(state.uncollected_principal0, U256::from(200u64));
        assert_eq!(state.uncollected_principal1, U256::from(400u64));

        let raw3 = collect(250, 450, 300);
        let f3 = fold_event(&state, &raw3, &sample(300), 1, DEC0, DEC1, false).unwrap();
        assert_eq!(f3.cost_basis_after, I256::try_from(900).unwrap());
        assert_eq!(f3.pnl_after, I256::ZERO);
        assert_eq!(f3.rewards.len(), 2);
        assert_eq!(f3.rewards[0].token_amount, "50");
        assert_eq!(f3.rewards[1].token_amount, "50");
        let state = f3.next_state;
        assert_eq!(state.uncollected_principal0, U256::ZERO);
        assert_eq!(state.uncollected_principal1, U256::ZERO);
    }

    #[test]
    fn decrease_without_prior_liquidity_is_invariant_violation() {
        let state = FoldState::default();
        let raw = decrease(100, 100, 100, 50);
        let err = fold_event(&state, &raw, &sample(50), 1, DEC0, DEC1, false).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolated { .. }));
    }

    #[test]
    fn decrease_more_than_held_liquidity_is_invariant_violation() {
        let state = FoldState::default();
        let f1 = fold_event(&state, &increase(100, 100, 100, 1), &sample(1), 1, DEC0, DEC1, false).unwrap();
        let state = f1.next_state;
        let raw = decrease(1, 1, 500, 2);
        let err = fold_event(&state, &raw, &sample(2), 1, DEC0, DEC1, false).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolated { .. }));
    }

    #[test]
    fn collect_without_prior_decrease_is_all_fee() {
        let state = FoldState::default();
        let raw = collect(0, 100, 10);
        let folded = fold_event(&state, &raw, &sample(10), 1, DEC0, DEC1, false).unwrap();
        assert_eq!(folded.rewards.len(), 1);
        assert_eq!(folded.rewards[0].token_index, 1);
        assert_eq!(folded.rewards[0].token_amount, "100");
    }
}
