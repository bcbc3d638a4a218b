//! Unified cross-chain block-explorer HTTP JSON client.
//!
//! Fetches raw event logs, a contract's deployment block (cached
//! permanently), and the block number closest to a Unix timestamp, then
//! composes all three into [`ExplorerClient::fetch_position_events`].

pub mod decode;
pub mod types;

use crate::cache::Cache;
use crate::chain;
use crate::error::{LedgerError, LedgerResult};
use crate::retry::{self, RetryConfig};
use crate::scheduler::Scheduler;
use alloy::primitives::{Address, U256};
use decode::{decode_log, RawEventKind, RawPositionEvent};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use types::{Closest, ContractCreationRow, Envelope, RawLogRow};

const DEFAULT_BASE_URL: &str = "https://api.etherscan.io/v2/api";
const USER_AGENT: &str = concat!("clp-ledger/", env!("CARGO_PKG_VERSION"));

/// Client for the unified, chain-id-parameterized block-explorer REST API.
pub struct ExplorerClient {
    http: reqwest::Client,
    scheduler: Scheduler,
    retry_config: RetryConfig,
    cache: Cache,
    api_key: String,
    base_url: String,
    cache_ttl_contract_creation: Duration,
}

impl ExplorerClient {
    /// Construct a client.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConfigurationError`] if `api_key` is empty.
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        cache: Cache,
        min_spacing: Duration,
        retry_config: RetryConfig,
        cache_ttl_contract_creation: Duration,
    ) -> LedgerResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LedgerError::config(
                "explorer API key must not be empty",
                None,
            ));
        }
        Ok(Self {
            http,
            scheduler: Scheduler::new(min_spacing),
            retry_config,
            cache,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl_contract_creation,
        })
    }

    /// Override the base URL (used in tests against a local server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call(&self, mut params: Vec<(String, String)>) -> LedgerResult<Envelope<serde_json::Value>> {
        params.push(("apikey".to_string(), self.api_key.clone()));
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let retry_config = self.retry_config;

        let response = self
            .scheduler
            .schedule(|| async move {
                retry::with_retry(&retry_config, || {
                    let http = http.clone();
                    let base_url = base_url.clone();
                    let params = params.clone();
                    async move {
                        http.get(&base_url)
                            .query(&params)
                            .header(reqwest::header::USER_AGENT, USER_AGENT)
                            .send()
                            .await
                    }
                })
                .await
            })
            .await
            .map_err(|e| LedgerError::transient("explorer request failed", Some(Box::new(e))))?;

        if !response.is_success() {
            warn!(status = %response.status, "explorer returned non-retryable HTTP error");
            return Err(LedgerError::explorer_api(
                format!("HTTP {}", response.status),
                Some(response.status.as_u16()),
            ));
        }

        let envelope: Envelope<serde_json::Value> = serde_json::from_str(&response.body)
            .map_err(|e| LedgerError::decode(format!("invalid JSON body: {e}")))?;

        if envelope.status == "1" || envelope.message.eq_ignore_ascii_case("No records found") {
            Ok(envelope)
        } else {
            Err(LedgerError::explorer_api(format!("explorer error: {}", envelope.message), None))
        }
    }

    /// Fetch raw logs for one event signature (and optional tokenId topic).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ExplorerApiError`] or
    /// [`LedgerError::TransientProviderError`] on failure.
    pub async fn fetch_logs(
        &self,
        chain_id: u64,
        contract_address: &str,
        from_block: u64,
        to_block: Option<u64>,
        topic0: &str,
        topic1: Option<&str>,
    ) -> LedgerResult<Vec<RawLogRow>> {
        let mut params = vec![
            ("chainid".to_string(), chain_id.to_string()),
            ("module".to_string(), "logs".to_string()),
            ("action".to_string(), "getLogs".to_string()),
            ("address".to_string(), contract_address.to_string()),
            ("fromBlock".to_string(), from_block.to_string()),
            (
                "toBlock".to_string(),
                to_block.map_or_else(|| "latest".to_string(), |b| b.to_string()),
            ),
            ("topic0".to_string(), topic0.to_string()),
        ];
        if let Some(t1) = topic1 {
            params.push(("topic1".to_string(), t1.to_string()));
            params.push(("topic0_1_opr".to_string(), "and".to_string()));
        }

        let envelope = self.call(params).await?;
        let rows: Vec<RawLogRow> = serde_json::from_value(envelope.result)
            .map_err(|e| LedgerError::decode(format!("malformed getLogs result: {e}")))?;
        Ok(rows)
    }

    /// Resolve a contract's deployment block, permanently cached.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the explorer has no creation
    /// record for the contract, or a transport/decode error otherwise.
    pub async fn get_contract_creation_block(
        &self,
        chain_id: u64,
        contract_address: &str,
    ) -> LedgerResult<u64> {
        let address_lower = contract_address.to_lowercase();
        let key = crate::cache::key_contract_creation(chain_id, &address_lower);

        if let Some(cached) = self.cache.get(&key).await? {
            return cached
                .parse()
                .map_err(|e| LedgerError::decode(format!("corrupt cached creation block: {e}")));
        }

        let params = vec![
            ("chainid".to_string(), chain_id.to_string()),
            ("module".to_string(), "contract".to_string()),
            ("action".to_string(), "getcontractcreation".to_string()),
            ("contractaddresses".to_string(), address_lower.clone()),
        ];
        let envelope = self.call(params).await?;
        let rows: Vec<ContractCreationRow> = serde_json::from_value(envelope.result)
            .map_err(|e| LedgerError::decode(format!("malformed getcontractcreation result: {e}")))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::not_found(format!("no creation record for {address_lower}")))?;
        let block_number: u64 = row
            .block_number
            .ok_or_else(|| LedgerError::not_found("creation record missing blockNumber"))?
            .parse()
            .map_err(|e| LedgerError::decode(format!("malformed creation blockNumber: {e}")))?;

        self.cache
            .set(&key, &block_number.to_string(), self.cache_ttl_contract_creation)
            .await?;

        Ok(block_number)
    }

    /// Resolve the block number closest to a Unix timestamp.
    ///
    /// # Errors
    ///
    /// Returns a decode/explorer error on failure.
    pub async fn get_block_number_for_timestamp(
        &self,
        chain_id: u64,
        timestamp: i64,
        closest: Closest,
    ) -> LedgerResult<u64> {
        let params = vec![
            ("chainid".to_string(), chain_id.to_string()),
            ("module".to_string(), "block".to_string()),
            ("action".to_string(), "getblocknobytime".to_string()),
            ("timestamp".to_string(), timestamp.to_string()),
            ("closest".to_string(), closest.as_query_value().to_string()),
        ];
        let envelope = self.call(params).await?;
        let result = envelope
            .result
            .as_str()
            .ok_or_else(|| LedgerError::decode("getblocknobytime result is not a string"))?;
        result
            .parse()
            .map_err(|e| LedgerError::decode(format!("malformed block number: {e}")))
    }

    /// Fetch, decode, deduplicate and sort every position event for one NFT
    /// position, across all three event kinds.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConfigurationError`] for an unsupported chain,
    /// and any error [`Self::fetch_logs`] or [`decode_log`] can produce.
    pub async fn fetch_position_events(
        &self,
        chain_id: u64,
        nft_id: U256,
        from_block: Option<u64>,
        to_block: Option<u64>,
    ) -> LedgerResult<Vec<RawPositionEvent>> {
        let info = chain::lookup(chain_id)?;

        let from_block = match from_block {
            Some(b) => b,
            None => {
                self.get_contract_creation_block(info.explorer_chain_id, info.position_manager)
                    .await?
            }
        };

        let padded_token_id = format!("0x{:064x}", nft_id);

        let mut by_key: HashMap<(String, u64), RawPositionEvent> = HashMap::new();
        for kind in [
            RawEventKind::IncreaseLiquidity,
            RawEventKind::DecreaseLiquidity,
            RawEventKind::Collect,
        ] {
            let rows = self
                .fetch_logs(
                    chain_id,
                    info.position_manager,
                    from_block,
                    to_block,
                    kind.topic0(),
                    Some(&padded_token_id),
                )
                .await?;
            debug!(count = rows.len(), ?kind, "fetched raw logs");
            for row in rows {
                let event = decode_log(&row, kind)?;
                let dedupe_key = (row.transaction_hash.clone(), event.log_index);
                by_key.entry(dedupe_key).or_insert(event);
            }
        }

        let mut events: Vec<RawPositionEvent> = by_key.into_values().collect();
        events.sort_by_key(|e| (e.block_number, e.transaction_index, e.log_index));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_cache() -> Cache {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE cache_entries (key TEXT PRIMARY KEY, value TEXT NOT NULL, expires_at INTEGER NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        Cache::new(pool)
    }

    #[tokio::test]
    async fn rejects_empty_api_key() {
        let cache = test_cache().await;
        let result = ExplorerClient::new(
            reqwest::Client::new(),
            "",
            cache,
            Duration::from_millis(220),
            RetryConfig::default(),
            Duration::from_secs(31_536_000),
        );
        assert!(result.is_err());
    }

    #[test]
    fn closest_query_values() {
        assert_eq!(Closest::Before.as_query_value(), "before");
        assert_eq!(Closest::After.as_query_value(), "after");
    }
}
