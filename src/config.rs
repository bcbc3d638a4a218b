//! Configuration management for the ledger-reconstruction core.
//!
//! This module handles loading and validating configuration from environment
//! variables using the `dotenvy` crate. All operations return
//! [`LedgerResult`] for comprehensive error handling.
//!
//! ## Environment Variables
//!
//! Required:
//! - `ETHERSCAN_API_KEY`: API key for the unified block-explorer endpoint
//! - `RPC_URL`: HTTP endpoint for the archive-capable node used for historic
//!   `slot0()`/block-timestamp reads
//!
//! Optional (with defaults):
//! - `DATABASE_URL` (default: `"sqlite://./ledger.db"`)
//! - `SCHEDULER_MIN_SPACING_MS_EXPLORER` (default: 220)
//! - `SCHEDULER_MIN_SPACING_MS_MARKET` (default: 2200)
//! - `SCHEDULER_MIN_SPACING_MS_RPC` (default: 220)
//! - `CACHE_TTL_TOKEN_CATALOG` (default: 3600 seconds)
//! - `CACHE_TTL_CONTRACT_CREATION` (default: 31536000 seconds)
//! - `RETRY_MAX_ATTEMPTS` (default: 6)
//! - `RETRY_BASE_DELAY_MS` (default: 800)
//! - `RETRY_MAX_DELAY_MS` (default: 8000)
//!
//! ## Example
//!
//! ```no_run
//! use clp_ledger::config::Config;
//! use clp_ledger::error::LedgerResult;
//!
//! # fn main() -> LedgerResult<()> {
//! let config = Config::from_env()?;
//! println!("Database URL: {}", config.database_url());
//! # Ok(())
//! # }
//! ```

use crate::error::{LedgerError, LedgerResult};
use std::env;
use std::time::Duration;

/// Main configuration struct for the ledger core.
///
/// Contains all runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    etherscan_api_key: String,
    rpc_url: String,
    database_url: String,
    scheduler_min_spacing_explorer: Duration,
    scheduler_min_spacing_market: Duration,
    scheduler_min_spacing_rpc: Duration,
    cache_ttl_token_catalog: Duration,
    cache_ttl_contract_creation: Duration,
    retry_max_attempts: u32,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `ETHERSCAN_API_KEY` is absent/empty, or if a
    /// numeric environment variable fails to parse.
    pub fn from_env() -> LedgerResult<Self> {
        dotenvy::dotenv().ok();

        let etherscan_api_key = env::var("ETHERSCAN_API_KEY").map_err(|e| {
            LedgerError::config(
                "ETHERSCAN_API_KEY environment variable is required",
                Some(Box::new(e)),
            )
        })?;

        if etherscan_api_key.is_empty() {
            return Err(LedgerError::config(
                "ETHERSCAN_API_KEY must be a non-empty API key",
                None,
            ));
        }

        let rpc_url = env::var("RPC_URL").map_err(|e| {
            LedgerError::config("RPC_URL environment variable is required", Some(Box::new(e)))
        })?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./ledger.db".to_string());

        let scheduler_min_spacing_explorer =
            Duration::from_millis(parse_env_u64("SCHEDULER_MIN_SPACING_MS_EXPLORER", 220)?);
        let scheduler_min_spacing_market =
            Duration::from_millis(parse_env_u64("SCHEDULER_MIN_SPACING_MS_MARKET", 2200)?);
        let scheduler_min_spacing_rpc =
            Duration::from_millis(parse_env_u64("SCHEDULER_MIN_SPACING_MS_RPC", 220)?);

        let cache_ttl_token_catalog =
            Duration::from_secs(parse_env_u64("CACHE_TTL_TOKEN_CATALOG", 3600)?);
        let cache_ttl_contract_creation =
            Duration::from_secs(parse_env_u64("CACHE_TTL_CONTRACT_CREATION", 31_536_000)?);

        let retry_max_attempts = u32::try_from(parse_env_u64("RETRY_MAX_ATTEMPTS", 6)?)
            .map_err(|e| LedgerError::config("RETRY_MAX_ATTEMPTS out of range", Some(Box::new(e))))?;
        let retry_base_delay = Duration::from_millis(parse_env_u64("RETRY_BASE_DELAY_MS", 800)?);
        let retry_max_delay = Duration::from_millis(parse_env_u64("RETRY_MAX_DELAY_MS", 8000)?);

        Ok(Self {
            etherscan_api_key,
            rpc_url,
            database_url,
            scheduler_min_spacing_explorer,
            scheduler_min_spacing_market,
            scheduler_min_spacing_rpc,
            cache_ttl_token_catalog,
            cache_ttl_contract_creation,
            retry_max_attempts,
            retry_base_delay,
            retry_max_delay,
        })
    }

    /// The block-explorer API key.
    #[must_use]
    pub fn etherscan_api_key(&self) -> &str {
        &self.etherscan_api_key
    }

    /// The sqlite database URL used for ledger persistence and the cache table.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// The archive-capable RPC endpoint used for historic `slot0()`/block reads.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Minimum spacing between successive explorer calls.
    #[must_use]
    pub const fn scheduler_min_spacing_explorer(&self) -> Duration {
        self.scheduler_min_spacing_explorer
    }

    /// Minimum spacing between successive market-data calls.
    #[must_use]
    pub const fn scheduler_min_spacing_market(&self) -> Duration {
        self.scheduler_min_spacing_market
    }

    /// Minimum spacing between successive RPC calls.
    #[must_use]
    pub const fn scheduler_min_spacing_rpc(&self) -> Duration {
        self.scheduler_min_spacing_rpc
    }

    /// TTL for the full token-catalogue cache entry.
    #[must_use]
    pub const fn cache_ttl_token_catalog(&self) -> Duration {
        self.cache_ttl_token_catalog
    }

    /// TTL for contract-deployment-block cache entries.
    #[must_use]
    pub const fn cache_ttl_contract_creation(&self) -> Duration {
        self.cache_ttl_contract_creation
    }

    /// Maximum retry attempts for the retry wrapper.
    #[must_use]
    pub const fn retry_max_attempts(&self) -> u32 {
        self.retry_max_attempts
    }

    /// Base delay for exponential backoff.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    /// Maximum delay for exponential backoff.
    #[must_use]
    pub const fn retry_max_delay(&self) -> Duration {
        self.retry_max_delay
    }
}

fn parse_env_u64(key: &str, default: u64) -> LedgerResult<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| LedgerError::config(format!("{key} must be a valid number"), Some(Box::new(e)))),
        Err(_) => Ok(default),
    }
}
