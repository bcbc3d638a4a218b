//! Command-line interface for triggering ledger reconstruction.
//!
//! This is an operational surface, not a ledger-consuming UI: it triggers
//! [`LedgerEngine::discover_all_events`]/[`LedgerEngine::discover_event`] and
//! prints the resulting chain as JSON.
//!
//! # Commands
//!
//! - `rebuild`: full authoritative rebuild of one position's ledger
//! - `append`: incrementally fold one externally-supplied event onto the tip
//!
//! # Example
//!
//! ```bash
//! clp-ledger rebuild --position 1
//! clp-ledger append --position 1 --event ./collect.json
//! ```

use crate::config::Config;
use crate::db::{create_pool, repository::Repository};
use crate::error::{LedgerError, LedgerResult};
use crate::explorer::decode::{RawEventKind, RawPositionEvent};
use crate::explorer::ExplorerClient;
use crate::ledger::LedgerEngine;
use crate::rpc::create_provider;
use alloy::primitives::{Address, U256};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

/// Concentrated-liquidity position ledger reconstruction CLI.
#[derive(Parser, Debug)]
#[command(name = "clp-ledger")]
#[command(about = "Reconstructs a concentrated-liquidity NFT position's financial ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Authoritatively rebuild a position's entire ledger from scratch.
    Rebuild {
        /// Database row ID of the position to rebuild.
        #[arg(short, long)]
        position: i64,
    },
    /// Incrementally fold one externally-supplied raw event onto the chain tip.
    Append {
        /// Database row ID of the position to append to.
        #[arg(short, long)]
        position: i64,
        /// Path to a JSON file describing the raw position event.
        #[arg(short, long)]
        event: PathBuf,
    },
}

/// JSON shape accepted by `append --event`; mirrors [`RawPositionEvent`] with
/// human-typed fields instead of wire-decoded ones.
#[derive(Debug, Deserialize)]
struct AppendEventFile {
    kind: AppendEventKind,
    token_id: String,
    block_number: u64,
    transaction_index: u64,
    log_index: u64,
    transaction_hash: String,
    timestamp: i64,
    liquidity: Option<u128>,
    amount0: String,
    amount1: String,
    recipient: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum AppendEventKind {
    IncreaseLiquidity,
    DecreaseLiquidity,
    Collect,
}

impl TryFrom<AppendEventFile> for RawPositionEvent {
    type Error = LedgerError;

    fn try_from(file: AppendEventFile) -> LedgerResult<Self> {
        let kind = match file.kind {
            AppendEventKind::IncreaseLiquidity => RawEventKind::IncreaseLiquidity,
            AppendEventKind::DecreaseLiquidity => RawEventKind::DecreaseLiquidity,
            AppendEventKind::Collect => RawEventKind::Collect,
        };
        let token_id: U256 = file
            .token_id
            .parse()
            .map_err(|e| LedgerError::decode(format!("malformed token_id: {e}")))?;
        let amount0: U256 = file
            .amount0
            .parse()
            .map_err(|e| LedgerError::decode(format!("malformed amount0: {e}")))?;
        let amount1: U256 = file
            .amount1
            .parse()
            .map_err(|e| LedgerError::decode(format!("malformed amount1: {e}")))?;

        Ok(Self {
            kind,
            token_id,
            block_number: file.block_number,
            transaction_index: file.transaction_index,
            log_index: file.log_index,
            transaction_hash: file.transaction_hash,
            timestamp: file.timestamp,
            liquidity: file.liquidity,
            amount0,
            amount1,
            recipient: file.recipient,
        })
    }
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns an error if configuration loading, provider/database setup, or
/// the requested ledger operation fails.
pub async fn run() -> LedgerResult<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = create_pool(config.database_url()).await?;
    let repo = Repository::new(pool.clone());
    let provider = create_provider(config.rpc_url()).await?;
    let explorer = ExplorerClient::new(
        reqwest::Client::new(),
        config.etherscan_api_key(),
        crate::cache::Cache::new(pool),
        config.scheduler_min_spacing_explorer(),
        crate::retry::RetryConfig {
            retries: config.retry_max_attempts(),
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        },
        config.cache_ttl_contract_creation(),
    )?;
    let engine = LedgerEngine::new(repo, explorer, provider);

    match cli.command {
        Commands::Rebuild { position } => run_rebuild(&engine, position).await,
        Commands::Append { position, event } => run_append(&engine, position, &event).await,
    }
}

async fn run_rebuild(engine: &LedgerEngine, position_id: i64) -> LedgerResult<()> {
    info!(position_id, "rebuilding ledger");
    let chain = engine.discover_all_events(position_id).await?;
    print_chain(&chain);
    Ok(())
}

async fn run_append(engine: &LedgerEngine, position_id: i64, event_path: &PathBuf) -> LedgerResult<()> {
    info!(position_id, path = %event_path.display(), "appending event");
    let raw_json = std::fs::read_to_string(event_path)
        .map_err(|e| LedgerError::config(format!("failed to read {}: {e}", event_path.display()), None))?;
    let file: AppendEventFile = serde_json::from_str(&raw_json)
        .map_err(|e| LedgerError::decode(format!("malformed event file: {e}")))?;
    let raw_event = RawPositionEvent::try_from(file)?;

    let chain = engine.discover_event(position_id, raw_event).await?;
    print_chain(&chain);
    Ok(())
}

fn print_chain(chain: &[crate::ledger::LedgerEntry]) {
    println!("{} entries:", chain.len());
    for entry in chain {
        println!(
            "  #{} {:?} @ {} costBasisAfter={} pnlAfter={}",
            entry.id, entry.event_type, entry.timestamp, entry.cost_basis_after, entry.pnl_after
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rebuild_command() {
        let cli = Cli::try_parse_from(["clp-ledger", "rebuild", "--position", "42"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn parses_append_command() {
        let cli = Cli::try_parse_from(["clp-ledger", "append", "--position", "1", "--event", "e.json"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn append_event_file_converts_to_raw_event() {
        let file = AppendEventFile {
            kind: AppendEventKind::Collect,
            token_id: "123".to_string(),
            block_number: 100,
            transaction_index: 0,
            log_index: 2,
            transaction_hash: "0xabc".to_string(),
            timestamp: 1_700_000_000,
            liquidity: None,
            amount0: "500".to_string(),
            amount1: "0".to_string(),
            recipient: None,
        };
        let raw = RawPositionEvent::try_from(file).unwrap();
        assert_eq!(raw.token_id, U256::from(123u64));
        assert_eq!(raw.amount0, U256::from(500u64));
        assert!(matches!(raw.kind, RawEventKind::Collect));
    }

    #[test]
    fn malformed_token_id_is_decode_error() {
        let file = AppendEventFile {
            kind: AppendEventKind::Collect,
            token_id: "not-a-number".to_string(),
            block_number: 100,
            transaction_index: 0,
            log_index: 2,
            transaction_hash: "0xabc".to_string(),
            timestamp: 1_700_000_000,
            liquidity: None,
            amount0: "0".to_string(),
            amount1: "0".to_string(),
            recipient: None,
        };
        let err = RawPositionEvent::try_from(file).unwrap_err();
        assert!(matches!(err, LedgerError::DecodeError { .. }));
    }
}
