//! # Concentrated-Liquidity Position Ledger
//!
//! Reconstructs a per-position, append-only financial ledger (cost basis,
//! realized PnL, collected fees) for concentrated-liquidity NFT positions
//! (Uniswap V3 and its position-manager-compatible forks) by folding
//! `INCREASE_LIQUIDITY`/`DECREASE_LIQUIDITY`/`COLLECT` events in log order.
//!
//! ## Architecture
//!
//! - `chain`: supported EVM chains and their position-manager addresses
//! - `config`: environment-driven runtime configuration
//! - `math`: decimal-string/address helpers shared across layers
//! - `scheduler`: per-provider outbound call pacing
//! - `retry`: exponential-backoff retry wrapper
//! - `cache`: sqlite-backed TTL cache for explorer/price lookups
//! - `rpc`: archive-node provider management, historic `slot0()`/block reads
//! - `explorer`: unified block-explorer client, raw log decoding
//! - `pricing`: `sqrtPriceX96` → quote-denominated price conversion
//! - `db`: sqlite schema, migrations, and the repository layer
//! - `ledger`: the folding state machine and its two discovery entry points
//! - `observability`: structured logging setup
//! - `cli`: command-line interface

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod chain;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod explorer;
pub mod ledger;
pub mod math;
pub mod observability;
pub mod pricing;
pub mod retry;
pub mod rpc;
pub mod scheduler;
