//! CLI entry point for the concentrated-liquidity ledger reconstructor.
//!
//! # Architecture Flow
//!
//! This binary delegates to the CLI module, which orchestrates all layers:
//!
//! ```text
//! main.rs (Runtime Initialization)
//!     ↓
//! CLI Layer (src/cli.rs)
//!     ↓
//! 1. Config Layer (src/config.rs)       → Load environment variables
//! 2. DB Layer (src/db)                  → Open sqlite pool, run migrations
//! 3. RPC Layer (src/rpc.rs)             → Create archive-node provider
//! 4. Explorer Layer (src/explorer)      → Fetch & decode position logs
//! 5. Ledger Layer (src/ledger)          → Fold events into the cost-basis chain
//! 6. CLI Layer (output)                 → Print the resulting chain
//! ```
//!
//! # Layer Separation
//!
//! - **main.rs**: Async runtime + tracing initialization only
//! - **CLI module**: User interface + layer orchestration
//! - **Core modules**: Independent, reusable, no upward dependencies
//!
//! All errors bubble up with context via `LedgerResult<T>`.

use clp_ledger::{cli, observability};

/// Entry point for the ledger reconstruction CLI.
///
/// Initializes:
/// - Tokio async runtime (via `#[tokio::main]`)
/// - Structured logging with tracing (`RUST_LOG`-driven, defaults to `info`)
///
/// Then delegates to the CLI module for all business logic.
#[tokio::main]
async fn main() {
    if let Err(e) = observability::init_tracing(None, None, false) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = cli::run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
