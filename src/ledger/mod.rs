//! Ledger reconstruction: folds decoded position events into the canonical,
//! append-only cost-basis/PnL chain.
//!
//! - `entry`: the runtime ledger-entry type and its JSON sub-documents
//! - `price_resolver`: cached historic pool-price lookups
//! - `engine`: the folding state machine and the two discovery entry points

pub mod engine;
pub mod entry;
pub mod price_resolver;

pub use engine::LedgerEngine;
pub use entry::{EntryConfig, EntryState, EventType, InputHash, LedgerEntry, Protocol, Reward};
