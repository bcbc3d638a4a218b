//! Black-box scenario tests exercising the explorer client against a mock
//! HTTP server and the ledger engine's append-time validation against an
//! in-memory database, without any live network calls.

use alloy::primitives::U256;
use clp_ledger::cache::Cache;
use clp_ledger::db::create_pool;
use clp_ledger::db::repository::Repository;
use clp_ledger::error::LedgerError;
use clp_ledger::explorer::decode::RawEventKind;
use clp_ledger::explorer::ExplorerClient;
use clp_ledger::ledger::LedgerEngine;
use clp_ledger::retry::RetryConfig;
use clp_ledger::rpc::create_provider;
use std::time::Duration;

const MAINNET: u64 = 1;
const POSITION_MANAGER: &str = "0xc36442b4a4522e871399cd717abdd847ab11fe88";
const INCREASE_TOPIC0: &str = "0x3067048beee31b25b2f1681f88dac838c8bba36af25bfb2b7cf7473a5847e35f";

async fn test_cache(pool: sqlx::SqlitePool) -> Cache {
    sqlx::query(
        "CREATE TABLE cache_entries (key TEXT PRIMARY KEY, value TEXT NOT NULL, expires_at INTEGER NOT NULL)",
    )
    .execute(&pool)
    .await
    .unwrap();
    Cache::new(pool)
}

async fn explorer_client(base_url: &str) -> ExplorerClient {
    let cache_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let cache = test_cache(cache_pool).await;
    ExplorerClient::new(
        reqwest::Client::new(),
        "test-api-key",
        cache,
        Duration::from_millis(1),
        RetryConfig {
            retries: 4,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
        },
        Duration::from_secs(3600),
    )
    .unwrap()
    .with_base_url(format!("{base_url}/v2/api"))
}

fn log_row(tx_hash: &str, log_index: &str, block_number: &str, tx_index: &str, token_id_hex: &str) -> serde_json::Value {
    serde_json::json!({
        "address": POSITION_MANAGER,
        "topics": [INCREASE_TOPIC0, format!("0x{token_id_hex:0>64}")],
        "data": format!(
            "0x{}{}{}",
            "0".repeat(64 - 1) + "1", // liquidity = 1
            "0".repeat(64),           // amount0 = 0
            "0".repeat(64),           // amount1 = 0
        ),
        "blockNumber": block_number,
        "blockHash": "0xabc",
        "timeStamp": "1700000000",
        "gasPrice": "0x1",
        "gasUsed": "0x2",
        "logIndex": log_index,
        "transactionHash": tx_hash,
        "transactionIndex": tx_index,
    })
}

fn envelope_ok(logs: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({ "status": "1", "message": "OK", "result": logs })
}

fn envelope_empty() -> serde_json::Value {
    serde_json::json!({ "status": "0", "message": "No records found", "result": [] })
}

// Scenario B: duplicate raw events (same txHash/logIndex) collapse to one.
#[tokio::test]
async fn scenario_b_duplicate_raw_events_deduplicate() {
    let mut server = mockito::Server::new_async().await;

    let increase_logs = vec![
        log_row("0xdeadbeef", "0x5", "0x64", "0x1", "1"),
        log_row("0xdeadbeef", "0x5", "0x64", "0x1", "1"), // exact duplicate
    ];

    let _increase_mock = server
        .mock("GET", mockito::Matcher::Any)
        .match_query(mockito::Matcher::Regex(format!("topic0={INCREASE_TOPIC0}")))
        .with_status(200)
        .with_body(envelope_ok(increase_logs).to_string())
        .create_async()
        .await;
    let _other_mock = server
        .mock("GET", mockito::Matcher::Any)
        .match_query(mockito::Matcher::Regex("topic0=0x(26f6a048|40d0efd1).*".into()))
        .with_status(200)
        .with_body(envelope_empty().to_string())
        .create_async()
        .await;

    let client = explorer_client(&server.url()).await;
    let events = client
        .fetch_position_events(MAINNET, U256::from(1u64), Some(100), Some(100))
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].kind, RawEventKind::IncreaseLiquidity));
}

// Scenario C: events out of order across two blocks sort by (block, txIndex, logIndex).
#[tokio::test]
async fn scenario_c_events_sort_by_block_tx_log_order() {
    let mut server = mockito::Server::new_async().await;

    let increase_logs = vec![
        log_row("0xbbb", "0x0", "0x65", "0x0", "1"), // block 101
        log_row("0xaaa", "0x2", "0x64", "0x3", "1"), // block 100, later in block
        log_row("0xccc", "0x1", "0x64", "0x1", "1"), // block 100, earlier in block
    ];

    let _increase_mock = server
        .mock("GET", mockito::Matcher::Any)
        .match_query(mockito::Matcher::Regex(format!("topic0={INCREASE_TOPIC0}")))
        .with_status(200)
        .with_body(envelope_ok(increase_logs).to_string())
        .create_async()
        .await;
    let _other_mock = server
        .mock("GET", mockito::Matcher::Any)
        .match_query(mockito::Matcher::Regex("topic0=0x(26f6a048|40d0efd1).*".into()))
        .with_status(200)
        .with_body(envelope_empty().to_string())
        .create_async()
        .await;

    let client = explorer_client(&server.url()).await;
    let events = client
        .fetch_position_events(MAINNET, U256::from(1u64), Some(100), Some(101))
        .await
        .unwrap();

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].transaction_hash, "0xccc");
    assert_eq!(events[1].transaction_hash, "0xaaa");
    assert_eq!(events[2].transaction_hash, "0xbbb");
}

// Scenario D: the disguised rate-limit-in-200-body retry path and the
// 429 retry path are covered directly at the `retry::with_retry` level
// (see `src/retry.rs`'s test module) using constructed responses, since
// asserting on a mock server's cross-request sequencing for repeated
// hits to the identical URL is not a behavior this crate controls.

async fn engine_over_fresh_position() -> (LedgerEngine, clp_ledger::db::models::PositionRow) {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    let repo = Repository::new(pool.clone());

    let t0 = repo.upsert_token(MAINNET, "0xaaa", "Token A", "AAA", 18).await.unwrap();
    let t1 = repo.upsert_token(MAINNET, "0xbbb", "Token B", "BBB", 6).await.unwrap();
    let pool_row = repo.upsert_pool(MAINNET, "0xpool", t0.id, t1.id, 3000, 60).await.unwrap();
    let position = repo
        .insert_position(MAINNET, U256::from(42u64), pool_row.id, "0xowner", -100, 100, false)
        .await
        .unwrap();
    // Pre-seed a price sample so a legitimate append never needs the RPC
    // fallback; only out-of-band validation is under test here.
    repo.insert_pool_price_sample(pool_row.id, 100, U256::from(1u64) << 96, 1_700_000_000)
        .await
        .unwrap();

    let cache = test_cache(pool.clone()).await;
    let explorer = ExplorerClient::new(
        reqwest::Client::new(),
        "test-api-key",
        cache,
        Duration::from_millis(1),
        RetryConfig { retries: 1, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(1) },
        Duration::from_secs(3600),
    )
    .unwrap();
    let provider = create_provider("http://127.0.0.1:1/never-called").await.unwrap();
    (LedgerEngine::new(repo, explorer, provider), position)
}

fn raw_event(token_id: u64, block_number: u64, timestamp: i64) -> clp_ledger::explorer::decode::RawPositionEvent {
    clp_ledger::explorer::decode::RawPositionEvent {
        kind: RawEventKind::IncreaseLiquidity,
        token_id: U256::from(token_id),
        block_number,
        transaction_index: 0,
        log_index: 0,
        transaction_hash: "0xtx".to_string(),
        timestamp,
        liquidity: Some(1),
        amount0: U256::ZERO,
        amount1: U256::ZERO,
        recipient: None,
    }
}

// Scenario E: append validation rejects a mismatched tokenId, before any
// price resolution is attempted.
#[tokio::test]
async fn scenario_e_append_rejects_mismatched_token_id() {
    let (engine, position) = engine_over_fresh_position().await;
    let mismatched = raw_event(999, 100, 1_700_000_000);
    let err = engine.discover_event(position.id, mismatched).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolated { .. }));
}

// Scenario E: append validation rejects a non-increasing timestamp relative
// to the chain tip.
#[tokio::test]
async fn scenario_e_append_rejects_non_increasing_timestamp() {
    let (engine, position) = engine_over_fresh_position().await;

    let first = raw_event(42, 100, 1_700_000_000);
    engine.discover_event(position.id, first).await.unwrap();

    let stale = raw_event(42, 101, 1_700_000_000); // same timestamp as tip
    let err = engine.discover_event(position.id, stale).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolated { .. }));
}
