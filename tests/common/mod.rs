//! Shared utilities for integration testing.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bounty_bridge::chain::{ChainError, ChainResult, FilterId, FilterQuery, LogSource, RawLogEntry};
use bounty_bridge::config::schema::FiltersConfig;

/// In-memory chain: a ledger of entries plus a head pointer, with failure
/// and exhaustion injection.
pub struct MockLogSource {
    chain_id: u64,
    head: AtomicU64,
    ledger: Mutex<Vec<RawLogEntry>>,
    fail_polls: AtomicU32,
    exhausted: AtomicBool,
}

impl MockLogSource {
    pub fn new(chain_id: u64, head: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            head: AtomicU64::new(head),
            ledger: Mutex::new(Vec::new()),
            fail_polls: AtomicU32::new(0),
            exhausted: AtomicBool::new(false),
        })
    }

    /// Append an entry and move the head to its block. The entry lands in
    /// the ledger before the head moves, so a concurrent poll never scans
    /// past a block it cannot yet see.
    pub fn push(&self, entry: RawLogEntry) {
        let block = entry.block_number;
        self.ledger.lock().unwrap().push(entry);
        self.head.fetch_max(block, Ordering::SeqCst);
    }

    /// Append several entries atomically, then move the head once. A poll
    /// observes either none of them or all of them.
    pub fn push_all(&self, entries: Vec<RawLogEntry>) {
        let highest = entries.iter().map(|e| e.block_number).max();
        self.ledger.lock().unwrap().extend(entries);
        if let Some(block) = highest {
            self.head.fetch_max(block, Ordering::SeqCst);
        }
    }

    pub fn advance_to(&self, block: u64) {
        self.head.fetch_max(block, Ordering::SeqCst);
    }

    /// Fail the next `n` head queries with a transient error.
    pub fn inject_failures(&self, n: u32) {
        self.fail_polls.store(n, Ordering::SeqCst);
    }

    /// Make every subsequent log query report the filter as gone.
    pub fn exhaust(&self) {
        self.exhausted.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogSource for MockLogSource {
    async fn chain_id(&self) -> ChainResult<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        if self.fail_polls.load(Ordering::SeqCst) > 0 {
            self.fail_polls.fetch_sub(1, Ordering::SeqCst);
            return Err(ChainError::Transient("injected poll failure".into()));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn entries_in_range(
        &self,
        query: &FilterQuery,
        from: u64,
        to: u64,
    ) -> ChainResult<Vec<RawLogEntry>> {
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(ChainError::FilterExhausted(FilterId(0)));
        }
        match query {
            FilterQuery::Latest => Ok((from..=to)
                .map(|n| {
                    let mut args = Map::new();
                    args.insert("number".into(), Value::from(n));
                    entry("latest", args, n, 0, 0)
                })
                .collect()),
            FilterQuery::Event { event, .. } => Ok(self
                .ledger
                .lock()
                .unwrap()
                .iter()
                .filter(|e| {
                    e.event == *event && e.block_number >= from && e.block_number <= to
                })
                .cloned()
                .collect()),
        }
    }
}

fn entry(
    event: &str,
    args: Map<String, Value>,
    block: u64,
    tx_index: u64,
    log_index: u64,
) -> RawLogEntry {
    RawLogEntry {
        event: event.to_string(),
        args,
        log_index,
        transaction_index: tx_index,
        transaction_hash: B256::repeat_byte(block as u8),
        address: Address::ZERO,
        block_hash: B256::ZERO,
        block_number: block,
    }
}

const AUTHOR: &str = "0x4B1867c484871926109E3C47668d5C0938CA3527";

/// A well-formed NewBounty entry.
pub fn bounty_entry(guid: u64, block: u64, log_index: u64) -> RawLogEntry {
    let args = json_args(json!({
        "guid": guid,
        "artifactType": 0,
        "author": AUTHOR,
        "amount": "62500000000000000",
        "artifactURI": "QmcAVSsevP3TDSJYPJSNTsnvmQfTifGEkymTauQ3KvSdNR",
        "expirationBlock": block + 100,
        "metadata": "QmMetadata"
    }));
    entry("NewBounty", args, block, 0, log_index)
}

/// A NewBounty entry whose artifact type violates the schema enum.
pub fn bad_bounty_entry(guid: u64, block: u64, log_index: u64) -> RawLogEntry {
    let mut e = bounty_entry(guid, block, log_index);
    e.args.insert("artifactType".into(), Value::from(9u64));
    e
}

/// A well-formed NewAssertion entry.
pub fn assertion_entry(bounty_guid: u64, block: u64, log_index: u64) -> RawLogEntry {
    let args = json_args(json!({
        "bountyGuid": bounty_guid,
        "author": AUTHOR,
        "index": 0,
        "bid": ["62500000000000000"],
        "mask": 3,
        "numArtifacts": 2,
        "commitment": "4563567"
    }));
    entry("NewAssertion", args, block, 0, log_index)
}

/// A well-formed SettledBounty entry.
pub fn settled_entry(bounty_guid: u64, block: u64, log_index: u64) -> RawLogEntry {
    let args = json_args(json!({
        "bountyGuid": bounty_guid,
        "settler": AUTHOR,
        "payout": 365
    }));
    entry("SettledBounty", args, block, 0, log_index)
}

fn json_args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("entry args are always objects"),
    }
}

/// Fast cadence for tests.
pub fn test_filters_config() -> FiltersConfig {
    FiltersConfig {
        min_wait_ms: 10,
        max_wait_ms: 50,
        degraded_threshold: 3,
    }
}
