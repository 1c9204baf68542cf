//! One chain log subscription with cursor and backlog tracking.

use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::chain::{ChainResult, FilterId, FilterQuery, LogSource, RawLogEntry};
use crate::events::EventKind;

/// Poll cadence for one filter.
///
/// Filters that opt into backoff stretch the wait exponentially between
/// `min_wait` and `max_wait` while polls come back empty; a non-empty poll
/// resets it. Jitter keeps concurrent filters from aligning their requests.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub backoff: bool,
}

impl PollPolicy {
    /// Always poll at `interval`, no backoff.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            min_wait: interval,
            max_wait: interval,
            backoff: false,
        }
    }

    pub fn with_backoff(min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            min_wait,
            max_wait,
            backoff: true,
        }
    }

    /// Wait before the next poll, from a count of sequential empty replies.
    pub fn compute_wait(&self, empty_polls: u32) -> Duration {
        if !self.backoff {
            return self.min_wait;
        }

        let exponent = empty_polls.saturating_sub(2).min(10);
        let base_ms = ((1u64 << exponent) - 1).saturating_mul(1000);
        let capped_ms = base_ms.clamp(self.min_wait.as_millis() as u64, self.max_wait.as_millis() as u64);

        // Jitter up to 10% so fleets of filters do not poll in lockstep.
        let jitter_range = capped_ms / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };
        Duration::from_millis(capped_ms + jitter)
    }
}

/// One installed log subscription.
///
/// Owns the block cursor: `get_new_entries` only ever reports a block range
/// once. The backlog (`get_all_entries`) is tracked independently from the
/// filter's creation block so replay does not disturb the cursor.
pub struct ContractFilter {
    id: FilterId,
    kind: EventKind,
    query: FilterQuery,
    source: Arc<dyn LogSource>,
    policy: PollPolicy,
    /// First block this filter is responsible for.
    start_block: u64,
    /// Last block already scanned; only `cursor + 1..` counts as new.
    cursor: Mutex<u64>,
    stopped: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl ContractFilter {
    /// Install a filter starting at the endpoint's current head.
    pub async fn install(
        id: FilterId,
        kind: EventKind,
        query: FilterQuery,
        source: Arc<dyn LogSource>,
        policy: PollPolicy,
    ) -> ChainResult<Self> {
        let head = source.block_number().await?;
        Ok(Self {
            id,
            kind,
            query,
            source,
            policy,
            start_block: head + 1,
            cursor: Mutex::new(head),
            stopped: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
        })
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Entries observed since the last call, in ascending
    /// `(block number, transaction index, log index)` order.
    ///
    /// The cursor only advances when the fetch succeeds, so a transient
    /// failure never loses a block range.
    pub async fn get_new_entries(&self) -> ChainResult<Vec<RawLogEntry>> {
        let head = self.source.block_number().await?;
        self.get_new_entries_up_to(head).await
    }

    /// Same as [`get_new_entries`](Self::get_new_entries) against a head the
    /// caller already fetched. The scheduler polls sibling filters against
    /// one head snapshot so their entries interleave in block order.
    pub async fn get_new_entries_up_to(&self, head: u64) -> ChainResult<Vec<RawLogEntry>> {
        let mut cursor = self.cursor.lock().await;
        if head <= *cursor {
            return Ok(Vec::new());
        }
        let mut entries = self
            .source
            .entries_in_range(&self.query, *cursor + 1, head)
            .await?;
        *cursor = head;
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Full backlog from filter creation, for history replay. Does not
    /// advance the cursor.
    pub async fn get_all_entries(&self) -> ChainResult<Vec<RawLogEntry>> {
        let head = self.source.block_number().await?;
        if head < self.start_block {
            return Ok(Vec::new());
        }
        let mut entries = self
            .source
            .entries_in_range(&self.query, self.start_block, head)
            .await?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Advance the cursor to the current head without fetching, discarding
    /// whatever accumulated while the filter had no subscribers.
    pub async fn flush(&self) -> ChainResult<()> {
        let mut cursor = self.cursor.lock().await;
        let head = self.source.block_number().await?;
        if head > *cursor {
            *cursor = head;
        }
        Ok(())
    }

    /// Mark the filter stopped. Idempotent; returns whether this call was
    /// the false→true transition.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ContractFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractFilter")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("query", &self.query)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn sort_entries(entries: &mut [RawLogEntry]) {
    entries.sort_by_key(RawLogEntry::ordinal);
}
