//! Chain-specific types and error definitions.

use alloy::primitives::{Address, B256};
use serde_json::{Map, Value};
use thiserror::Error;

pub use crate::config::schema::ChainConfig;

/// Identifier of one installed contract filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub u64);

impl std::fmt::Display for FilterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One raw log record as fetched from the chain endpoint.
///
/// Argument values are kept semi-structured (`serde_json`): the schema-driven
/// decoder is responsible for turning them into validated payload fields.
/// Numeric arguments wider than `u64` are carried as decimal strings.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLogEntry {
    /// Contract event name, or `"latest"` for synthetic block entries.
    pub event: String,
    /// Named event arguments.
    pub args: Map<String, Value>,
    pub log_index: u64,
    pub transaction_index: u64,
    pub transaction_hash: B256,
    pub address: Address,
    pub block_hash: B256,
    pub block_number: u64,
}

impl RawLogEntry {
    /// Canonical ordering key: entries are processed in ascending
    /// `(block number, transaction index, log index)` order.
    pub fn ordinal(&self) -> (u64, u64, u64) {
        (self.block_number, self.transaction_index, self.log_index)
    }
}

/// Errors that can occur while talking to the chain endpoint.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Endpoint unreachable or request failed; retried on the next poll tick.
    #[error("transient chain error: {0}")]
    Transient(String),

    /// Request timed out; retried on the next poll tick.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The endpoint no longer knows the filter. Not retried.
    #[error("filter {0} no longer exists on the chain endpoint")]
    FilterExhausted(FilterId),

    /// Connected endpoint does not serve the configured chain.
    #[error("chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// A new filter could not be allocated at all. Daemon-level fault.
    #[error("filter allocation failed: {0}")]
    FilterAllocation(String),
}

impl ChainError {
    /// Whether the next scheduled poll should simply retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transient(_) | ChainError::Timeout(_))
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(block: u64, tx: u64, log: u64) -> RawLogEntry {
        RawLogEntry {
            event: "NewBounty".to_string(),
            args: Map::new(),
            log_index: log,
            transaction_index: tx,
            transaction_hash: B256::ZERO,
            address: Address::ZERO,
            block_hash: B256::ZERO,
            block_number: block,
        }
    }

    #[test]
    fn test_ordinal_ordering() {
        let earlier = entry(10, 0, 0);
        let later_in_block = entry(10, 0, 1);
        let later_block = entry(11, 0, 0);
        assert!(earlier.ordinal() < later_in_block.ordinal());
        assert!(later_in_block.ordinal() < later_block.ordinal());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChainError::Transient("connection refused".into()).is_transient());
        assert!(ChainError::Timeout(5).is_transient());
        assert!(!ChainError::FilterExhausted(FilterId(3)).is_transient());
        assert!(!ChainError::FilterAllocation("out of filters".into()).is_transient());
    }
}
