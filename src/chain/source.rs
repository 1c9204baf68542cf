//! The chain connection consumed by the filter layer.
//!
//! # Responsibilities
//! - Describe one log subscription (`FilterQuery`)
//! - Abstract the chain endpoint behind `LogSource` so the pipeline can be
//!   driven by the JSON-RPC source in production and a mock in tests

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::chain::types::{ChainResult, RawLogEntry};

/// What one contract filter watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterQuery {
    /// Logs for one contract event at one address.
    Event { address: Address, event: String },
    /// Synthetic entries for each newly mined block.
    Latest,
}

impl FilterQuery {
    pub fn event(address: Address, event: impl Into<String>) -> Self {
        FilterQuery::Event {
            address,
            event: event.into(),
        }
    }
}

impl std::fmt::Display for FilterQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterQuery::Event { address, event } => write!(f, "{event}@{address}"),
            FilterQuery::Latest => write!(f, "latest"),
        }
    }
}

/// A chain endpoint that can answer ranged log queries.
///
/// Cursor tracking lives in [`ContractFilter`](crate::filters::ContractFilter);
/// implementations only need to answer "what matched between these blocks".
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Chain id reported by the endpoint.
    async fn chain_id(&self) -> ChainResult<u64>;

    /// Current head block number.
    async fn block_number(&self) -> ChainResult<u64>;

    /// All entries matching `query` in the inclusive block range `from..=to`.
    ///
    /// No ordering is required of implementations; callers sort.
    async fn entries_in_range(
        &self,
        query: &FilterQuery,
        from: u64,
        to: u64,
    ) -> ChainResult<Vec<RawLogEntry>>;
}
