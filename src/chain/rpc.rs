//! JSON-RPC log source with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to one or more JSON-RPC endpoints
//! - Answer ranged log queries for the registered contract events
//! - Decode contract logs into semi-structured [`RawLogEntry`] records
//! - Handle timeouts and network errors gracefully

use alloy::primitives::U256;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::chain::source::{FilterQuery, LogSource};
use crate::chain::types::{ChainConfig, ChainError, ChainResult, RawLogEntry};

sol! {
    /// Emitted when a bounty is posted to the registry.
    #[derive(Debug)]
    event NewBounty(uint128 guid, uint8 artifactType, address author, uint256 amount, string artifactURI, uint256 expirationBlock, string metadata);

    /// Emitted when an expert asserts against a bounty.
    #[derive(Debug)]
    event NewAssertion(uint128 bountyGuid, address author, uint256 index, uint256[] bid, uint256 mask, uint256 numArtifacts, string commitment);

    /// Emitted when a bounty's verdict is settled and paid out.
    #[derive(Debug)]
    event SettledBounty(uint128 bountyGuid, address settler, uint256 payout);

    /// Emitted when an artifact is registered on-chain.
    #[derive(Debug)]
    event ArtifactUploaded(address author, string uri, uint256 index);
}

/// Map a contract event name to its ABI signature for topic filtering.
fn event_signature(event: &str) -> Option<&'static str> {
    match event {
        "NewBounty" => Some(NewBounty::SIGNATURE),
        "NewAssertion" => Some(NewAssertion::SIGNATURE),
        "SettledBounty" => Some(SettledBounty::SIGNATURE),
        "ArtifactUploaded" => Some(ArtifactUploaded::SIGNATURE),
        _ => None,
    }
}

/// Render a `uint256` argument as a JSON number when it fits in `u64`,
/// otherwise as a decimal string. The schema decoder accepts both.
fn u256_value(v: U256) -> Value {
    match u64::try_from(v) {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(v.to_string()),
    }
}

fn u128_value(v: u128) -> Value {
    match u64::try_from(v) {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(v.to_string()),
    }
}

/// Decode one fetched log into named arguments, per registered event.
///
/// Returns `None` when the log does not decode as the expected event; the
/// caller skips such logs without failing the poll.
fn decode_event_args(event: &str, log: &Log) -> Option<Map<String, Value>> {
    let mut args = Map::new();
    match event {
        "NewBounty" => {
            let d = log.log_decode::<NewBounty>().ok()?.inner.data;
            args.insert("guid".into(), u128_value(d.guid));
            args.insert("artifactType".into(), Value::from(d.artifactType));
            args.insert("author".into(), Value::from(d.author.to_checksum(None)));
            args.insert("amount".into(), u256_value(d.amount));
            args.insert("artifactURI".into(), Value::from(d.artifactURI));
            args.insert("expirationBlock".into(), u256_value(d.expirationBlock));
            args.insert("metadata".into(), Value::from(d.metadata));
        }
        "NewAssertion" => {
            let d = log.log_decode::<NewAssertion>().ok()?.inner.data;
            args.insert("bountyGuid".into(), u128_value(d.bountyGuid));
            args.insert("author".into(), Value::from(d.author.to_checksum(None)));
            args.insert("index".into(), u256_value(d.index));
            args.insert(
                "bid".into(),
                Value::Array(d.bid.into_iter().map(u256_value).collect()),
            );
            args.insert("mask".into(), u256_value(d.mask));
            args.insert("numArtifacts".into(), u256_value(d.numArtifacts));
            args.insert("commitment".into(), Value::from(d.commitment));
        }
        "SettledBounty" => {
            let d = log.log_decode::<SettledBounty>().ok()?.inner.data;
            args.insert("bountyGuid".into(), u128_value(d.bountyGuid));
            args.insert("settler".into(), Value::from(d.settler.to_checksum(None)));
            args.insert("payout".into(), u256_value(d.payout));
        }
        "ArtifactUploaded" => {
            let d = log.log_decode::<ArtifactUploaded>().ok()?.inner.data;
            args.insert("author".into(), Value::from(d.author.to_checksum(None)));
            args.insert("uri".into(), Value::from(d.uri));
            args.insert("index".into(), u256_value(d.index));
        }
        _ => return None,
    }
    Some(args)
}

fn raw_entry(event: &str, args: Map<String, Value>, log: &Log) -> RawLogEntry {
    RawLogEntry {
        event: event.to_string(),
        args,
        log_index: log.log_index.unwrap_or_default(),
        transaction_index: log.transaction_index.unwrap_or_default(),
        transaction_hash: log.transaction_hash.unwrap_or_default(),
        address: log.inner.address,
        block_hash: log.block_hash.unwrap_or_default(),
        block_number: log.block_number.unwrap_or_default(),
    }
}

/// Log source speaking JSON-RPC to an EVM endpoint, with failover support.
#[derive(Clone)]
pub struct RpcLogSource {
    /// List of providers (primary + failovers).
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    timeout_duration: Duration,
    timeout_secs: u64,
}

impl RpcLogSource {
    /// Connect to the configured endpoints.
    ///
    /// Chain id verification failure is logged but not fatal; the daemon
    /// degrades rather than refusing to start when the endpoint is flaky.
    pub async fn connect(config: &ChainConfig) -> ChainResult<Self> {
        let mut providers = Vec::new();

        let primary: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Transient(format!("invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers
            .push(Arc::new(ProviderBuilder::new().connect_http(primary))
                as Arc<dyn Provider + Send + Sync>);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url))
                    as Arc<dyn Provider + Send + Sync>);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let source = Self {
            providers,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
            timeout_secs: config.rpc_timeout_secs,
        };

        match source.chain_id().await {
            Ok(actual) if actual != config.chain_id => {
                tracing::warn!(
                    expected = config.chain_id,
                    actual,
                    "Chain ID mismatch; continuing with configured endpoints"
                );
            }
            Ok(_) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    "Chain connection established"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Chain connection unverified at startup");
            }
        }

        Ok(source)
    }
}

#[async_trait]
impl LogSource for RpcLogSource {
    async fn chain_id(&self) -> ChainResult<u64> {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_chain_id()).await {
                Ok(Ok(id)) => return Ok(id),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, "RPC timeout, trying next provider");
                }
            }
        }
        Err(ChainError::Transient(
            "all RPC providers failed to report chain id".to_string(),
        ))
    }

    async fn block_number(&self) -> ChainResult<u64> {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_block_number()).await {
                Ok(Ok(n)) => return Ok(n),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(ChainError::Timeout(self.timeout_secs))
    }

    async fn entries_in_range(
        &self,
        query: &FilterQuery,
        from: u64,
        to: u64,
    ) -> ChainResult<Vec<RawLogEntry>> {
        let (address, event) = match query {
            FilterQuery::Latest => {
                // One synthetic entry per block in range; flows through the
                // same decode pipeline as contract logs.
                return Ok((from..=to)
                    .map(|n| {
                        let mut args = Map::new();
                        args.insert("number".into(), Value::from(n));
                        RawLogEntry {
                            event: "latest".to_string(),
                            args,
                            log_index: 0,
                            transaction_index: 0,
                            transaction_hash: Default::default(),
                            address: Default::default(),
                            block_hash: Default::default(),
                            block_number: n,
                        }
                    })
                    .collect());
            }
            FilterQuery::Event { address, event } => (address, event),
        };

        let signature = event_signature(event).ok_or_else(|| {
            ChainError::FilterAllocation(format!("unknown contract event '{event}'"))
        })?;
        let filter = Filter::new()
            .address(*address)
            .from_block(from)
            .to_block(to)
            .event(signature);

        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_logs(&filter)).await {
                Ok(Ok(logs)) => {
                    let mut entries = Vec::with_capacity(logs.len());
                    for log in &logs {
                        match decode_event_args(event, log) {
                            Some(args) => entries.push(raw_entry(event, args, log)),
                            None => {
                                tracing::warn!(
                                    event = %event,
                                    tx = ?log.transaction_hash,
                                    "Skipping log that does not decode as registered event"
                                );
                            }
                        }
                    }
                    return Ok(entries);
                }
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(ChainError::Transient(format!(
            "all RPC providers failed to fetch logs for {event}"
        )))
    }
}

impl std::fmt::Debug for RpcLogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLogSource")
            .field("providers", &self.providers.len())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
