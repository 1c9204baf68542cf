//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic ones; returns every problem
//! found, not just the first.

use alloy::primitives::Address;
use std::net::SocketAddr;

use crate::config::schema::BridgeConfig;

/// One semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(errors: &mut Vec<ValidationError>, field: &str, message: impl Into<String>) {
    errors.push(ValidationError {
        field: field.to_string(),
        message: message.into(),
    });
}

/// Validate a configuration before it is accepted into the system.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        err(
            &mut errors,
            "listener.bind_address",
            format!("not a socket address: '{}'", config.listener.bind_address),
        );
    }

    if config.chain.rpc_url.parse::<url::Url>().is_err() {
        err(
            &mut errors,
            "chain.rpc_url",
            format!("not a URL: '{}'", config.chain.rpc_url),
        );
    }
    for (i, failover) in config.chain.failover_urls.iter().enumerate() {
        if failover.parse::<url::Url>().is_err() {
            err(
                &mut errors,
                &format!("chain.failover_urls[{i}]"),
                format!("not a URL: '{failover}'"),
            );
        }
    }
    if config.chain.chain_id == 0 {
        err(&mut errors, "chain.chain_id", "must be non-zero");
    }
    if config.chain.rpc_timeout_secs == 0 {
        err(&mut errors, "chain.rpc_timeout_secs", "must be non-zero");
    }
    for (field, address) in [
        ("chain.bounty_registry_address", &config.chain.bounty_registry_address),
        ("chain.artifact_registry_address", &config.chain.artifact_registry_address),
    ] {
        if address.parse::<Address>().is_err() {
            err(&mut errors, field, format!("not an address: '{address}'"));
        }
    }

    if config.filters.min_wait_ms == 0 {
        err(&mut errors, "filters.min_wait_ms", "must be non-zero");
    }
    if config.filters.max_wait_ms < config.filters.min_wait_ms {
        err(
            &mut errors,
            "filters.max_wait_ms",
            "must be at least min_wait_ms",
        );
    }
    if config.filters.degraded_threshold == 0 {
        err(&mut errors, "filters.degraded_threshold", "must be non-zero");
    }

    if config.websocket.queue_capacity == 0 {
        err(&mut errors, "websocket.queue_capacity", "must be non-zero");
    }
    if config.websocket.send_timeout_secs == 0 {
        err(&mut errors, "websocket.send_timeout_secs", "must be non-zero");
    }

    if config.signing.deadline_secs == 0 {
        err(&mut errors, "signing.deadline_secs", "must be non-zero");
    }
    if config.lifecycle.shutdown_deadline_secs == 0 {
        err(
            &mut errors,
            "lifecycle.shutdown_deadline_secs",
            "must be non-zero",
        );
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        err(
            &mut errors,
            "observability.metrics_address",
            format!(
                "not a socket address: '{}'",
                config.observability.metrics_address
            ),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
