//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_entries_total` (counter): raw entries fetched, by kind
//! - `bridge_decode_failures_total` (counter): entries skipped, by kind
//! - `bridge_messages_delivered_total` (counter): deliveries, by kind
//! - `bridge_connected_clients` (gauge): current client count
//! - `bridge_filters_degraded_total` (counter): degraded notifications
//! - `bridge_signing_outcomes_total` (counter): by outcome

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Start the Prometheus exposition endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_entries(kind: &'static str, count: u64) {
    counter!("bridge_entries_total", "kind" => kind).increment(count);
}

pub fn record_decode_failure(kind: &'static str) {
    counter!("bridge_decode_failures_total", "kind" => kind).increment(1);
}

pub fn record_broadcast(kind: &'static str, delivered: u64) {
    counter!("bridge_messages_delivered_total", "kind" => kind).increment(delivered);
}

pub fn record_clients(count: usize) {
    gauge!("bridge_connected_clients").set(count as f64);
}

pub fn record_filter_degraded(kind: &'static str) {
    counter!("bridge_filters_degraded_total", "kind" => kind).increment(1);
}

pub fn record_signing_outcome(outcome: &'static str) {
    counter!("bridge_signing_outcomes_total", "outcome" => outcome).increment(1);
}
