//! Bounty event bridge daemon.
//!
//! Bridges a chain's contract event log to websocket clients and delegates
//! transaction signing to a connected client.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                BOUNTY BRIDGE                  │
//!                      │                                               │
//!  JSON-RPC endpoint   │  ┌────────┐   ┌─────────┐   ┌──────────────┐ │
//!  ────────────────────┼─▶│ chain  │──▶│ filters │──▶│    events    │ │
//!                      │  │ source │   │scheduler│   │   decoder    │ │
//!                      │  └────────┘   └─────────┘   └──────┬───────┘ │
//!                      │                                     │         │
//!                      │                                     ▼         │
//!  WebSocket clients   │  ┌────────┐   ┌─────────┐   ┌──────────────┐ │
//!  ◀───────────────────┼──│   ws   │◀──│   bus   │◀──│  WsMessage   │ │
//!  ────────────────────┼─▶│ server │──▶│ signing │                    │
//!   (signed payloads)  │  └────────┘   │ coord.  │                    │
//!                      │               └─────────┘                    │
//!                      │  ┌─────────────────────────────────────────┐ │
//!                      │  │ config · lifecycle · observability      │ │
//!                      │  └─────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;

use bounty_bridge::chain::{LogSource, RpcLogSource};
use bounty_bridge::config::{load_config, BridgeConfig};
use bounty_bridge::events::SchemaRegistry;
use bounty_bridge::filters::{ContractAddresses, FilterScheduler};
use bounty_bridge::lifecycle::{signals, Shutdown};
use bounty_bridge::observability;
use bounty_bridge::signing::SigningCoordinator;
use bounty_bridge::ws::{AppState, MessageBus};

#[derive(Parser)]
#[command(name = "bounty-bridge")]
#[command(about = "Chain event to websocket bridge daemon", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "bridge.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config: BridgeConfig = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        BridgeConfig::default()
    };

    observability::logging::init(&config.observability.log_level);
    tracing::info!("bounty-bridge v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rpc_url = %config.chain.rpc_url,
        chain_id = config.chain.chain_id,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let source: Arc<dyn LogSource> = Arc::new(RpcLogSource::connect(&config.chain).await?);
    let registry = Arc::new(SchemaRegistry::standard());
    let bus = Arc::new(MessageBus::new(config.websocket.queue_capacity));
    let addresses = ContractAddresses {
        bounty_registry: config.chain.bounty_registry_address.parse()?,
        artifact_registry: config.chain.artifact_registry_address.parse()?,
    };
    let scheduler = Arc::new(FilterScheduler::new(
        source,
        registry,
        bus.clone(),
        addresses,
        config.filters.clone(),
    ));
    let coordinator = Arc::new(SigningCoordinator::new(
        bus.clone(),
        config.chain.chain_id,
        Duration::from_secs(config.signing.deadline_secs),
    ));

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_listener(shutdown.clone());

    let start_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string();
    let state = AppState {
        bus,
        scheduler: scheduler.clone(),
        coordinator: coordinator.clone(),
        start_time,
        send_timeout: Duration::from_secs(config.websocket.send_timeout_secs),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    bounty_bridge::ws::serve(listener, state, shutdown.subscribe()).await?;

    // Drain in-flight polls and signing responses, bounded.
    let deadline = Duration::from_secs(config.lifecycle.shutdown_deadline_secs);
    scheduler.shutdown(deadline).await;
    coordinator.drain(deadline).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
