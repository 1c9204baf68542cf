//! Bounty event bridge daemon library.

pub mod chain;
pub mod config;
pub mod events;
pub mod filters;
pub mod lifecycle;
pub mod observability;
pub mod signing;
pub mod ws;

pub use config::BridgeConfig;
pub use lifecycle::Shutdown;
