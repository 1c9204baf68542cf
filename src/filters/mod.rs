//! Filter subsystem: per-subscription chain polling.

pub mod filter;
pub mod scheduler;

pub use filter::{ContractFilter, PollPolicy};
pub use scheduler::{ContractAddresses, FilterScheduler};
