//! Chain access subsystem.
//!
//! # Data Flow
//! ```text
//! JSON-RPC endpoint(s)
//!     → rpc.rs (ranged log queries, sol! event decoding, failover)
//!     → RawLogEntry (semi-structured, consumed by the event decoder)
//!
//! Tests substitute a mock LogSource for rpc.rs.
//! ```

pub mod rpc;
pub mod source;
pub mod types;

pub use rpc::RpcLogSource;
pub use source::{FilterQuery, LogSource};
pub use types::{ChainError, ChainResult, FilterId, RawLogEntry};
