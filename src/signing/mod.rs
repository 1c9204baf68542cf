//! Transaction-signing delegation subsystem.
//!
//! # Data Flow
//! ```text
//! caller → coordinator (allocate id, store request)
//!        → transaction-signing-request over the signer's websocket
//!        ← {id, chainId, data} response from the client
//!        → coordinator.resolve (correlate by id, verify chain + payload)
//!        → caller receives the signed bytes, id retired
//! ```
//!
//! The daemon never holds private keys; signing happens client-side.

pub mod coordinator;
pub mod types;

pub use coordinator::SigningCoordinator;
pub use types::{RejectReason, RequestId, SigningError, SigningRequest, SigningResponse};
