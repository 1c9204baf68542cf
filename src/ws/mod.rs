//! Client channel subsystem.
//!
//! # Data Flow
//! ```text
//! scheduler → bus.rs (interest-filtered fan-out, bounded per-client queues)
//!           → server.rs (one send/receive loop pair per websocket)
//!           → connected clients
//!
//! signing responses flow the other way: server.rs → coordinator
//! ```

pub mod bus;
pub mod client;
pub mod server;

pub use bus::{DeliveryOutcome, MessageBus};
pub use client::{ClientHandle, ClientId, Interest};
pub use server::{serve, AppState};
