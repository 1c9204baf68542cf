//! Event decoding subsystem.
//!
//! # Data Flow
//! ```text
//! RawLogEntry (chain)
//!     → schema.rs (registry: which fields, from where, in what shape)
//!     → decoder.rs (resolve → format → coerce → enum check)
//!     → messages.rs (typed WsMessage, one variant per kind)
//! ```

pub mod decoder;
pub mod messages;
pub mod schema;

pub use decoder::{decode, DecodeError};
pub use messages::{EventKind, WsMessage};
pub use schema::{JsonSchema, Payload, SchemaDef, SchemaRegistry};
