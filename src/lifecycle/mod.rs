//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Initialize subsystems → Start listener
//!
//! Shutdown:
//!     SIGTERM/SIGINT → shutdown.rs broadcast
//!     → listener stops accepting
//!     → scheduler drains in-flight polls (bounded)
//!     → coordinator drains in-flight signing responses (bounded)
//!     → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
