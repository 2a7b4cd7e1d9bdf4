//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → broadcast → stop_on_shutdown hooks (suite close, watcher stop)
//! ```
//!
//! # Design Decisions
//! - Shutdown is triggered once; later triggers are ignored
//! - A hook registered after shutdown runs immediately

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
