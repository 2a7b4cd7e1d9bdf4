//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! watcher / monitor / adapters
//!     → tracing events (path, key, method, error fields)
//!     → metrics.rs (reload outcomes, skipped methods, callback panics)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing a subscriber or recorder is the
//!   host's choice (the demo binary uses logging.rs and metrics.rs)

pub mod logging;
pub mod metrics;
