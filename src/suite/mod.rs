//! Option assembly for the host RPC runtime.
//!
//! # Data Flow
//! ```text
//! FileConfigClientSuite::options
//!     → ConfigMonitor<ClientFileConfig> (routing key)
//!     → retry / circuit breaker / timeout adapters
//!     → start (initial apply) → ClientOption list + close callbacks
//!
//! FileConfigServerSuite::options
//!     → ConfigMonitor<ServerFileConfig> → limiter → ServerOption list
//! ```
//!
//! # Design Decisions
//! - A suite built from a path owns its watcher and stops it on close
//! - A suite built on a shared source only tears down its own monitor

pub mod client;
pub mod server;

pub use client::{ClientOption, FileConfigClientSuite};
pub use server::{FileConfigServerSuite, ServerOption};

/// Teardown closure handed to the host runtime.
pub type CloseCallback = Box<dyn FnOnce() + Send>;
