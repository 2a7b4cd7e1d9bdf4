//! Live reload of RPC policy configuration from a local file.
//!
//! A [`FileWatcher`] follows one file. [`ConfigMonitor`]s pick their routing
//! key out of every reload, and policy adapters push the result into
//! containers the host RPC runtime reads on each call.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod suite;

pub use config::{ChangeSource, ConfigMonitor, FileWatcher, Format};
pub use lifecycle::Shutdown;
pub use suite::{FileConfigClientSuite, FileConfigServerSuite};
