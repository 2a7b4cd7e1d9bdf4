//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/YAML/TOML)
//!     → watcher.rs (OS watch, listener thread, reads whole file on write)
//!     → registry.rs (fan-out to one handler per routing key)
//!     → monitor.rs (per routing key)
//!         → loader.rs (decode bytes → map of key → schema.rs record)
//!         → atomic swap of Arc<C>
//!         → policy adapters (validation.rs per method)
//! ```
//!
//! # Design Decisions
//! - One listener thread per watched file; every reload for that file runs on it
//! - A failed decode or a missing key never touches live state
//! - Monitors are typed by their config shape; no runtime casts
//! - Several monitors can share one file, keyed by routing key

pub mod key;
pub mod loader;
pub mod monitor;
pub mod registry;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use key::{DefaultKeyProvider, Key, KeyProvider};
pub use loader::{ConfigManager, DecodeError, DecodedConfigMap, Decoder, Format};
pub use monitor::{ConfigMonitor, MonitorError, ReloadOutcome, WeakConfigMonitor};
pub use schema::{ClientFileConfig, ServerFileConfig};
pub use watcher::{ChangeSource, FileWatcher, FileWatcherConfig, WatchError};
