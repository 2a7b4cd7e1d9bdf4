//! Config monitor: one routing key's slice of a watched file.
//!
//! # Reload cycle
//! ```text
//! file bytes
//!     → ConfigManager::decode (fails → log, keep everything)
//!     → lookup routing key (missing → log, keep everything)
//!     → swap cached config
//!     → run each registered callback once, in registration order
//! ```
//!
//! Reload cycles are serialized per monitor, so the last config stored is
//! always the last one callbacks see. Callbacks must not call back into
//! [`ConfigMonitor::parse_handler`] on the same monitor.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::loader::ConfigManager;
use crate::config::registry::{invoke_isolated, CallbackRegistry, DuplicatePolicy};
use crate::config::watcher::{ChangeSource, WatchError};
use crate::observability::metrics;

/// Callback fired after the cached config has been replaced.
pub type MonitorCallback = dyn Fn() + Send + Sync;

/// Error type for monitor construction and lifecycle.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("config manager not set for key {0}")]
    NotConfigured(String),

    #[error("config monitor already started for key {0}")]
    AlreadyStarted(String),

    #[error("invalid routing key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Result of one reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    DecodeFailed,
    KeyMissing,
    NotConfigured,
}

impl ReloadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadOutcome::Applied => "applied",
            ReloadOutcome::DecodeFailed => "decode_error",
            ReloadOutcome::KeyMissing => "key_missing",
            ReloadOutcome::NotConfigured => "not_configured",
        }
    }
}

struct MonitorInner<C> {
    key: String,
    source: Arc<dyn ChangeSource>,
    manager: RwLock<Option<ConfigManager<C>>>,
    config: ArcSwapOption<C>,
    callbacks: CallbackRegistry<MonitorCallback>,
    started: AtomicBool,
    reloads: AtomicU64,
    reload_lock: Mutex<()>,
}

impl<C: DeserializeOwned + Send + Sync + 'static> MonitorInner<C> {
    fn parse_handler(&self, data: &[u8]) -> ReloadOutcome {
        let outcome = {
            let _serial = self.reload_lock.lock();
            self.reload(data)
        };
        metrics::record_reload(&self.key, outcome.as_str());
        outcome
    }

    fn reload(&self, data: &[u8]) -> ReloadOutcome {
        let Some(manager) = self.manager.read().clone() else {
            tracing::error!(key = %self.key, "Config manager not set, skip reload");
            return ReloadOutcome::NotConfigured;
        };

        let mut decoded = match manager.decode(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Failed to parse the config file, keeping current configuration");
                return ReloadOutcome::DecodeFailed;
            }
        };

        let Some(config) = decoded.remove(&self.key) else {
            tracing::warn!(key = %self.key, "No matching key found in config file, skip");
            return ReloadOutcome::KeyMissing;
        };

        self.config.store(Some(Arc::new(config)));
        self.reloads.fetch_add(1, Ordering::Relaxed);

        let callbacks = self.callbacks.snapshot();
        for (name, callback) in &callbacks {
            invoke_isolated(name, || callback());
        }
        tracing::info!(key = %self.key, callbacks = callbacks.len(), "Config parse and update complete");
        ReloadOutcome::Applied
    }
}

/// Watches one routing key of a shared config file.
///
/// Cloning yields another handle to the same monitor.
pub struct ConfigMonitor<C> {
    inner: Arc<MonitorInner<C>>,
}

impl<C> Clone for ConfigMonitor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> fmt::Debug for ConfigMonitor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigMonitor")
            .field("key", &self.inner.key)
            .field("file", &self.inner.source.file_path())
            .field("callbacks", &self.inner.callbacks.keys())
            .finish()
    }
}

impl<C: DeserializeOwned + Send + Sync + 'static> ConfigMonitor<C> {
    /// Create a monitor for `key` on the given file source.
    pub fn new(key: impl Into<String>, source: Arc<dyn ChangeSource>) -> Result<Self, MonitorError> {
        let key = key.into();
        if key.is_empty() {
            return Err(MonitorError::InvalidArgument("empty config key"));
        }

        Ok(Self {
            inner: Arc::new(MonitorInner {
                key,
                source,
                manager: RwLock::new(None),
                config: ArcSwapOption::empty(),
                callbacks: CallbackRegistry::new(DuplicatePolicy::Overwrite),
                started: AtomicBool::new(false),
                reloads: AtomicU64::new(0),
                reload_lock: Mutex::new(()),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Snapshot of the last applied config, if any reload has succeeded.
    pub fn config(&self) -> Option<Arc<C>> {
        self.inner.config.load_full()
    }

    /// Number of reloads that replaced the cached config.
    pub fn reload_count(&self) -> u64 {
        self.inner.reloads.load(Ordering::Relaxed)
    }

    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.len()
    }

    /// Set the decoder used for every reload. Required before [`start`].
    ///
    /// [`start`]: ConfigMonitor::start
    pub fn set_manager(&self, manager: ConfigManager<C>) {
        *self.inner.manager.write() = Some(manager);
    }

    /// Apply the file's current contents, then subscribe to later writes.
    ///
    /// A second call while started fails without touching the cached config.
    pub fn start(&self) -> Result<(), MonitorError> {
        if self.inner.manager.read().is_none() {
            return Err(MonitorError::NotConfigured(self.inner.key.clone()));
        }
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MonitorError::AlreadyStarted(self.inner.key.clone()));
        }

        if let Err(e) = self.subscribe_source() {
            self.inner.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        tracing::info!(
            key = %self.inner.key,
            file = %self.inner.source.file_path().display(),
            "Config monitor started"
        );
        Ok(())
    }

    fn subscribe_source(&self) -> Result<(), MonitorError> {
        let data = self.inner.source.read_contents()?;
        self.inner.parse_handler(&data);

        let weak = Arc::downgrade(&self.inner);
        self.inner.source.register_callback(
            &self.inner.key,
            Arc::new(move |data: &[u8]| {
                if let Some(inner) = weak.upgrade() {
                    inner.parse_handler(data);
                }
            }),
        )?;
        Ok(())
    }

    /// Drop every downstream callback, then unsubscribe from the file source.
    pub fn stop(&self) {
        for key in self.inner.callbacks.keys() {
            self.deregister_callback(&key);
        }
        if self.inner.started.swap(false, Ordering::SeqCst) {
            self.inner.source.deregister_callback(&self.inner.key);
            tracing::info!(key = %self.inner.key, "Config monitor stopped");
        }
    }

    /// Register a callback under `key`. An existing callback with the same
    /// key is replaced in place.
    pub fn register_callback(&self, key: &str, callback: impl Fn() + Send + Sync + 'static) {
        if self.inner.callbacks.contains(key) {
            tracing::debug!(key = %self.inner.key, callback = key, "Replacing config monitor callback");
        }
        self.inner.callbacks.register(key, Arc::new(callback));
    }

    pub fn deregister_callback(&self, key: &str) {
        if !self.inner.callbacks.deregister(key) {
            tracing::warn!(key = %self.inner.key, callback = key, "Config monitor callback not registered");
        }
    }

    /// Run one reload cycle over `data`.
    ///
    /// The file source calls this on every write; it is public so hosts can
    /// force a reload from bytes they already hold.
    pub fn parse_handler(&self, data: &[u8]) -> ReloadOutcome {
        self.inner.parse_handler(data)
    }

    /// A handle that does not keep the monitor alive.
    pub fn downgrade(&self) -> WeakConfigMonitor<C> {
        WeakConfigMonitor {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning monitor handle held by callbacks registered on the monitor.
pub struct WeakConfigMonitor<C> {
    inner: Weak<MonitorInner<C>>,
}

impl<C> Clone for WeakConfigMonitor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> WeakConfigMonitor<C> {
    pub fn upgrade(&self) -> Option<ConfigMonitor<C>> {
        self.inner.upgrade().map(|inner| ConfigMonitor { inner })
    }
}
