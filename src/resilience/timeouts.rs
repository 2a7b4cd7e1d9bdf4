//! RPC timeouts.
//!
//! # Responsibilities
//! - Hold the live per-method timeouts read when a call is issued
//! - Apply each reload's timeout section
//!
//! # Design Decisions
//! - Lookups fall back from the method to the `"*"` entry to the default
//! - A method removed from the file is pinned to the default, like the other
//!   policy domains

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::monitor::ConfigMonitor;
use crate::config::schema::{ClientFileConfig, RpcTimeout, WILDCARD_METHOD};
use crate::observability::metrics;
use crate::resilience::reconcile::{subscribe, ShadowSet};

/// Monitor callback key for the timeout adapter.
pub const RPC_TIMEOUT_CALLBACK: &str = "rpc_timeout";

/// Source of per-method timeouts for the host runtime.
pub trait TimeoutProvider: Send + Sync {
    fn timeouts(&self, method: &str) -> RpcTimeout;
}

/// Live timeouts, keyed by method.
#[derive(Debug, Default)]
pub struct TimeoutContainer {
    timeouts: DashMap<String, RpcTimeout>,
}

impl TimeoutContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_policy_change(&self, method: &str, timeout: RpcTimeout) {
        self.timeouts.insert(method.to_string(), timeout);
    }

    pub fn get(&self, method: &str) -> Option<RpcTimeout> {
        self.timeouts.get(method).map(|r| *r.value())
    }

    pub fn len(&self) -> usize {
        self.timeouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeouts.is_empty()
    }
}

impl TimeoutProvider for TimeoutContainer {
    fn timeouts(&self, method: &str) -> RpcTimeout {
        self.get(method)
            .or_else(|| self.get(WILDCARD_METHOD))
            .unwrap_or_default()
    }
}

/// Feeds the timeout section of a client config into a [`TimeoutContainer`].
#[derive(Debug)]
pub struct TimeoutAdapter {
    key: String,
    container: Arc<TimeoutContainer>,
    applied: ShadowSet,
}

impl TimeoutAdapter {
    pub fn new(key: impl Into<String>, container: Arc<TimeoutContainer>) -> Self {
        Self {
            key: key.into(),
            container,
            applied: ShadowSet::new(),
        }
    }

    pub fn container(&self) -> &Arc<TimeoutContainer> {
        &self.container
    }

    pub fn reconcile(&self, config: &ClientFileConfig) {
        let mut applied = self.applied.lock();
        let mut present = HashSet::with_capacity(config.timeout.len());
        for (method, timeout) in &config.timeout {
            present.insert(method.clone());
            self.container.notify_policy_change(method, *timeout);
        }

        for method in applied.diff_and_emplace(present) {
            tracing::info!(key = %self.key, method = %method, "Timeout config removed, revert to default");
            self.container
                .notify_policy_change(&method, RpcTimeout::default());
        }

        tracing::debug!(key = %self.key, methods = applied.len(), "Timeout config updated");
        metrics::record_policy_methods(&self.key, "rpc_timeout", applied.len());
    }
}

/// Create a timeout container kept in sync with `monitor`.
pub fn init_rpc_timeout(monitor: &ConfigMonitor<ClientFileConfig>) -> Arc<TimeoutContainer> {
    let container = Arc::new(TimeoutContainer::new());
    let adapter = Arc::new(TimeoutAdapter::new(monitor.key(), container.clone()));
    subscribe(monitor, RPC_TIMEOUT_CALLBACK, adapter, TimeoutAdapter::reconcile);
    container
}
