//! Retry policies.
//!
//! # Responsibilities
//! - Hold the live per-method retry policy read by request paths
//! - Apply each reload's retry section, skipping invalid methods
//! - Revert methods removed from the file to the disabled default
//!
//! # Design Decisions
//! - A method whose policy fails validation keeps its previous policy
//! - Lookups fall back from the method to the `"*"` entry to the default

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::monitor::ConfigMonitor;
use crate::config::schema::{ClientFileConfig, RetryPolicy, WILDCARD_METHOD};
use crate::config::validation::validate_retry_policy;
use crate::observability::metrics;
use crate::resilience::backoff::retry_delay;
use crate::resilience::reconcile::{subscribe, ShadowSet};

/// Monitor callback key for the retry adapter.
pub const RETRY_CALLBACK: &str = "retry";

/// Live retry policies, keyed by method.
#[derive(Debug, Default)]
pub struct RetryContainer {
    policies: DashMap<String, RetryPolicy>,
}

impl RetryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy for `method`, replacing any previous one.
    pub fn notify_policy_change(&self, method: &str, policy: RetryPolicy) {
        self.policies.insert(method.to_string(), policy);
    }

    /// Reset `method` to the disabled default policy.
    pub fn revert_to_default(&self, method: &str) {
        self.policies.insert(method.to_string(), RetryPolicy::default());
    }

    /// The entry stored for exactly `method`.
    pub fn policy(&self, method: &str) -> Option<RetryPolicy> {
        self.policies.get(method).map(|r| r.value().clone())
    }

    /// The policy a call to `method` should use.
    pub fn effective_policy(&self, method: &str) -> RetryPolicy {
        self.policy(method)
            .or_else(|| self.policy(WILDCARD_METHOD))
            .unwrap_or_default()
    }

    /// Wait before the next failure retry of `method`. Zero unless the
    /// effective policy is an enabled failure policy with a backoff.
    pub fn backoff_delay(&self, method: &str) -> Duration {
        let policy = self.effective_policy(method);
        if !policy.enable {
            return Duration::ZERO;
        }
        let backoff = policy
            .failure_policy
            .as_ref()
            .and_then(|f| f.backoff_policy.as_ref());
        retry_delay(backoff)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Feeds the retry section of a client config into a [`RetryContainer`].
#[derive(Debug)]
pub struct RetryAdapter {
    key: String,
    container: Arc<RetryContainer>,
    applied: ShadowSet,
}

impl RetryAdapter {
    pub fn new(key: impl Into<String>, container: Arc<RetryContainer>) -> Self {
        Self {
            key: key.into(),
            container,
            applied: ShadowSet::new(),
        }
    }

    pub fn container(&self) -> &Arc<RetryContainer> {
        &self.container
    }

    pub fn is_active(&self) -> bool {
        self.applied.is_active()
    }

    /// Method names seen in the last reconciled config.
    pub fn applied_methods(&self) -> Vec<String> {
        self.applied.names()
    }

    pub fn reconcile(&self, config: &ClientFileConfig) {
        let mut applied = self.applied.lock();
        let mut present = HashSet::with_capacity(config.retry.len());

        for (method, policy) in &config.retry {
            present.insert(method.clone());

            if let Err(e) = validate_retry_policy(policy) {
                tracing::warn!(key = %self.key, method = %method, error = %e, "Skip invalid retry policy");
                metrics::record_policy_skipped("retry");
                continue;
            }

            self.container.notify_policy_change(method, policy.clone());
            tracing::debug!(key = %self.key, method = %method, "Retry policy updated");
        }

        for method in applied.diff_and_emplace(present) {
            tracing::info!(key = %self.key, method = %method, "Retry policy removed, revert to default");
            self.container.revert_to_default(&method);
        }

        metrics::record_policy_methods(&self.key, "retry", applied.len());
    }
}

/// Create a retry container kept in sync with `monitor`.
pub fn init_retry_container(monitor: &ConfigMonitor<ClientFileConfig>) -> Arc<RetryContainer> {
    let container = Arc::new(RetryContainer::new());
    let adapter = Arc::new(RetryAdapter::new(monitor.key(), container.clone()));
    subscribe(monitor, RETRY_CALLBACK, adapter, RetryAdapter::reconcile);
    container
}
