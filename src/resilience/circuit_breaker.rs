//! Circuit breaker thresholds.
//!
//! Thresholds are stored per service method under `"<to_service>/<method>"`.
//! The breaker state machine itself belongs to the host runtime; this module
//! only keeps the thresholds it reads in sync with the config file.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::key::KEY_SEPARATOR;
use crate::config::monitor::ConfigMonitor;
use crate::config::schema::{CircuitBreakerConfig, ClientFileConfig};
use crate::config::validation::validate_circuit_breaker;
use crate::observability::metrics;
use crate::resilience::reconcile::{subscribe, ShadowSet};

/// Monitor callback key for the circuit breaker adapter.
pub const CIRCUIT_BREAKER_CALLBACK: &str = "circuit_breaker";

/// Breaker key for one method of `to_service`.
pub fn service_cb_key(to_service: &str, method: &str) -> String {
    let mut key = String::with_capacity(to_service.len() + method.len() + 1);
    key.push_str(to_service);
    key.push(KEY_SEPARATOR);
    key.push_str(method);
    key
}

/// Live breaker thresholds, keyed by [`service_cb_key`].
#[derive(Debug, Default)]
pub struct CircuitBreakerSuite {
    configs: DashMap<String, CircuitBreakerConfig>,
    closed: AtomicBool,
}

impl CircuitBreakerSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_service_cb_config(&self, key: &str, config: CircuitBreakerConfig) {
        if self.is_closed() {
            tracing::debug!(cb_key = key, "Circuit breaker suite closed, ignore update");
            return;
        }
        self.configs.insert(key.to_string(), config);
    }

    /// Thresholds for `key`; the default when none were configured.
    pub fn service_cb_config(&self, key: &str) -> CircuitBreakerConfig {
        self.configs
            .get(key)
            .map(|r| *r.value())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop every stored threshold and refuse later updates.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.configs.clear();
            tracing::debug!("Circuit breaker suite closed");
        }
    }
}

/// Feeds the circuit breaker section of a client config into a
/// [`CircuitBreakerSuite`].
#[derive(Debug)]
pub struct CircuitBreakerAdapter {
    key: String,
    to_service: String,
    suite: Arc<CircuitBreakerSuite>,
    applied: ShadowSet,
}

impl CircuitBreakerAdapter {
    pub fn new(key: impl Into<String>, to_service: impl Into<String>, suite: Arc<CircuitBreakerSuite>) -> Self {
        Self {
            key: key.into(),
            to_service: to_service.into(),
            suite,
            applied: ShadowSet::new(),
        }
    }

    pub fn suite(&self) -> &Arc<CircuitBreakerSuite> {
        &self.suite
    }

    pub fn reconcile(&self, config: &ClientFileConfig) {
        let mut applied = self.applied.lock();
        let mut present = HashSet::with_capacity(config.circuitbreaker.len());

        for (method, cb) in &config.circuitbreaker {
            present.insert(method.clone());

            if let Err(e) = validate_circuit_breaker(cb) {
                tracing::warn!(key = %self.key, method = %method, error = %e, "Skip invalid circuit breaker config");
                metrics::record_policy_skipped("circuit_breaker");
                continue;
            }

            self.suite
                .update_service_cb_config(&service_cb_key(&self.to_service, method), *cb);
            tracing::debug!(key = %self.key, method = %method, "Circuit breaker config updated");
        }

        for method in applied.diff_and_emplace(present) {
            tracing::info!(key = %self.key, method = %method, "Circuit breaker config removed, revert to default");
            self.suite.update_service_cb_config(
                &service_cb_key(&self.to_service, &method),
                CircuitBreakerConfig::default(),
            );
        }

        metrics::record_policy_methods(&self.key, "circuit_breaker", applied.len());
    }
}

/// Create a breaker suite for calls to `to_service`, kept in sync with
/// `monitor`.
pub fn init_circuit_breaker(
    monitor: &ConfigMonitor<ClientFileConfig>,
    to_service: &str,
) -> Arc<CircuitBreakerSuite> {
    let suite = Arc::new(CircuitBreakerSuite::new());
    let adapter = Arc::new(CircuitBreakerAdapter::new(monitor.key(), to_service, suite.clone()));
    subscribe(monitor, CIRCUIT_BREAKER_CALLBACK, adapter, CircuitBreakerAdapter::reconcile);
    suite
}
