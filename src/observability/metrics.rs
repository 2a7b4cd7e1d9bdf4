//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_reloads_total` (counter): reload attempts by routing key and
//!   outcome (`applied`, `decode_error`, `key_missing`, `not_configured`)
//! - `config_callback_panics_total` (counter): callbacks that panicked
//! - `config_policy_skipped_total` (counter): methods skipped by validation,
//!   by policy domain
//! - `config_policy_methods` (gauge): methods in an adapter's last reload
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is opt-in via [`init_metrics`]

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const RELOADS_TOTAL: &str = "config_reloads_total";
pub const CALLBACK_PANICS_TOTAL: &str = "config_callback_panics_total";
pub const POLICY_SKIPPED_TOTAL: &str = "config_policy_skipped_total";
pub const POLICY_METHODS: &str = "config_policy_methods";

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_reload(key: &str, outcome: &'static str) {
    ::metrics::counter!(RELOADS_TOTAL, "key" => key.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_callback_panic() {
    ::metrics::counter!(CALLBACK_PANICS_TOTAL).increment(1);
}

pub fn record_policy_skipped(domain: &'static str) {
    ::metrics::counter!(POLICY_SKIPPED_TOTAL, "domain" => domain).increment(1);
}

pub fn record_policy_methods(key: &str, domain: &'static str, methods: usize) {
    ::metrics::gauge!(POLICY_METHODS, "key" => key.to_string(), "domain" => domain).set(methods as f64);
}
