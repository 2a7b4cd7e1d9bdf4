//! Configuration schema definitions.
//!
//! A config file is a map from routing key to one of the records below.
//! Method-keyed maps accept the wildcard `"*"`, which applies to every method
//! not listed explicitly. All types derive Serde traits so any supported file
//! format can carry them.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Method name that matches every method without its own entry.
pub const WILDCARD_METHOD: &str = "*";

/// Per routing key config consumed by an RPC client.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientFileConfig {
    /// Method -> timeout.
    pub timeout: HashMap<String, RpcTimeout>,

    /// Method -> retry policy.
    pub retry: HashMap<String, RetryPolicy>,

    /// Method -> circuit breaker thresholds.
    pub circuitbreaker: HashMap<String, CircuitBreakerConfig>,
}

/// Per routing key config consumed by an RPC server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerFileConfig {
    pub limit: LimiterConfig,
}

/// Connection and QPS limits. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub connection_limit: u64,
    pub qps_limit: u64,
}

/// Timeouts for one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcTimeout {
    /// Whole-call timeout in milliseconds. Zero disables it.
    pub rpc_timeout_ms: u64,

    /// Connection establishment timeout in milliseconds.
    pub conn_timeout_ms: u64,
}

impl Default for RpcTimeout {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 0,
            conn_timeout_ms: 50,
        }
    }
}

impl RpcTimeout {
    pub fn rpc_timeout(&self) -> Option<Duration> {
        (self.rpc_timeout_ms > 0).then(|| Duration::from_millis(self.rpc_timeout_ms))
    }

    pub fn conn_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_timeout_ms)
    }
}

/// Circuit breaker thresholds for one method.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enable: bool,

    /// Error rate that trips the breaker, in `[0, 1]`.
    pub err_rate: f64,

    /// Minimum samples in the window before the rate is evaluated.
    pub min_sample: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enable: true,
            err_rate: 0.5,
            min_sample: 200,
        }
    }
}

/// Which retry mechanism a policy uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RetryType {
    /// Retry after a failed call.
    #[default]
    Failure,
    /// Send a backup request when the first one is slow.
    Backup,
}

impl TryFrom<u8> for RetryType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RetryType::Failure),
            1 => Ok(RetryType::Backup),
            other => Err(format!("unknown retry type: {}", other)),
        }
    }
}

impl From<RetryType> for u8 {
    fn from(value: RetryType) -> Self {
        match value {
            RetryType::Failure => 0,
            RetryType::Backup => 1,
        }
    }
}

/// Retry policy for one method.
///
/// Exactly one of `failure_policy` and `backup_policy` must be set for the
/// policy to be applied. The default policy is disabled and is what a method
/// reverts to when its entry disappears from the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub enable: bool,

    #[serde(rename = "type")]
    pub retry_type: RetryType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_policy: Option<BackupPolicy>,
}

/// When to stop retrying.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StopPolicy {
    pub max_retry_times: u32,
    pub max_duration_ms: u64,
    pub disable_chain_stop: bool,
    pub ddl_stop: bool,
    pub cb_policy: RetryCircuitBreakerPolicy,
}

/// Error rate above which retries stop.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryCircuitBreakerPolicy {
    pub error_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffType {
    #[default]
    None,
    Fixed,
    Random,
}

/// Delay between failure retries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub backoff_type: BackoffType,

    /// Backoff parameters, e.g. `fix_ms`, `min_ms`, `max_ms`.
    pub cfg_items: HashMap<String, f64>,
}

/// Retry-on-failure settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailurePolicy {
    pub stop_policy: StopPolicy,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_policy: Option<BackoffPolicy>,

    pub retry_same_node: bool,
}

/// Backup request settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupPolicy {
    pub retry_delay_ms: u64,
    pub stop_policy: StopPolicy,
    pub retry_same_node: bool,
}
