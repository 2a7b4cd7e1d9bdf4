//! Per-method policy validation.
//!
//! Validation runs inside a reload, per method. A rejected method is skipped
//! for that reload only; it never aborts the reload or disables an adapter.

use thiserror::Error;

use crate::config::schema::{CircuitBreakerConfig, RetryPolicy};

/// A policy record that cannot be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("backup_policy and failure_policy must not be set at the same time")]
    ConflictingRetryPolicies,

    #[error("backup_policy and failure_policy must not both be empty")]
    MissingRetryPolicy,

    #[error("err_rate must be within [0, 1], got {0}")]
    ErrorRateOutOfRange(f64),
}

/// Check that a retry policy sets exactly one of its sub-policies.
pub fn validate_retry_policy(policy: &RetryPolicy) -> Result<(), ValidationError> {
    match (&policy.backup_policy, &policy.failure_policy) {
        (Some(_), Some(_)) => Err(ValidationError::ConflictingRetryPolicies),
        (None, None) => Err(ValidationError::MissingRetryPolicy),
        _ => Ok(()),
    }
}

/// Check that a breaker's error rate is a usable ratio.
pub fn validate_circuit_breaker(config: &CircuitBreakerConfig) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&config.err_rate) {
        Ok(())
    } else {
        Err(ValidationError::ErrorRateOutOfRange(config.err_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackupPolicy, FailurePolicy};

    #[test]
    fn test_retry_policy_exclusivity() {
        let mut policy = RetryPolicy::default();
        assert_eq!(
            validate_retry_policy(&policy),
            Err(ValidationError::MissingRetryPolicy)
        );

        policy.failure_policy = Some(FailurePolicy::default());
        assert_eq!(validate_retry_policy(&policy), Ok(()));

        policy.backup_policy = Some(BackupPolicy::default());
        assert_eq!(
            validate_retry_policy(&policy),
            Err(ValidationError::ConflictingRetryPolicies)
        );

        policy.failure_policy = None;
        assert_eq!(validate_retry_policy(&policy), Ok(()));
    }

    #[test]
    fn test_circuit_breaker_rate_range() {
        let mut config = CircuitBreakerConfig::default();
        assert!(validate_circuit_breaker(&config).is_ok());

        config.err_rate = 1.5;
        assert_eq!(
            validate_circuit_breaker(&config),
            Err(ValidationError::ErrorRateOutOfRange(1.5))
        );

        config.err_rate = f64::NAN;
        assert!(validate_circuit_breaker(&config).is_err());
    }
}
