//! Delay between failure retries, derived from a [`BackoffPolicy`].

use std::time::Duration;

use rand::Rng;

use crate::config::schema::{BackoffPolicy, BackoffType};

/// `cfg_items` key of the fixed delay.
pub const FIX_MS: &str = "fix_ms";
/// `cfg_items` key of the lower bound of a random delay.
pub const MIN_MS: &str = "min_ms";
/// `cfg_items` key of the upper bound of a random delay.
pub const MAX_MS: &str = "max_ms";

fn item_ms(policy: &BackoffPolicy, name: &str) -> u64 {
    policy
        .cfg_items
        .get(name)
        .filter(|v| v.is_finite() && **v > 0.0)
        .map_or(0, |v| *v as u64)
}

/// Delay to wait before the next retry.
pub fn retry_delay(policy: Option<&BackoffPolicy>) -> Duration {
    let Some(policy) = policy else {
        return Duration::ZERO;
    };

    match policy.backoff_type {
        BackoffType::None => Duration::ZERO,
        BackoffType::Fixed => Duration::from_millis(item_ms(policy, FIX_MS)),
        BackoffType::Random => {
            let min = item_ms(policy, MIN_MS);
            let max = item_ms(policy, MAX_MS);
            if max <= min {
                return Duration::from_millis(min);
            }
            Duration::from_millis(rand::thread_rng().gen_range(min..max))
        }
    }
}
