//! Live RPC policies fed by config reloads.
//!
//! # Data Flow
//! ```text
//! ConfigMonitor<ClientFileConfig> reload
//!     → retries.rs         (RetryContainer, per method)
//!     → circuit_breaker.rs (CircuitBreakerSuite, per to_service/method)
//!     → timeouts.rs        (TimeoutContainer, per method)
//! ConfigMonitor<ServerFileConfig> reload
//!     → limiter.rs         (LimiterControl → host LimitUpdater)
//! ```
//!
//! # Design Decisions
//! - Each adapter owns its shadow set (reconcile.rs); nothing is global
//! - Present methods are always re-applied, removed ones reverted to default
//! - An invalid method is skipped for one reload; the adapter keeps running
//! - Containers are concurrent maps so request paths read them during reloads

pub mod backoff;
pub mod circuit_breaker;
pub mod limiter;
pub mod reconcile;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{init_circuit_breaker, service_cb_key, CircuitBreakerSuite};
pub use limiter::{init_limiter, LimitUpdater, LimiterControl, LimiterOption};
pub use reconcile::{ShadowGuard, ShadowSet};
pub use retries::{init_retry_container, RetryContainer};
pub use timeouts::{init_rpc_timeout, TimeoutContainer, TimeoutProvider};
