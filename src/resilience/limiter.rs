//! Server connection and QPS limits.
//!
//! The host runtime owns the actual limiter and hands an updater back through
//! [`LimiterControl::update_control`], possibly after the first reload has
//! already happened. Until then reloads only record the latest option.
//! Installing the updater and publishing a reload both run under the updater
//! lock, so an updater never misses a publish that raced with its install.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::config::monitor::ConfigMonitor;
use crate::config::schema::ServerFileConfig;
use crate::resilience::reconcile::subscribe;

/// Monitor callback key for the limiter adapter.
pub const LIMITER_CALLBACK: &str = "limiter";

/// Limits pushed to the host runtime. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterOption {
    pub max_connections: u64,
    pub max_qps: u64,
}

/// Host-side handle that applies new limits to a running server.
pub trait LimitUpdater: Send + Sync {
    /// Returns `false` if the limits could not be applied.
    fn update_limit(&self, option: &LimiterOption) -> bool;
}

/// Latest limits plus the updater they are published to.
pub struct LimiterControl {
    key: String,
    option: ArcSwap<LimiterOption>,
    updater: RwLock<Option<Arc<dyn LimitUpdater>>>,
}

impl std::fmt::Debug for LimiterControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterControl")
            .field("key", &self.key)
            .field("option", &**self.option.load())
            .field("has_updater", &self.has_updater())
            .finish()
    }
}

impl LimiterControl {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            option: ArcSwap::from_pointee(LimiterOption::default()),
            updater: RwLock::new(None),
        }
    }

    /// The latest limits read from the file.
    pub fn option(&self) -> LimiterOption {
        **self.option.load()
    }

    pub fn has_updater(&self) -> bool {
        self.updater.read().is_some()
    }

    /// Install the host's updater and push the current limits to it.
    pub fn update_control(&self, updater: Arc<dyn LimitUpdater>) {
        let mut slot = self.updater.write();
        let option = self.option();
        tracing::debug!(key = %self.key, ?option, "Server file limiter updater init");
        updater.update_limit(&option);
        *slot = Some(updater);
    }

    /// Record new limits and publish them if an updater is installed.
    pub fn publish(&self, option: LimiterOption) {
        // Write lock: publishes reach the updater in the order they were stored.
        let slot = self.updater.write();
        self.option.store(Arc::new(option));

        let Some(updater) = slot.as_ref() else {
            tracing::warn!(key = %self.key, "Server limiter config: failed as the updater is empty");
            return;
        };
        if !updater.update_limit(&option) {
            tracing::warn!(key = %self.key, "Server limiter config: update may not take effect");
        }
    }

    pub fn reconcile(&self, config: &ServerFileConfig) {
        self.publish(LimiterOption {
            max_connections: config.limit.connection_limit,
            max_qps: config.limit.qps_limit,
        });
    }
}

/// Create a limiter control kept in sync with `monitor`.
pub fn init_limiter(monitor: &ConfigMonitor<ServerFileConfig>) -> Arc<LimiterControl> {
    let control = Arc::new(LimiterControl::new(monitor.key()));
    subscribe(monitor, LIMITER_CALLBACK, control.clone(), LimiterControl::reconcile);
    control
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LimiterConfig;
    use crossbeam_channel::{bounded, Receiver, Sender};
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingUpdater {
        seen: Mutex<Vec<LimiterOption>>,
        accept: bool,
    }

    impl LimitUpdater for RecordingUpdater {
        fn update_limit(&self, option: &LimiterOption) -> bool {
            self.seen.lock().push(*option);
            self.accept
        }
    }

    /// Blocks inside its first `update_limit` until released.
    struct GatedUpdater {
        seen: Mutex<Vec<LimiterOption>>,
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl LimitUpdater for GatedUpdater {
        fn update_limit(&self, option: &LimiterOption) -> bool {
            let first = {
                let mut seen = self.seen.lock();
                seen.push(*option);
                seen.len() == 1
            };
            if first {
                let _ = self.entered.send(());
                let _ = self.release.recv();
            }
            true
        }
    }

    fn server(connection_limit: u64, qps_limit: u64) -> ServerFileConfig {
        ServerFileConfig {
            limit: LimiterConfig {
                connection_limit,
                qps_limit,
            },
        }
    }

    #[test]
    fn test_reload_before_updater_is_kept() {
        let control = LimiterControl::new("a/b");
        control.reconcile(&server(10, 100));
        assert_eq!(
            control.option(),
            LimiterOption {
                max_connections: 10,
                max_qps: 100
            }
        );

        let updater = Arc::new(RecordingUpdater {
            accept: true,
            ..Default::default()
        });
        control.update_control(updater.clone());
        assert_eq!(*updater.seen.lock(), vec![control.option()]);
    }

    #[test]
    fn test_publish_reaches_updater() {
        let control = LimiterControl::new("a/b");
        let updater = Arc::new(RecordingUpdater::default());
        control.update_control(updater.clone());

        control.reconcile(&server(1, 2));
        control.reconcile(&server(3, 4));

        let seen = updater.seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], LimiterOption::default());
        assert_eq!(seen[2].max_qps, 4);
    }

    #[test]
    fn test_publish_during_updater_install_reaches_updater() {
        let control = Arc::new(LimiterControl::new("a/b"));
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let updater = Arc::new(GatedUpdater {
            seen: Mutex::new(Vec::new()),
            entered: entered_tx,
            release: release_rx,
        });

        let installer = {
            let control = control.clone();
            let updater = updater.clone();
            thread::spawn(move || control.update_control(updater))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let publisher = {
            let control = control.clone();
            thread::spawn(move || control.reconcile(&server(10, 100)))
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();
        installer.join().unwrap();
        publisher.join().unwrap();

        let current = control.option();
        assert_eq!(
            current,
            LimiterOption {
                max_connections: 10,
                max_qps: 100
            }
        );
        assert_eq!(updater.seen.lock().last(), Some(&current));
    }
}
