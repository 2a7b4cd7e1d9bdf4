//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::registry::invoke_isolated;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            tracing::info!(subscribers = self.tx.receiver_count(), "Shutdown triggered");
            let _ = self.tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Number of receivers still waiting.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run `stop` on a tokio task once shutdown is triggered, e.g. to stop a
    /// config monitor or file watcher. Runs immediately if shutdown already
    /// happened. Must be called within a tokio runtime.
    pub fn stop_on_shutdown(&self, name: &str, stop: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        let already = self.is_triggered();
        let name = name.to_string();

        tokio::spawn(async move {
            if !already {
                // Closed means the coordinator is gone, which also ends the process.
                let _ = rx.recv().await;
            }
            tracing::debug!(hook = %name, "Running shutdown hook");
            invoke_isolated(&name, stop);
        })
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_hook_runs_once_on_trigger() {
        let shutdown = Shutdown::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let handle = shutdown.stop_on_shutdown("watcher", move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        shutdown.trigger();
        shutdown.trigger();
        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hook_after_trigger_runs_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        shutdown
            .stop_on_shutdown("late", move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_hook_is_contained() {
        let shutdown = Shutdown::new();
        let handle = shutdown.stop_on_shutdown("boom", || panic!("hook failed"));
        shutdown.trigger();
        assert!(handle.await.is_ok());
    }
}
