//! Diff-and-reconcile bookkeeping shared by the policy adapters.
//!
//! Each adapter remembers which method names it applied last time. On every
//! reload it applies what is present now, then reverts whatever dropped out
//! of the file to the domain default. An adapter holds its [`ShadowGuard`]
//! for the whole reconcile so concurrent reloads cannot interleave pushes
//! and reverts.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;

use crate::config::monitor::ConfigMonitor;

/// Method names an adapter applied in its previous reload.
#[derive(Debug, Default)]
pub struct ShadowSet {
    // `None` until the first reload.
    applied: Mutex<Option<HashSet<String>>>,
}

impl ShadowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the set until the returned guard is dropped.
    pub fn lock(&self) -> ShadowGuard<'_> {
        ShadowGuard {
            applied: self.applied.lock(),
        }
    }

    /// Replace the set with `current` and return the previous names missing
    /// from it, sorted.
    pub fn diff_and_emplace(&self, current: HashSet<String>) -> Vec<String> {
        self.lock().diff_and_emplace(current)
    }

    /// `true` once the first reload has been reconciled.
    pub fn is_active(&self) -> bool {
        self.applied.lock().is_some()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.applied
            .lock()
            .as_ref()
            .is_some_and(|set| set.contains(method))
    }

    pub fn len(&self) -> usize {
        self.applied.lock().as_ref().map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applied names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .applied
            .lock()
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Exclusive access to a [`ShadowSet`] for the span of one reconcile.
pub struct ShadowGuard<'a> {
    applied: MutexGuard<'a, Option<HashSet<String>>>,
}

impl ShadowGuard<'_> {
    /// See [`ShadowSet::diff_and_emplace`].
    pub fn diff_and_emplace(&mut self, current: HashSet<String>) -> Vec<String> {
        let mut removed: Vec<String> = match self.applied.as_ref() {
            Some(previous) => previous.difference(&current).cloned().collect(),
            None => Vec::new(),
        };
        removed.sort();
        *self.applied = Some(current);
        removed
    }

    pub fn len(&self) -> usize {
        self.applied.as_ref().map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Register `apply` on `monitor` under `callback_key`; every reload feeds it
/// the monitor's freshly cached config.
pub(crate) fn subscribe<C, A>(
    monitor: &ConfigMonitor<C>,
    callback_key: &str,
    adapter: Arc<A>,
    apply: fn(&A, &C),
) where
    C: DeserializeOwned + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let weak = monitor.downgrade();
    let name = callback_key.to_string();
    monitor.register_callback(callback_key, move || {
        let Some(monitor) = weak.upgrade() else {
            return;
        };
        match monitor.config() {
            Some(config) => apply(&adapter, &config),
            None => tracing::warn!(key = monitor.key(), callback = %name, "No config cached, skip policy update"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_emplace_removes_nothing() {
        let shadow = ShadowSet::new();
        assert!(!shadow.is_active());
        assert!(shadow.diff_and_emplace(set(&["A", "B"])).is_empty());
        assert!(shadow.is_active());
        assert_eq!(shadow.names(), vec!["A", "B"]);
    }

    #[test]
    fn test_diff_returns_vanished_names() {
        let shadow = ShadowSet::new();
        shadow.diff_and_emplace(set(&["A", "B", "C"]));

        let removed = shadow.diff_and_emplace(set(&["B", "C", "D"]));
        assert_eq!(removed, vec!["A"]);
        assert_eq!(shadow.names(), vec!["B", "C", "D"]);
        assert!(!shadow.contains("A"));
    }

    #[test]
    fn test_emptying_removes_all() {
        let shadow = ShadowSet::new();
        shadow.diff_and_emplace(set(&["x", "y"]));
        assert_eq!(shadow.diff_and_emplace(HashSet::new()), vec!["x", "y"]);
        assert!(shadow.is_empty());
        assert!(shadow.is_active());
    }

    #[test]
    fn test_guard_holds_set_across_diffs() {
        let shadow = ShadowSet::new();
        {
            let mut guard = shadow.lock();
            assert!(guard.diff_and_emplace(set(&["A"])).is_empty());
            assert_eq!(guard.diff_and_emplace(set(&["B"])), vec!["A"]);
            assert_eq!(guard.len(), 1);
        }
        assert_eq!(shadow.names(), vec!["B"]);
    }
}
