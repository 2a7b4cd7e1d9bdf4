//! Keyed callback registry.
//!
//! Shared by the file watcher (one entry per monitor) and by each monitor
//! (one entry per policy adapter). Entries keep registration order, and
//! dispatch runs against a snapshot so a callback may add or remove entries
//! without deadlocking the registry.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::observability::metrics;

/// What happens when a key is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Keep the existing entry and refuse the new one.
    Reject,
    /// Replace the callback, keeping the original position.
    Overwrite,
}

/// Ordered `key -> callback` map.
pub struct CallbackRegistry<F: ?Sized> {
    entries: RwLock<Vec<(String, Arc<F>)>>,
    duplicates: DuplicatePolicy,
}

impl<F: ?Sized> CallbackRegistry<F> {
    pub fn new(duplicates: DuplicatePolicy) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            duplicates,
        }
    }

    /// Add a callback. Returns `false` if the key exists and the registry
    /// rejects duplicates.
    pub fn register(&self, key: &str, callback: Arc<F>) -> bool {
        let mut entries = self.entries.write();
        if let Some(slot) = entries.iter_mut().find(|(k, _)| k == key) {
            return match self.duplicates {
                DuplicatePolicy::Reject => false,
                DuplicatePolicy::Overwrite => {
                    slot.1 = callback;
                    true
                }
            };
        }
        entries.push((key.to_string(), callback));
        true
    }

    /// Remove a callback. Returns `false` if the key was not registered.
    pub fn deregister(&self, key: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        entries.len() != before
    }

    pub fn get(&self, key: &str) -> Option<Arc<F>> {
        self.entries
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, cb)| cb.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().iter().any(|(k, _)| k == key)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clone of the current entries, in registration order.
    pub fn snapshot(&self) -> Vec<(String, Arc<F>)> {
        self.entries.read().clone()
    }
}

/// Run one callback, containing a panic so the remaining callbacks of the
/// same dispatch still run. Returns `false` if the callback panicked.
pub fn invoke_isolated(key: &str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                callback = key,
                panic = %panic_message(payload.as_ref()),
                "Config callback panicked"
            );
            metrics::record_callback_panic();
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Cb = dyn Fn() + Send + Sync;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<Cb> {
        let log = log.clone();
        Arc::new(move || log.lock().unwrap().push(name))
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry: CallbackRegistry<Cb> = CallbackRegistry::new(DuplicatePolicy::Reject);
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register("c", recorder(&log, "c"));
        registry.register("a", recorder(&log, "a"));
        registry.register("b", recorder(&log, "b"));

        for (_, cb) in registry.snapshot() {
            cb();
        }
        assert_eq!(*log.lock().unwrap(), vec!["c", "a", "b"]);
        assert_eq!(registry.keys(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_reject_duplicate() {
        let registry: CallbackRegistry<Cb> = CallbackRegistry::new(DuplicatePolicy::Reject);
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(registry.register("k", recorder(&log, "first")));
        assert!(!registry.register("k", recorder(&log, "second")));

        registry.get("k").unwrap()();
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let registry: CallbackRegistry<Cb> = CallbackRegistry::new(DuplicatePolicy::Overwrite);
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register("a", recorder(&log, "a1"));
        registry.register("b", recorder(&log, "b"));
        assert!(registry.register("a", recorder(&log, "a2")));

        for (_, cb) in registry.snapshot() {
            cb();
        }
        assert_eq!(*log.lock().unwrap(), vec!["a2", "b"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_deregister() {
        let registry: CallbackRegistry<Cb> = CallbackRegistry::new(DuplicatePolicy::Reject);
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register("a", recorder(&log, "a"));
        registry.register("b", recorder(&log, "b"));

        assert!(registry.deregister("a"));
        assert!(!registry.deregister("a"));
        assert_eq!(registry.keys(), vec!["b"]);
        assert!(!registry.contains("a"));
    }

    #[test]
    fn test_panic_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ok = invoke_isolated("boom", || panic!("bad callback"));
        assert!(!ok);

        let l = log.clone();
        assert!(invoke_isolated("fine", move || l.lock().unwrap().push("ran")));
        assert_eq!(*log.lock().unwrap(), vec!["ran"]);
    }
}
