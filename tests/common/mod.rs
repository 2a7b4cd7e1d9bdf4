//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use config_file_reload::config::registry::{CallbackRegistry, DuplicatePolicy};
use config_file_reload::config::watcher::FileCallback;
use config_file_reload::config::{ChangeSource, WatchError};
use parking_lot::Mutex;

/// Upper bound for filesystem events to arrive.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Create `name` with `contents` in a fresh temp dir.
pub fn temp_config(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    (dir, path)
}

/// Rewrite the file in place so the watch keeps following the same inode.
pub fn write_config(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}

/// In-memory [`ChangeSource`] whose writes are delivered on demand.
pub struct MockSource {
    path: PathBuf,
    contents: Mutex<Vec<u8>>,
    callbacks: CallbackRegistry<FileCallback>,
    reads: Mutex<usize>,
}

impl MockSource {
    pub fn new(contents: &str) -> Arc<Self> {
        Self::with_path("mock.json", contents)
    }

    pub fn with_path(path: &str, contents: &str) -> Arc<Self> {
        Arc::new(Self {
            path: PathBuf::from(path),
            contents: Mutex::new(contents.as_bytes().to_vec()),
            callbacks: CallbackRegistry::new(DuplicatePolicy::Reject),
            reads: Mutex::new(0),
        })
    }

    /// Replace the contents and dispatch them, as a file write would.
    pub fn fire(&self, contents: &str) {
        *self.contents.lock() = contents.as_bytes().to_vec();
        let data = contents.as_bytes();
        for (_, callback) in self.callbacks.snapshot() {
            callback(data);
        }
    }

    pub fn registered(&self) -> Vec<String> {
        self.callbacks.keys()
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock()
    }
}

impl ChangeSource for MockSource {
    fn file_path(&self) -> &Path {
        &self.path
    }

    fn read_contents(&self) -> Result<Vec<u8>, WatchError> {
        *self.reads.lock() += 1;
        Ok(self.contents.lock().clone())
    }

    fn register_callback(&self, key: &str, callback: Arc<FileCallback>) -> Result<(), WatchError> {
        if self.callbacks.register(key, callback) {
            Ok(())
        } else {
            Err(WatchError::DuplicateCallback(key.to_string()))
        }
    }

    fn deregister_callback(&self, key: &str) {
        self.callbacks.deregister(key);
    }
}
