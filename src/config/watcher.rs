//! Configuration file watcher for hot reload.
//!
//! One `FileWatcher` owns one OS-level watch on one file. A dedicated
//! listener thread waits on notify events and a stop channel; on every write
//! it reads the whole file and hands the bytes to each registered callback,
//! in registration order, on that same thread.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::registry::{invoke_isolated, CallbackRegistry, DuplicatePolicy};

/// Callback invoked with the full file contents after a write.
pub type FileCallback = dyn Fn(&[u8]) + Send + Sync;

/// Error type for file watching.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file [{}] does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("failed to initialize file watch: {0}")]
    Init(#[from] notify::Error),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn watcher thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("callback key {0} already registered")]
    DuplicateCallback(String),

    #[error("callback key {0} not registered")]
    UnknownCallback(String),

    #[error("file watcher already started")]
    AlreadyStarted,

    #[error("file watcher is stopped")]
    Stopped,
}

/// The surface a config monitor needs from its file source.
///
/// `FileWatcher` is the production implementation; tests drive monitors
/// through in-memory sources.
pub trait ChangeSource: Send + Sync {
    /// Path of the watched file.
    fn file_path(&self) -> &Path;

    /// Read the current file contents.
    fn read_contents(&self) -> Result<Vec<u8>, WatchError>;

    /// Register a callback under a unique key.
    fn register_callback(&self, key: &str, callback: Arc<FileCallback>) -> Result<(), WatchError>;

    /// Remove a callback. Unknown keys are reported, not failed.
    fn deregister_callback(&self, key: &str);
}

/// Tuning for the underlying notify backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FileWatcherConfig {
    /// Poll interval used when the platform falls back to polling.
    pub poll_interval_ms: u64,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
        }
    }
}

enum WatchState {
    Idle {
        watcher: RecommendedWatcher,
        events: Receiver<notify::Result<Event>>,
    },
    Running {
        // Dropping the sender disconnects the listener's stop channel.
        _stop_tx: Sender<()>,
    },
    Stopped,
}

struct Shared {
    path: PathBuf,
    callbacks: CallbackRegistry<FileCallback>,
    state: Mutex<WatchState>,
    stopped: AtomicBool,
}

impl Shared {
    fn read(&self) -> Result<Vec<u8>, WatchError> {
        fs::read(&self.path).map_err(|source| WatchError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Move to `Stopped`. Returns `true` if this call made the transition.
    fn shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, WatchState::Stopped) {
            return false;
        }
        self.stopped.store(true, Ordering::SeqCst);
        *state = WatchState::Stopped;
        true
    }

    fn dispatch(&self, data: &[u8]) {
        for (key, callback) in self.callbacks.snapshot() {
            invoke_isolated(&key, || callback(data));
        }
    }
}

/// Watches a single configuration file.
pub struct FileWatcher {
    shared: Arc<Shared>,
}

impl FileWatcher {
    /// Create a watcher for an existing file with default settings.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        Self::with_config(path, &FileWatcherConfig::default())
    }

    /// Create a watcher for an existing file.
    ///
    /// The OS watch is initialized here but not armed until [`start`].
    ///
    /// [`start`]: FileWatcher::start
    pub fn with_config(path: impl AsRef<Path>, config: &FileWatcherConfig) -> Result<Self, WatchError> {
        let path = path.as_ref().to_path_buf();
        match fs::metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(WatchError::NotFound(path)),
            Err(source) => return Err(WatchError::Io { path, source }),
        }

        let (tx, events) = crossbeam_channel::unbounded();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // The receiver is gone once the listener exits.
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_millis(config.poll_interval_ms)),
        )?;

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                callbacks: CallbackRegistry::new(DuplicatePolicy::Reject),
                state: Mutex::new(WatchState::Idle { watcher, events }),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.shared.path
    }

    pub fn callback_count(&self) -> usize {
        self.shared.callbacks.len()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.shared.state.lock(), WatchState::Running { .. })
    }

    /// Register a callback invoked with the file contents on every write.
    pub fn register_callback(
        &self,
        key: &str,
        callback: impl Fn(&[u8]) + Send + Sync + 'static,
    ) -> Result<(), WatchError> {
        ChangeSource::register_callback(self, key, Arc::new(callback))
    }

    /// Arm the OS watch and spawn the listener thread.
    pub fn start(&self) -> Result<(), WatchError> {
        let mut state = self.shared.state.lock();
        let (mut watcher, events) = match std::mem::replace(&mut *state, WatchState::Stopped) {
            WatchState::Idle { watcher, events } => (watcher, events),
            running @ WatchState::Running { .. } => {
                *state = running;
                return Err(WatchError::AlreadyStarted);
            }
            WatchState::Stopped => return Err(WatchError::Stopped),
        };

        if let Err(e) = watcher.watch(&self.shared.path, RecursiveMode::NonRecursive) {
            *state = WatchState::Idle { watcher, events };
            return Err(e.into());
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let shared = self.shared.clone();
        thread::Builder::new()
            .name("config-file-watcher".to_string())
            .spawn(move || supervise(shared, watcher, events, stop_rx))
            .map_err(WatchError::Spawn)?;

        *state = WatchState::Running { _stop_tx: stop_tx };
        tracing::info!(path = %self.shared.path.display(), "Config file watcher started");
        Ok(())
    }

    /// Signal the listener to exit and release the OS watch.
    ///
    /// The listener observes the signal at its next wait; a dispatch already
    /// in progress runs to completion. Calling this again is a no-op.
    pub fn stop(&self) {
        if self.shared.shutdown() {
            tracing::info!(path = %self.shared.path.display(), "Stop watching config file");
        } else {
            tracing::debug!(path = %self.shared.path.display(), "Config file watcher already stopped");
        }
    }

    /// Read the file once and dispatch it to every registered callback.
    pub fn call_once_all(&self) -> Result<(), WatchError> {
        let data = self.shared.read()?;
        self.shared.dispatch(&data);
        Ok(())
    }

    /// Read the file once and dispatch it to the callback registered under `key`.
    pub fn call_once_specific(&self, key: &str) -> Result<(), WatchError> {
        let callback = self
            .shared
            .callbacks
            .get(key)
            .ok_or_else(|| WatchError::UnknownCallback(key.to_string()))?;
        let data = self.shared.read()?;
        invoke_isolated(key, || callback(&data));
        Ok(())
    }
}

impl ChangeSource for FileWatcher {
    fn file_path(&self) -> &Path {
        &self.shared.path
    }

    fn read_contents(&self) -> Result<Vec<u8>, WatchError> {
        self.shared.read()
    }

    fn register_callback(&self, key: &str, callback: Arc<FileCallback>) -> Result<(), WatchError> {
        if !self.shared.callbacks.register(key, callback) {
            return Err(WatchError::DuplicateCallback(key.to_string()));
        }
        tracing::debug!(path = %self.shared.path.display(), callback = key, "File watcher registered callback");
        Ok(())
    }

    fn deregister_callback(&self, key: &str) {
        if self.shared.callbacks.deregister(key) {
            tracing::info!(path = %self.shared.path.display(), callback = key, "File watcher deregistered callback");
        } else {
            tracing::warn!(callback = key, "File watcher callback not registered");
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// How a filesystem event affects the watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileChange {
    Written,
    Removed,
    Ignored,
}

fn classify(event: &Event) -> FileChange {
    match event.kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => FileChange::Removed,
        EventKind::Modify(ModifyKind::Metadata(_)) => FileChange::Ignored,
        EventKind::Modify(_) | EventKind::Create(_) => FileChange::Written,
        _ => FileChange::Ignored,
    }
}

#[derive(Debug)]
enum ListenerExit {
    StopRequested,
    FileRemoved,
    EventsClosed,
}

fn supervise(
    shared: Arc<Shared>,
    watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    stop: Receiver<()>,
) {
    let exit = listen(&shared, &events, &stop);
    // Releases the OS watch.
    drop(watcher);
    shared.shutdown();
    tracing::info!(path = %shared.path.display(), reason = ?exit, "Config file watcher exited");
}

fn listen(
    shared: &Shared,
    events: &Receiver<notify::Result<Event>>,
    stop: &Receiver<()>,
) -> ListenerExit {
    loop {
        crossbeam_channel::select! {
            recv(events) -> msg => match msg {
                Ok(Ok(event)) => {
                    if shared.stopped.load(Ordering::SeqCst) {
                        return ListenerExit::StopRequested;
                    }
                    match classify(&event) {
                        FileChange::Written => match shared.read() {
                            Ok(data) => shared.dispatch(&data),
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to read config file, keeping current configuration");
                            }
                        },
                        FileChange::Removed => {
                            tracing::warn!(path = %shared.path.display(), "Config file removed, stop watching");
                            return ListenerExit::FileRemoved;
                        }
                        FileChange::Ignored => {}
                    }
                }
                Ok(Err(e)) => tracing::error!(error = %e, "File watcher error"),
                Err(_) => return ListenerExit::EventsClosed,
            },
            recv(stop) -> _ => return ListenerExit::StopRequested,
        }
    }
}
