//! Server suite: the option list an RPC server installs to follow one
//! routing key of a config file.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::loader::{ConfigManager, Decoder};
use crate::config::monitor::{ConfigMonitor, MonitorError};
use crate::config::schema::ServerFileConfig;
use crate::config::watcher::{ChangeSource, FileWatcher};
use crate::resilience::limiter::{init_limiter, LimiterControl};
use crate::suite::CloseCallback;

/// One policy handed to the host server.
pub enum ServerOption {
    /// Connection/QPS limits; the host registers its updater on it.
    Limit(Arc<LimiterControl>),
    /// Run when the server shuts down.
    ShutdownHook(CloseCallback),
}

impl fmt::Debug for ServerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerOption::Limit(control) => f.debug_tuple("Limit").field(control).finish(),
            ServerOption::ShutdownHook(_) => f.write_str("ShutdownHook"),
        }
    }
}

pub struct FileConfigServerSuite {
    key: String,
    source: Arc<dyn ChangeSource>,
    owned_watcher: Option<Arc<FileWatcher>>,
    manager: Option<ConfigManager<ServerFileConfig>>,
}

impl FileConfigServerSuite {
    pub fn new(key: impl Into<String>, source: Arc<dyn ChangeSource>) -> Self {
        Self {
            key: key.into(),
            source,
            owned_watcher: None,
            manager: None,
        }
    }

    /// Suite with its own watcher on `path`; the shutdown hook stops it.
    pub fn from_path(key: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let watcher = Arc::new(FileWatcher::new(path)?);
        watcher.start()?;
        let mut suite = Self::new(key, watcher.clone());
        suite.owned_watcher = Some(watcher);
        Ok(suite)
    }

    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.manager = Some(ConfigManager::new(decoder));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owns_watcher(&self) -> bool {
        self.owned_watcher.is_some()
    }

    pub fn options(&self) -> Result<Vec<ServerOption>, MonitorError> {
        let monitor = ConfigMonitor::<ServerFileConfig>::new(self.key.as_str(), self.source.clone())?;
        monitor.set_manager(
            self.manager
                .clone()
                .unwrap_or_else(|| ConfigManager::for_path(self.source.file_path())),
        );

        let limiter = init_limiter(&monitor);
        monitor.start()?;

        let watcher = self.owned_watcher.clone();
        Ok(vec![
            ServerOption::Limit(limiter),
            ServerOption::ShutdownHook(Box::new(move || {
                monitor.stop();
                if let Some(watcher) = watcher {
                    watcher.stop();
                }
            })),
        ])
    }
}

impl fmt::Debug for FileConfigServerSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileConfigServerSuite")
            .field("key", &self.key)
            .field("file", &self.source.file_path())
            .field("owns_watcher", &self.owns_watcher())
            .finish()
    }
}
