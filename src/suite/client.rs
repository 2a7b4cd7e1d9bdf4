//! Client suite: the option list an RPC client installs to follow one
//! routing key of a config file.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::loader::{ConfigManager, Decoder};
use crate::config::monitor::{ConfigMonitor, MonitorError};
use crate::config::schema::ClientFileConfig;
use crate::config::watcher::{ChangeSource, FileWatcher};
use crate::resilience::circuit_breaker::{init_circuit_breaker, CircuitBreakerSuite};
use crate::resilience::retries::{init_retry_container, RetryContainer};
use crate::resilience::timeouts::{init_rpc_timeout, TimeoutProvider};
use crate::suite::CloseCallback;

/// One policy handed to the host client.
pub enum ClientOption {
    RetryContainer(Arc<RetryContainer>),
    CircuitBreaker(Arc<CircuitBreakerSuite>),
    TimeoutProvider(Arc<dyn TimeoutProvider>),
    /// Run when the client is closed.
    CloseCallback(CloseCallback),
}

impl fmt::Debug for ClientOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientOption::RetryContainer(c) => f.debug_tuple("RetryContainer").field(c).finish(),
            ClientOption::CircuitBreaker(s) => f.debug_tuple("CircuitBreaker").field(s).finish(),
            ClientOption::TimeoutProvider(_) => f.write_str("TimeoutProvider"),
            ClientOption::CloseCallback(_) => f.write_str("CloseCallback"),
        }
    }
}

/// Builds [`ClientOption`]s for calls to `to_service`, driven by the entry
/// for `key` in the watched file.
pub struct FileConfigClientSuite {
    to_service: String,
    key: String,
    source: Arc<dyn ChangeSource>,
    owned_watcher: Option<Arc<FileWatcher>>,
    manager: Option<ConfigManager<ClientFileConfig>>,
}

impl FileConfigClientSuite {
    /// Suite on a source shared with other suites. The source's lifecycle
    /// stays with the caller.
    pub fn new(to_service: impl Into<String>, key: impl Into<String>, source: Arc<dyn ChangeSource>) -> Self {
        Self {
            to_service: to_service.into(),
            key: key.into(),
            source,
            owned_watcher: None,
            manager: None,
        }
    }

    /// Suite with its own watcher on `path`; closing the client stops it.
    pub fn from_path(
        to_service: impl Into<String>,
        key: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, MonitorError> {
        let watcher = Arc::new(FileWatcher::new(path)?);
        watcher.start()?;
        let mut suite = Self::new(to_service, key, watcher.clone());
        suite.owned_watcher = Some(watcher);
        Ok(suite)
    }

    /// Use `decoder` instead of the one implied by the file extension.
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

    /// Wire every client policy to a new monitor and apply the file's current
    /// contents.
    ///
    /// Fails if the key is empty or the source already has a monitor for it.
    pub fn options(&self) -> Result<Vec<ClientOption>, MonitorError> {
        let monitor = ConfigMonitor::<ClientFileConfig>::new(self.key.as_str(), self.source.clone())?;
        monitor.set_manager(
            self.manager
                .clone()
                .unwrap_or_else(|| ConfigManager::for_path(self.source.file_path())),
        );

        let retry = init_retry_container(&monitor);
        let cb_suite = init_circuit_breaker(&monitor, &self.to_service);
        let timeouts = init_rpc_timeout(&monitor);

        monitor.start()?;

        let cb_close = cb_suite.clone();
        let watcher = self.owned_watcher.clone();
        let mut opts: Vec<ClientOption> = Vec::with_capacity(5);
        opts.push(ClientOption::RetryContainer(retry));
        opts.push(ClientOption::CircuitBreaker(cb_suite));
        opts.push(ClientOption::CloseCallback(Box::new(move || cb_close.close())));
        opts.push(ClientOption::TimeoutProvider(timeouts));
        opts.push(ClientOption::CloseCallback(Box::new(move || {
            monitor.stop();
            if let Some(watcher) = watcher {
                watcher.stop();
            }
        })));
        Ok(opts)
    }
}

impl fmt::Debug for FileConfigClientSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileConfigClientSuite")
            .field("to_service", &self.to_service)
            .field("key", &self.key)
            .field("file", &self.source.file_path())
            .field("owns_watcher", &self.owns_watcher())
            .finish()
    }
}
