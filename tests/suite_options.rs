//! Suite option assembly and teardown through the shutdown coordinator.

use std::sync::Arc;

use config_file_reload::config::{DefaultKeyProvider, FileWatcher, KeyProvider};
use config_file_reload::lifecycle::Shutdown;
use config_file_reload::resilience::limiter::{LimitUpdater, LimiterOption};
use config_file_reload::resilience::TimeoutProvider;
use config_file_reload::suite::{ClientOption, FileConfigClientSuite, FileConfigServerSuite, ServerOption};
use parking_lot::Mutex;

mod common;
use common::{temp_config, wait_until, write_config, MockSource, EVENT_TIMEOUT};

#[derive(Default)]
struct RecordingUpdater(Mutex<Vec<LimiterOption>>);

impl LimitUpdater for RecordingUpdater {
    fn update_limit(&self, option: &LimiterOption) -> bool {
        self.0.lock().push(*option);
        true
    }
}

#[tokio::test]
async fn test_client_close_on_shutdown() {
    let key = DefaultKeyProvider.key("echo", "server");
    let source = MockSource::new(r#"{"echo/server": {"retry": {"Echo": {"enable": true, "type": 1, "backup_policy": {"retry_delay_ms": 5}}}}}"#);
    let suite = FileConfigClientSuite::new("server", key, source.clone());

    let shutdown = Shutdown::new();
    let mut retry = None;
    let mut hooks = Vec::new();
    for opt in suite.options().unwrap() {
        match opt {
            ClientOption::RetryContainer(c) => retry = Some(c),
            ClientOption::CloseCallback(close) => hooks.push(shutdown.stop_on_shutdown("close", close)),
            _ => {}
        }
    }
    let retry = retry.unwrap();
    assert!(retry.effective_policy("Echo").backup_policy.is_some());
    assert_eq!(source.registered(), vec!["echo/server"]);

    shutdown.trigger();
    for hook in hooks {
        hook.await.unwrap();
    }
    assert!(source.registered().is_empty());

    source.fire(r#"{"echo/server": {}}"#);
    assert!(retry.effective_policy("Echo").enable);
}

#[tokio::test]
async fn test_server_limits_reach_late_updater() {
    let source = MockSource::with_path("server.yaml", "echo-server:\n  limit:\n    qps_limit: 50\n");
    let suite = FileConfigServerSuite::new("echo-server", source.clone());

    let shutdown = Shutdown::new();
    let mut control = None;
    let mut hooks = Vec::new();
    for opt in suite.options().unwrap() {
        match opt {
            ServerOption::Limit(c) => control = Some(c),
            ServerOption::ShutdownHook(hook) => hooks.push(shutdown.stop_on_shutdown("limiter", hook)),
        }
    }
    let control = control.unwrap();

    // Reload before the runtime has handed over its updater.
    source.fire("echo-server:\n  limit:\n    qps_limit: 60\n    connection_limit: 5\n");
    assert!(!control.has_updater());

    let updater = Arc::new(RecordingUpdater::default());
    control.update_control(updater.clone());
    source.fire("echo-server:\n  limit:\n    qps_limit: 70\n");

    {
        let seen = updater.0.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            LimiterOption {
                max_connections: 5,
                max_qps: 60
            }
        );
        assert_eq!(seen[1].max_qps, 70);
    }

    shutdown.trigger();
    for hook in hooks {
        hook.await.unwrap();
    }
    assert!(source.registered().is_empty());
}

#[test]
fn test_owned_watcher_follows_writes_and_stops_on_close() {
    let (_dir, path) = temp_config("client.toml", "[\"a/b\".timeout.\"*\"]\nrpc_timeout_ms = 100\n");
    let suite = FileConfigClientSuite::from_path("b", "a/b", &path).unwrap();
    assert!(suite.owns_watcher());

    let mut timeouts = None;
    let mut closes = Vec::new();
    for opt in suite.options().unwrap() {
        match opt {
            ClientOption::TimeoutProvider(t) => timeouts = Some(t),
            ClientOption::CloseCallback(close) => closes.push(close),
            _ => {}
        }
    }
    let timeouts = timeouts.unwrap();
    assert_eq!(timeouts.timeouts("Echo").rpc_timeout_ms, 100);

    write_config(&path, "[\"a/b\".timeout.\"*\"]\nrpc_timeout_ms = 250\n");
    assert!(wait_until(EVENT_TIMEOUT, || timeouts.timeouts("Echo").rpc_timeout_ms == 250));

    for close in closes {
        close();
    }
}

#[test]
fn test_shared_watcher_outlives_suite_close() {
    let (_dir, path) = temp_config("server.json", r#"{"svc": {"limit": {"qps_limit": 1}}}"#);
    let watcher = Arc::new(FileWatcher::new(&path).unwrap());
    watcher.start().unwrap();

    let suite = FileConfigServerSuite::new("svc", watcher.clone());
    assert!(!suite.owns_watcher());
    for opt in suite.options().unwrap() {
        if let ServerOption::ShutdownHook(hook) = opt {
            hook();
        }
    }

    assert!(watcher.is_running());
    assert_eq!(watcher.callback_count(), 0);
    watcher.stop();
}
