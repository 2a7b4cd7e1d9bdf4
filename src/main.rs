//! config-file-watch
//!
//! Follows one routing key of a config file and logs the live policies every
//! few seconds, the way an RPC client or server would see them.
//!
//! ```text
//!   config file ──▶ FileWatcher ──▶ ConfigMonitor (key) ──▶ adapters
//!                    (thread)          │                     │
//!                                      ▼                     ▼
//!                               cached config         policy containers
//!                                                            │
//!                              ticker ◀──────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use config_file_reload::config::{DefaultKeyProvider, Format, KeyProvider};
use config_file_reload::lifecycle::{signals, Shutdown};
use config_file_reload::observability::{logging, metrics};
use config_file_reload::resilience::limiter::{LimitUpdater, LimiterOption};
use config_file_reload::resilience::TimeoutProvider;
use config_file_reload::suite::{ClientOption, FileConfigClientSuite, FileConfigServerSuite, ServerOption};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Client,
    Server,
}

/// Watch an RPC policy config file and log what a host would apply.
#[derive(Debug, Parser)]
#[command(name = "config-file-watch", version, about)]
struct Cli {
    /// Config file to watch
    #[arg(short, long)]
    file: PathBuf,

    #[arg(long, value_enum, default_value = "client")]
    role: Role,

    /// Caller service name
    #[arg(long, default_value = "echo-client")]
    from: String,

    /// Callee service name
    #[arg(long, default_value = "echo-server")]
    to: String,

    /// Method whose client policies are logged
    #[arg(long, default_value = "Echo")]
    method: String,

    /// File format; inferred from the extension when omitted
    #[arg(long)]
    format: Option<Format>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Seconds between state reports
    #[arg(long, default_value_t = 10)]
    interval_secs: u64,
}

/// Stands in for a server runtime's limiter.
struct LoggingUpdater;

impl LimitUpdater for LoggingUpdater {
    fn update_limit(&self, option: &LimiterOption) -> bool {
        tracing::info!(
            max_connections = option.max_connections,
            max_qps = option.max_qps,
            "Limiter updated"
        );
        true
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(&format!("config_file_reload={0},config_file_watch={0}", cli.log_level))?;

    if let Some(addr) = cli.metrics_address {
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(metrics_address = %addr, error = %e, "Failed to start metrics exporter");
        }
    }

    let shutdown = Shutdown::new();
    let mut hooks = Vec::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(cli.interval_secs.max(1)));

    match cli.role {
        Role::Client => {
            let key = DefaultKeyProvider.key(&cli.from, &cli.to);
            let mut suite = FileConfigClientSuite::from_path(&cli.to, &key, &cli.file)?;
            if let Some(format) = cli.format {
                suite = suite.with_decoder(format);
            }
            tracing::info!(key = %key, file = %cli.file.display(), "Client suite ready");

            let (mut retry, mut cb, mut timeouts) = (None, None, None);
            for opt in suite.options()? {
                match opt {
                    ClientOption::RetryContainer(c) => retry = Some(c),
                    ClientOption::CircuitBreaker(s) => cb = Some(s),
                    ClientOption::TimeoutProvider(t) => timeouts = Some(t),
                    ClientOption::CloseCallback(close) => {
                        hooks.push(shutdown.stop_on_shutdown("client-close", close));
                    }
                }
            }
            let cb_key = config_file_reload::resilience::service_cb_key(&cli.to, &cli.method);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let retry = retry.as_ref().map(|c| c.effective_policy(&cli.method));
                        let timeout = timeouts.as_ref().map(|t| t.timeouts(&cli.method));
                        let breaker = cb.as_ref().map(|s| s.service_cb_config(&cb_key));
                        tracing::info!(method = %cli.method, ?retry, ?timeout, ?breaker, "Current client policies");
                    }
                    sig = signals::wait_for_signal() => {
                        tracing::info!(signal = sig, "Signal received, shutting down");
                        break;
                    }
                }
            }
        }
        Role::Server => {
            let mut suite = FileConfigServerSuite::from_path(&cli.to, &cli.file)?;
            if let Some(format) = cli.format {
                suite = suite.with_decoder(format);
            }
            tracing::info!(key = %cli.to, file = %cli.file.display(), "Server suite ready");

            let mut limiter = None;
            for opt in suite.options()? {
                match opt {
                    ServerOption::Limit(control) => limiter = Some(control),
                    ServerOption::ShutdownHook(hook) => {
                        hooks.push(shutdown.stop_on_shutdown("server-shutdown", hook));
                    }
                }
            }
            if let Some(control) = &limiter {
                control.update_control(Arc::new(LoggingUpdater));
            }

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let option = limiter.as_ref().map(|c| c.option());
                        tracing::info!(?option, "Current server limits");
                    }
                    sig = signals::wait_for_signal() => {
                        tracing::info!(signal = sig, "Signal received, shutting down");
                        break;
                    }
                }
            }
        }
    }

    shutdown.trigger();
    for hook in hooks {
        if let Err(e) = hook.await {
            tracing::error!(error = %e, "Shutdown hook task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
