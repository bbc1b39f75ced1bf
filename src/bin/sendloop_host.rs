//! Headless host binary: task scheduler behind a stdin/stdout JSON bridge.
//!
//! Usage: `sendloop-host [CONFIG_PATH]`. Without a path the default config
//! file is used when present, otherwise built-in defaults.
//!
//! All tracing/diagnostic output goes to stderr (and optionally a daily log
//! file) so that stdout remains a clean JSON protocol channel.

use sendloop::client::DryRunClient;
use sendloop::host::handler::CommandHandler;
use sendloop::host::stdio::run_stdio_bridge;
use sendloop::notify::BroadcastSink;
use sendloop::{SendloopConfig, TaskManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn load_config() -> anyhow::Result<SendloopConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => SendloopConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("cannot load config {}: {e}", path.display())),
        None => Ok(SendloopConfig::load_or_default()?),
    }
}

/// Stderr logging plus an optional daily-rotated file. The returned guard
/// must live until exit so buffered file output is flushed.
fn init_tracing(config: &SendloopConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    if !config.logging.file {
        tracing_subscriber::registry().with(stderr_layer).init();
        return None;
    }

    let log_dir = config.persistence.resolved_logs_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(log_dir, "sendloop-host.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _log_guard = init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sendloop-host starting");

    let sink = Arc::new(BroadcastSink::default());
    let events = sink.subscribe();
    let manager = Arc::new(TaskManager::new(config, Arc::new(DryRunClient), sink));

    manager.recover();
    let background = manager.spawn_background();

    let result = run_stdio_bridge(CommandHandler::new(Arc::clone(&manager)), events).await;

    manager.shutdown();
    for handle in background {
        let _ = handle.await;
    }

    result.map_err(|e| {
        tracing::error!(error = %e, "sendloop-host exited with error");
        anyhow::anyhow!("sendloop-host failed: {e}")
    })?;

    tracing::info!("sendloop-host shut down cleanly");
    Ok(())
}
