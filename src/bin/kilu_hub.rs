//! KiLu Hub worker binary.
//!
//! Loads `config.toml`, starts the task loop, and writes every status
//! update to stdout as one JSON object per line. Diagnostics go to stderr
//! and to a daily log file under the data directory, so stdout stays a
//! clean status stream. Ctrl-C stops the loop after the current attempt.

use anyhow::Context;
use kilu_hub::service::build_runtime;
use kilu_hub::{HubConfig, HubService, hub_dirs};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

fn init_tracing() -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_filter(filter());

    let logs_dir = hub_dirs::logs_dir();
    match std::fs::create_dir_all(&logs_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&logs_dir, "kilu-hub.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry().with(stderr_layer).init();
            tracing::warn!("file logging disabled, cannot create {}: {e}", logs_dir.display());
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();
    tracing::info!("kilu-hub starting");

    let config_path = hub_dirs::config_file();
    let config = HubConfig::load(&config_path)
        .with_context(|| format!("cannot load {}", config_path.display()))?;
    let runtime = build_runtime(config).context("cannot assemble hub runtime")?;

    let (mut service, mut status_rx) = HubService::new(runtime);
    let printer = tokio::spawn(async move {
        while let Some(update) = status_rx.recv().await {
            match serde_json::to_string(&update) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("cannot encode status update: {e}"),
            }
        }
    });

    service.start()?;
    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;
    tracing::info!("shutdown requested");

    service.stop().await.map_err(|e| {
        tracing::error!(error = %e, "kilu-hub exited with error");
        anyhow::anyhow!("kilu-hub failed: {e}")
    })?;
    drop(service);
    let _ = printer.await;

    tracing::info!("kilu-hub shut down cleanly");
    Ok(())
}
