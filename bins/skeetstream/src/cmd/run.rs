use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use skeet_collector::{Collector, GzipJsonlSink, WebSocketConnector};

use crate::config::RunArgs;
use crate::error::AppError;

pub async fn run(args: RunArgs) -> Result<(), AppError> {
    tracing::info!("skeetstream starting");

    // --- Config ---
    let config = args.effective_config()?;
    tracing::info!(
        config = %args.config,
        host = %config.feed.host,
        purge_after = config.buffer.purge_after,
        data_dir = %config.storage.data_dir.display(),
        shutdown = ?config.shutdown.policy,
        "loaded config"
    );

    // --- Compose collector ---
    let connector = Arc::new(WebSocketConnector::new(config.endpoint()));
    let sink = Arc::new(GzipJsonlSink::new(
        &config.storage.data_dir,
        config.storage.compression_level,
    ));
    let mut collector = Collector::new(&config, connector, sink);

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let signals = spawn_signal_listener(token.clone())?;

    if let Err(e) = collector.initialize().await {
        tracing::error!(error = %e, "could not start collector");
        token.cancel();
        join_signal_listener(signals).await;
        return Err(e.into());
    }

    let result = collector.run(token.clone()).await;

    // Stop the signal listener if the collector ended on its own.
    token.cancel();
    join_signal_listener(signals).await;

    let stats = result?;
    tracing::info!(
        received = stats.records_received,
        written = stats.records_written,
        artifacts = stats.artifacts_written,
        dropped = stats.records_dropped,
        "shut down"
    );
    Ok(())
}

async fn join_signal_listener(signals: JoinHandle<()>) {
    if let Err(e) = signals.await {
        tracing::debug!(error = %e, "signal listener ended abnormally");
    }
}

/// Cancel `token` on SIGINT or SIGTERM. Registration happens before the
/// task is spawned so a failure surfaces here.
fn spawn_signal_listener(token: CancellationToken) -> Result<JoinHandle<()>, AppError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).map_err(AppError::Signal)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(AppError::Signal)?;
        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => tracing::info!(signal = "SIGINT", "shutting down skeetstream..."),
                _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "shutting down skeetstream..."),
                _ = token.cancelled() => return,
            }
            token.cancel();
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "ctrl-c handler failed");
                    }
                    tracing::info!("shutting down skeetstream...");
                }
                _ = token.cancelled() => return,
            }
            token.cancel();
        }))
    }
}
