// Market Advisory - Web Server
// Loads the price catalog once, then serves it read-only over HTTP.

use anyhow::{Context, Result};
use market_advisory::api::{router, AppState};
use market_advisory::{ingest, init_tracing, AppConfig, PestLibrary};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info,tower_http=debug");

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(path) = std::env::args().nth(1) {
        config.data_file = PathBuf::from(path);
    }

    info!(data_file = %config.data_file.display(), "loading food price data");
    let catalog = ingest(&config.data_file)
        .with_context(|| format!("Failed to load price data: {}", config.data_file.display()))?;

    let pests = match &config.pest_file {
        Some(path) => PestLibrary::load(path).context("Failed to load pest data")?,
        None => PestLibrary::default(),
    };

    let state = AppState::new(catalog, pests, config.staleness(), config.static_dir.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, static_dir = %config.static_dir.display(), "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix (container stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
    info!("shutting down");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::signal::unix::{signal, SignalKind};

    #[tokio::test]
    async fn test_shutdown_on_sigterm() {
        // Keep the process-wide SIGTERM handler installed before the signal is sent
        let _guard = signal(SignalKind::terminate()).unwrap();

        let shutdown = tokio::spawn(shutdown_signal());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -TERM {}", std::process::id()))
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .expect("shutdown did not resolve on SIGTERM")
            .unwrap();
    }
}
