//! Trellis server binary.
//!
//! Serves the demo site: configuration from the environment and flags,
//! structured logging, graceful shutdown.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use trellis_kernel::{Cli, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load(Cli::parse()).context("failed to load configuration")?;

    init_tracing(config.dev);
    info!(dev = config.dev, "starting Trellis");

    let app = trellis_kernel::build(&config).context("failed to build application")?;

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;
    info!(%addr, "server listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                stop_rx.await.ok();
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            return result.context("server task failed")?.context("server error");
        }
        () = shutdown_signal() => {}
    }

    info!(timeout = ?config.shutdown_timeout, "shutting down");
    stop_tx.send(()).ok();
    wait_for_drain(server, config.shutdown_timeout).await
}

async fn wait_for_drain(
    server: tokio::task::JoinHandle<std::io::Result<()>>,
    timeout: Duration,
) -> Result<()> {
    match tokio::time::timeout(timeout, server).await {
        Ok(result) => {
            result.context("server task failed")?.context("server error")?;
            info!("server stopped");
        }
        Err(_) => warn!(?timeout, "shutdown timed out, dropping open connections"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Plain text logs in dev mode, JSON lines otherwise.
fn init_tracing(dev: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(dev.then(tracing_subscriber::fmt::layer))
        .with((!dev).then(|| tracing_subscriber::fmt::layer().json()))
        .init();
}
