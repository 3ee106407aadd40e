// Server runtime: wires configuration into the mirror engine and serves
// the HTTP surface until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{build_router, AppState};
use crate::config::ServerConfig;
use crate::git::mirror::MirrorSync;
use crate::git::runner::CommandRunner;
use crate::startup::{initial_sync, prepare_mirror_dir};

pub async fn run(config: ServerConfig) -> Result<()> {
    prepare_mirror_dir(&config.mirror_dir)?;

    let runner = CommandRunner::new(config.command_timeout);
    let config = Arc::new(config);
    let mirror = Arc::new(MirrorSync::new(&config, runner));

    initial_sync(&mirror).await;

    let app = build_router(AppState { config: Arc::clone(&config), mirror });

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(
        listen_addr = %config.listen_addr,
        repositories = config.repositories.len(),
        "starting mirror server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("mirror server exited unexpectedly")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
